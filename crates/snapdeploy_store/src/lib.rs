//! # snapdeploy Store
//!
//! Collaborator seams between the deployment engine and a live application
//! store, plus in-memory implementations.
//!
//! The engine never talks to a graph database, a schema compiler or a
//! script interpreter directly. It talks to these traits:
//!
//! - [`GraphStore`] - query/transaction engine for nodes, principals,
//!   typed records and relationships
//! - [`ContentStorage`] - binary content of file nodes
//! - [`SchemaRegistry`] - the dynamic schema/type system
//! - [`ScriptHost`] - the scripting engine running deployment hooks
//!
//! ## Example
//!
//! ```rust
//! use snapdeploy_store::{GraphStore, InMemoryStore, NewNode, NodeKind};
//!
//! let store = InMemoryStore::new();
//! let id = store
//!     .create_node(NewNode::new(NodeKind::Page).with_attr("name", "index"))
//!     .unwrap();
//! assert_eq!(store.find_by_key(NodeKind::Page, "index").unwrap()[0].id, id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod checksum;
mod error;
mod memory;
mod model;
mod schema;

pub use backend::{ContentStorage, GraphStore, SchemaRegistry, ScriptHost};
pub use checksum::{content_checksum, CHECKSUM_HEX_LEN};
pub use error::{Endpoint, StoreError, StoreResult};
pub use memory::{IdFormat, InMemoryStore, StoreImage};
pub use model::{
    Attributes, DataRecord, Grant, NewNode, NodeId, NodeKind, Permission, Principal,
    PrincipalKind, RelationshipRecord, StoredNode, TxOptions, UpsertKind, Visibility,
};
pub use schema::{InMemorySchema, RecordingScriptHost};
