//! # snapdeploy Testkit
//!
//! Test utilities for snapdeploy.
//!
//! This crate provides:
//! - A populated sample application and a ready-wired deployment service
//! - Property-based generators for data records
//! - Snapshot tree digests and golden-file helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snapdeploy_testkit::prelude::*;
//!
//! #[test]
//! fn export_is_stable() {
//!     let (env, _) = TestDeployment::populated();
//!     let dir = SnapshotDir::new();
//!     assert!(env.service().export(dir.path()).is_success());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod golden;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::golden::*;
}

pub use fixtures::*;
pub use generators::*;
pub use golden::*;
