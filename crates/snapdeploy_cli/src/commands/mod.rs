//! CLI command implementations.

pub mod data;
pub mod export;
pub mod import;
pub mod inspect;
pub mod session;
