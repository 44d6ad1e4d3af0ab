//! Storage layer: schema, the SQLite store, and the small pure helpers
//! that guard its write and search paths.

pub mod redact;
pub mod sanitize;
pub mod schema;
pub mod store;
pub mod topic;

pub use store::{AddOutcome, AddResult, Store, StoreConfig};
