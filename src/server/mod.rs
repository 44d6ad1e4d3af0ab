//! Frontend servers: the stdio JSON-RPC tool server and the local HTTP
//! server. Both are thin wrappers over [`crate::storage::Store`].

pub mod http;
pub mod rpc;
pub mod stdio;
pub mod tools;

pub use tools::ToolServer;
