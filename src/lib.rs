//! Engram - persistent memory for AI coding agents
//!
//! A single-file SQLite store of agent-curated observations, prompts, and
//! session records, served over a stdio JSON-RPC tool server, a local
//! HTTP/JSON server, a CLI, and a TUI.
//!
//! # Architecture
//!
//! - [`storage`] - the SQLite store: schema, topic upserts, soft/hard
//!   deletes, FTS search, timeline, snapshot export/import
//! - [`sync`] - chunked, content-addressed exchange of memories between
//!   machines
//! - [`passive`] - "Key Learnings" transcript extraction
//! - [`context`] - deterministic context-block rendering
//! - [`server`] - the stdio tool server and HTTP frontend
//! - [`tui`] - terminal browser
//! - [`cli`] - command-line interface using clap
//! - [`config`] - data-dir and port resolution
//! - [`error`] - error types and the frontend-facing kind taxonomy

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod passive;
pub mod server;
pub mod storage;
pub mod sync;
pub mod tui;

pub use error::{Error, ErrorKind, Result};
