//! Long-running frontends: HTTP server, stdio tool server, TUI.

use std::path::PathBuf;

use crate::cli::commands::open_store;
use crate::config;
use crate::error::Result;
use crate::server::{stdio, ToolServer};

pub fn serve(port: Option<u16>, data_dir: Option<&PathBuf>) -> Result<()> {
    let store = open_store(data_dir)?;
    let port = config::http_port(port);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::http::serve(store, port))
}

pub fn mcp(tools: Option<&str>, data_dir: Option<&PathBuf>) -> Result<()> {
    let store = open_store(data_dir)?;
    let server = ToolServer::new(store, tools)?;
    tracing::info!(tools = ?server.tool_names(), "starting stdio tool server");
    stdio::run(server)
}

pub fn tui(data_dir: Option<&PathBuf>) -> Result<()> {
    let store = open_store(data_dir)?;
    crate::tui::run(store)
}
