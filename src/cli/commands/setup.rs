//! Setup command: initialize the data directory and print agent
//! integration config.

use std::path::PathBuf;

use crate::cli::commands::open_store;
use crate::config;
use crate::error::{Error, Result};

pub fn execute(agent: Option<&str>, data_dir: Option<&PathBuf>, json: bool) -> Result<()> {
    // Opening the store creates the directory and bootstraps the schema.
    let _store = open_store(data_dir)?;
    let db = config::db_path(data_dir.map(PathBuf::as_path))?;

    match agent {
        None => {
            if json {
                println!("{}", serde_json::json!({"database": db.display().to_string()}));
            } else {
                println!("Engram initialized at {}", db.display());
            }
        }
        Some(agent @ ("claude" | "codex")) => {
            let snippet = serde_json::json!({
                "mcpServers": {
                    "engram": {
                        "command": "engram",
                        "args": ["mcp", "--tools=agent"],
                    }
                }
            });
            if json {
                println!("{snippet}");
            } else {
                println!("Engram initialized at {}", db.display());
                println!();
                println!("Add to your {agent} MCP configuration:");
                println!("{}", serde_json::to_string_pretty(&snippet)?);
            }
        }
        Some(other) => {
            return Err(Error::invalid_input(format!(
                "unknown agent {other:?} (expected claude or codex)"
            )));
        }
    }
    Ok(())
}
