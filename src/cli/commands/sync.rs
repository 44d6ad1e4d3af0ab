//! Chunked sync command.

use std::path::PathBuf;

use crate::cli::commands::{open_store, sync_root};
use crate::config;
use crate::error::Result;

pub fn execute(
    all: bool,
    status_only: bool,
    import_only: bool,
    project: Option<&str>,
    data_dir: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let root = sync_root()?;
    let mut store = open_store(data_dir)?;

    if status_only {
        let status = root.status(&store)?;
        if json {
            println!("{}", serde_json::to_string(&status)?);
        } else {
            println!("Sync root: {}", root.dir().display());
            println!("  local chunks:   {}", status.local_chunks);
            println!("  remote chunks:  {}", status.remote_chunks);
            println!("  pending import: {}", status.pending_import);
        }
        return Ok(());
    }

    let run_export = !import_only;
    let run_import = import_only || all;

    if run_export {
        let outcome = root.export(&mut store, &config::actor(), project)?;
        if json {
            println!("{}", serde_json::to_string(&outcome)?);
        } else if outcome.is_empty {
            println!("Nothing new to export.");
        } else {
            println!(
                "Exported chunk {} ({} session(s), {} memorie(s), {} prompt(s))",
                outcome.chunk_id.as_deref().unwrap_or("?"),
                outcome.sessions,
                outcome.memories,
                outcome.prompts
            );
        }
    }

    if run_import {
        let outcome = root.import(&mut store)?;
        if json {
            println!("{}", serde_json::to_string(&outcome)?);
        } else {
            println!(
                "Imported {} chunk(s) ({} skipped): {} session(s), {} observation(s), {} prompt(s)",
                outcome.chunks_imported,
                outcome.chunks_skipped,
                outcome.sessions_imported,
                outcome.observations_imported,
                outcome.prompts_imported
            );
        }
    }

    Ok(())
}
