//! Whole-store export and import commands.

use std::path::{Path, PathBuf};

use crate::cli::commands::open_store;
use crate::error::{Error, Result};
use crate::model::Snapshot;

pub fn export(path: Option<&Path>, data_dir: Option<&PathBuf>) -> Result<()> {
    let store = open_store(data_dir)?;
    let snapshot = store.export()?;
    let json = serde_json::to_string_pretty(&snapshot)?;

    match path {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))?;
            eprintln!(
                "Exported {} session(s), {} observation(s), {} prompt(s) to {}",
                snapshot.sessions.len(),
                snapshot.observations.len(),
                snapshot.prompts.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub fn import(path: &Path, data_dir: Option<&PathBuf>, json: bool) -> Result<()> {
    if !path.is_file() {
        return Err(Error::invalid_input(format!(
            "no such file: {}",
            path.display()
        )));
    }

    let raw = std::fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&raw)
        .map_err(|e| Error::invalid_input(format!("invalid snapshot: {e}")))?;

    let mut store = open_store(data_dir)?;
    let counts = store.import(&snapshot)?;

    if json {
        println!("{}", serde_json::to_string(&counts)?);
    } else {
        println!(
            "Imported {} session(s), {} observation(s), {} prompt(s)",
            counts.sessions_imported, counts.observations_imported, counts.prompts_imported
        );
    }
    Ok(())
}
