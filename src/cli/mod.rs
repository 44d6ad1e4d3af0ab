//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Engram - persistent memory for AI coding agents
#[derive(Parser, Debug)]
#[command(name = "engram", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (default: ~/.engram)
    #[arg(long, global = true, env = "ENGRAM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output as JSON (for agent integration)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no logging)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the local HTTP server
    Serve {
        /// Port to bind (default: 7437, or ENGRAM_PORT)
        port: Option<u16>,
    },

    /// Run the stdio tool server
    Mcp {
        /// Tool profiles to register: agent, admin, or all
        #[arg(long)]
        tools: Option<String>,
    },

    /// Browse memories in a terminal UI
    Tui,

    /// Search memories
    Search {
        /// Query text
        query: String,

        /// Filter by observation type
        #[arg(long = "type")]
        kind: Option<String>,

        /// Filter by project
        #[arg(long)]
        project: Option<String>,

        /// Filter by scope (project or personal)
        #[arg(long)]
        scope: Option<String>,

        /// Maximum results (capped at 20)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Save a memory
    Save {
        /// Short title
        title: String,

        /// Memory content
        content: String,

        /// Observation type (decision, bugfix, architecture, ...)
        #[arg(long = "type")]
        kind: Option<String>,

        /// Project the memory belongs to
        #[arg(long)]
        project: Option<String>,

        /// Scope (project or personal)
        #[arg(long)]
        scope: Option<String>,

        /// Stable topic key; saves with a matching key update in place
        #[arg(long = "topic")]
        topic_key: Option<String>,

        /// Session to attach to (default: the per-project manual session)
        #[arg(long)]
        session: Option<String>,
    },

    /// Show observations around a focus observation
    Timeline {
        /// Focus observation id
        observation_id: i64,

        /// Observations before the focus
        #[arg(long, default_value_t = 5)]
        before: usize,

        /// Observations after the focus
        #[arg(long, default_value_t = 5)]
        after: usize,
    },

    /// Render the memory context block
    Context {
        /// Project to scope to
        project: Option<String>,
    },

    /// Show store statistics
    Stats,

    /// Export the whole store as JSON
    Export {
        /// Output file (default: stdout)
        path: Option<PathBuf>,
    },

    /// Import a previously exported snapshot
    Import {
        /// Snapshot file
        path: PathBuf,
    },

    /// Exchange memories through the project sync directory
    Sync {
        /// Export then import
        #[arg(long)]
        all: bool,

        /// Show sync status only
        #[arg(long)]
        status: bool,

        /// Import pending chunks only
        #[arg(long)]
        import: bool,

        /// Scope the export to one project
        #[arg(long)]
        project: Option<String>,
    },

    /// Initialize the data directory (and print agent config)
    Setup {
        /// Agent to print integration config for (claude, codex)
        agent: Option<String>,
    },

    /// Print version information
    Version,
}
