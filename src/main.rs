//! Engram CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use engram::cli::{commands, Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet, &cli.command);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("engram: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool, command: &Commands) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use the verbosity flag.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("engram=info"),
            2 => EnvFilter::new("engram=debug"),
            _ => EnvFilter::new("engram=trace"),
        }
    };

    // The TUI owns the terminal and the stdio server owns stdout; both
    // can only log to stderr.
    let with_ansi = !matches!(command, Commands::Tui | Commands::Mcp { .. });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(with_ansi)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> engram::Result<()> {
    let data_dir = cli.data_dir.as_ref();

    match &cli.command {
        Commands::Serve { port } => commands::serve::serve(*port, data_dir),
        Commands::Mcp { tools } => commands::serve::mcp(tools.as_deref(), data_dir),
        Commands::Tui => commands::serve::tui(data_dir),

        Commands::Search {
            query,
            kind,
            project,
            scope,
            limit,
        } => commands::memory::search(
            query,
            kind.as_deref(),
            project.as_deref(),
            scope.as_deref(),
            *limit,
            data_dir,
            cli.json,
        ),

        Commands::Save {
            title,
            content,
            kind,
            project,
            scope,
            topic_key,
            session,
        } => commands::memory::save(
            title,
            content,
            kind.as_deref(),
            project.as_deref(),
            scope.as_deref(),
            topic_key.as_deref(),
            session.as_deref(),
            data_dir,
            cli.json,
        ),

        Commands::Timeline {
            observation_id,
            before,
            after,
        } => commands::memory::timeline(*observation_id, *before, *after, data_dir, cli.json),

        Commands::Context { project } => {
            commands::memory::context(project.as_deref(), data_dir, cli.json)
        }

        Commands::Stats => commands::memory::stats(data_dir, cli.json),

        Commands::Export { path } => commands::transfer::export(path.as_deref(), data_dir),
        Commands::Import { path } => commands::transfer::import(path, data_dir, cli.json),

        Commands::Sync {
            all,
            status,
            import,
            project,
        } => commands::sync::execute(*all, *status, *import, project.as_deref(), data_dir, cli.json),

        Commands::Setup { agent } => commands::setup::execute(agent.as_deref(), data_dir, cli.json),

        Commands::Version => {
            commands::version::execute(cli.json);
            Ok(())
        }
    }
}
