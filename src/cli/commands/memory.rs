//! Memory commands: save, search, timeline, context, stats.

use std::path::PathBuf;

use colored::Colorize;

use crate::cli::commands::{ensure_session, open_store, parse_scope};
use crate::context::format_context;
use crate::error::Result;
use crate::model::{AddObservation, SearchOptions};

#[allow(clippy::too_many_arguments)]
pub fn save(
    title: &str,
    content: &str,
    kind: Option<&str>,
    project: Option<&str>,
    scope: Option<&str>,
    topic_key: Option<&str>,
    session: Option<&str>,
    data_dir: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let mut store = open_store(data_dir)?;
    let session_id = ensure_session(&mut store, session, project)?;

    let result = store.add_observation(&AddObservation {
        session_id,
        kind: kind.map(ToString::to_string),
        title: title.to_string(),
        content: content.to_string(),
        project: project.map(ToString::to_string),
        scope: parse_scope(scope)?,
        topic_key: topic_key.map(ToString::to_string),
        tool_name: None,
    })?;

    if json {
        println!("{}", serde_json::json!({"id": result.id}));
    } else {
        println!("Saved observation {}", result.id);
        if topic_key.is_none() {
            let suggestion =
                store.suggest_topic(kind.unwrap_or_default(), title, content);
            if !suggestion.is_empty() {
                println!("  topic suggestion: {suggestion}");
            }
        }
    }
    Ok(())
}

pub fn search(
    query: &str,
    kind: Option<&str>,
    project: Option<&str>,
    scope: Option<&str>,
    limit: Option<usize>,
    data_dir: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let store = open_store(data_dir)?;
    let results = store.search(
        query,
        &SearchOptions {
            kind: kind.map(ToString::to_string),
            project: project.map(ToString::to_string),
            scope: parse_scope(scope)?,
            limit,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No memories match {query:?}.");
        return Ok(());
    }

    println!("{} result(s) for {query:?}:", results.len());
    for r in &results {
        let o = &r.observation;
        println!();
        println!(
            "{} {} {}",
            format!("#{}", o.id).dimmed(),
            format!("[{}]", o.kind).cyan(),
            o.title.bold()
        );
        let first_line = o.content.lines().next().unwrap_or_default();
        println!("  {first_line}");
    }
    Ok(())
}

pub fn timeline(
    observation_id: i64,
    before: usize,
    after: usize,
    data_dir: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let store = open_store(data_dir)?;
    let timeline = store.timeline(observation_id, before, after)?;

    if json {
        println!("{}", serde_json::to_string(&timeline)?);
        return Ok(());
    }

    if let Some(session) = &timeline.session {
        println!(
            "Session {} ({}): {} observation(s) in range",
            session.id.bold(),
            session.project,
            timeline.total_in_range
        );
    }
    for o in &timeline.before {
        println!("  {} [{}] {} ({})", format!("#{}", o.id).dimmed(), o.kind, o.title, o.created_at);
    }
    let f = &timeline.focus;
    println!(
        "{} {} [{}] {} ({})",
        "→".yellow(),
        format!("#{}", f.id).bold(),
        f.kind,
        f.title.bold(),
        f.created_at
    );
    for o in &timeline.after {
        println!("  {} [{}] {} ({})", format!("#{}", o.id).dimmed(), o.kind, o.title, o.created_at);
    }
    Ok(())
}

pub fn context(project: Option<&str>, data_dir: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(data_dir)?;
    let block = format_context(&store, project, None)?;
    if json {
        println!("{}", serde_json::json!({"context": block}));
    } else {
        println!("{block}");
    }
    Ok(())
}

pub fn stats(data_dir: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(data_dir)?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    println!("Sessions:     {} ({} active)", stats.total_sessions, stats.active_sessions);
    println!("Observations: {}", stats.observation_count);
    println!("Prompts:      {}", stats.prompt_count);
    println!("Database:     {} bytes", stats.db_size_bytes);
    if stats.projects.is_empty() {
        println!("Projects:     (none)");
    } else {
        println!("Projects:     {}", stats.projects.join(", "));
    }
    Ok(())
}
