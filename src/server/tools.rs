//! Tool registry and dispatch for the stdio tool server.
//!
//! Every tool argument object is parsed into a typed struct before any
//! store call; malformed arguments surface as invalid-input errors, never
//! panics. Tool failures come back as a text result flagged with
//! `isError` so the agent can read the message.
//!
//! Two allowlist profiles exist: `agent` (everything except the
//! administrative tools) and `admin` (only those). `--tools=agent,admin`
//! or `--tools=all` (or no flag) registers everything.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::format_context;
use crate::error::{Error, Result};
use crate::model::{AddObservation, AddPrompt, Scope, SearchOptions, UpdateObservation};
use crate::passive;
use crate::server::rpc::{Request, Response, RpcError, PROTOCOL_VERSION};
use crate::storage::Store;

/// Tools reserved for the `admin` profile.
pub const ADMIN_TOOLS: &[&str] = &["mem_delete", "mem_stats", "mem_timeline"];

/// Project assumed when an ad-hoc write names none.
const DEFAULT_PROJECT: &str = "default";

/// Observation type used by `mem_session_summary`.
const SUMMARY_KIND: &str = "summary";

/// Characters of content promoted into a summary title.
const SUMMARY_TITLE_LEN: usize = 80;

/// One registered tool.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Resolve a `--tools` selection into the registered tool names.
///
/// # Errors
///
/// `InvalidInput` on an unknown profile name.
pub fn select_tools(selection: Option<&str>) -> Result<Vec<ToolDef>> {
    let mut agent = false;
    let mut admin = false;

    match selection.map(str::trim) {
        None | Some("all") | Some("") => {
            agent = true;
            admin = true;
        }
        Some(list) => {
            for part in list.split(',') {
                match part.trim() {
                    "agent" => agent = true,
                    "admin" => admin = true,
                    "all" => {
                        agent = true;
                        admin = true;
                    }
                    other => {
                        return Err(Error::invalid_input(format!(
                            "unknown tool profile {other:?} (expected agent, admin, or all)"
                        )))
                    }
                }
            }
        }
    }

    Ok(all_tools()
        .into_iter()
        .filter(|t| {
            if ADMIN_TOOLS.contains(&t.name) {
                admin
            } else {
                agent
            }
        })
        .collect())
}

/// The complete tool catalog.
fn all_tools() -> Vec<ToolDef> {
    fn schema(required: &[&str], properties: Value) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    vec![
        ToolDef {
            name: "mem_save",
            description: "Save a memory (observation). Upserts when a topic_key matches an existing memory.",
            input_schema: schema(
                &["title", "content"],
                json!({
                    "title": {"type": "string"},
                    "content": {"type": "string"},
                    "type": {"type": "string"},
                    "session_id": {"type": "string"},
                    "project": {"type": "string"},
                    "scope": {"type": "string", "enum": ["project", "personal"]},
                    "topic_key": {"type": "string"},
                }),
            ),
        },
        ToolDef {
            name: "mem_search",
            description: "Full-text search over saved memories.",
            input_schema: schema(
                &["query"],
                json!({
                    "query": {"type": "string"},
                    "type": {"type": "string"},
                    "project": {"type": "string"},
                    "scope": {"type": "string", "enum": ["project", "personal"]},
                    "limit": {"type": "integer"},
                }),
            ),
        },
        ToolDef {
            name: "mem_update",
            description: "Update fields of an existing memory by id.",
            input_schema: schema(
                &["id"],
                json!({
                    "id": {"type": "integer"},
                    "title": {"type": "string"},
                    "content": {"type": "string"},
                    "type": {"type": "string"},
                    "project": {"type": "string"},
                    "scope": {"type": "string", "enum": ["project", "personal"]},
                    "topic_key": {"type": "string"},
                }),
            ),
        },
        ToolDef {
            name: "mem_delete",
            description: "Delete a memory by id (soft by default, hard on request).",
            input_schema: schema(
                &["id"],
                json!({
                    "id": {"type": "integer"},
                    "hard_delete": {"type": "boolean"},
                }),
            ),
        },
        ToolDef {
            name: "mem_context",
            description: "Render the memory context block for injection.",
            input_schema: schema(
                &[],
                json!({
                    "project": {"type": "string"},
                    "scope": {"type": "string", "enum": ["project", "personal"]},
                }),
            ),
        },
        ToolDef {
            name: "mem_stats",
            description: "Store statistics: counts and known projects.",
            input_schema: schema(&[], json!({})),
        },
        ToolDef {
            name: "mem_timeline",
            description: "Observations before and after a focus observation, within its session.",
            input_schema: schema(
                &["observation_id"],
                json!({
                    "observation_id": {"type": "integer"},
                    "before": {"type": "integer"},
                    "after": {"type": "integer"},
                }),
            ),
        },
        ToolDef {
            name: "mem_get_observation",
            description: "Fetch one memory by id.",
            input_schema: schema(&["id"], json!({"id": {"type": "integer"}})),
        },
        ToolDef {
            name: "mem_save_prompt",
            description: "Capture a raw user prompt.",
            input_schema: schema(
                &["content"],
                json!({
                    "content": {"type": "string"},
                    "session_id": {"type": "string"},
                    "project": {"type": "string"},
                }),
            ),
        },
        ToolDef {
            name: "mem_session_start",
            description: "Start (or rejoin) a session.",
            input_schema: schema(
                &["id", "project"],
                json!({
                    "id": {"type": "string"},
                    "project": {"type": "string"},
                    "directory": {"type": "string"},
                }),
            ),
        },
        ToolDef {
            name: "mem_session_end",
            description: "End a session with an optional summary.",
            input_schema: schema(
                &["id"],
                json!({
                    "id": {"type": "string"},
                    "summary": {"type": "string"},
                }),
            ),
        },
        ToolDef {
            name: "mem_session_summary",
            description: "Store a session summary as a memory.",
            input_schema: schema(
                &["content", "project"],
                json!({
                    "content": {"type": "string"},
                    "project": {"type": "string"},
                    "session_id": {"type": "string"},
                }),
            ),
        },
        ToolDef {
            name: "mem_suggest_topic_key",
            description: "Suggest a stable topic key from a title or content.",
            input_schema: schema(
                &[],
                json!({
                    "title": {"type": "string"},
                    "content": {"type": "string"},
                    "type": {"type": "string"},
                }),
            ),
        },
        ToolDef {
            name: "mem_capture_passive",
            description: "Extract Key Learnings from a transcript and store them as memories.",
            input_schema: schema(
                &["content"],
                json!({
                    "content": {"type": "string"},
                    "session_id": {"type": "string"},
                    "project": {"type": "string"},
                    "source": {"type": "string"},
                }),
            ),
        },
    ]
}

// ── Typed tool parameters ─────────────────────────────────────

#[derive(Deserialize)]
struct SaveParams {
    title: String,
    content: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    session_id: Option<String>,
    project: Option<String>,
    scope: Option<Scope>,
    topic_key: Option<String>,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    project: Option<String>,
    scope: Option<Scope>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct UpdateParams {
    id: i64,
    #[serde(flatten)]
    fields: UpdateObservation,
}

#[derive(Deserialize)]
struct DeleteParams {
    id: i64,
    #[serde(default)]
    hard_delete: bool,
}

#[derive(Deserialize, Default)]
struct ContextParams {
    project: Option<String>,
    scope: Option<Scope>,
}

#[derive(Deserialize)]
struct TimelineParams {
    observation_id: i64,
    before: Option<usize>,
    after: Option<usize>,
}

#[derive(Deserialize)]
struct GetParams {
    id: i64,
}

#[derive(Deserialize)]
struct SavePromptParams {
    content: String,
    session_id: Option<String>,
    project: Option<String>,
}

#[derive(Deserialize)]
struct SessionStartParams {
    id: String,
    project: String,
    directory: Option<String>,
}

#[derive(Deserialize)]
struct SessionEndParams {
    id: String,
    summary: Option<String>,
}

#[derive(Deserialize)]
struct SessionSummaryParams {
    content: String,
    project: String,
    session_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct SuggestParams {
    title: Option<String>,
    content: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct CaptureParams {
    content: String,
    session_id: Option<String>,
    project: Option<String>,
    source: Option<String>,
}

/// Dispatch one tool call against the store, returning the rendered text.
///
/// # Errors
///
/// `InvalidInput` for unknown tools or malformed arguments; otherwise
/// whatever the store call reports.
pub fn call_tool(store: &mut Store, name: &str, args: Value) -> Result<String> {
    match name {
        "mem_save" => {
            let p: SaveParams = parse(args)?;
            let session_id = match p.session_id {
                Some(id) if !id.is_empty() => id,
                _ => ensure_default_session(store, p.project.as_deref())?,
            };
            let suggestion = if p.topic_key.as_deref().unwrap_or_default().is_empty() {
                let kind = p.kind.clone().unwrap_or_default();
                let key = store.suggest_topic(&kind, &p.title, &p.content);
                (!key.is_empty()).then_some(key)
            } else {
                None
            };
            let result = store.add_observation(&AddObservation {
                session_id,
                kind: p.kind,
                title: p.title,
                content: p.content,
                project: p.project,
                scope: p.scope,
                topic_key: p.topic_key,
                tool_name: None,
            })?;
            let mut out = json!({"id": result.id});
            if let Some(key) = suggestion {
                out["suggested_topic_key"] = Value::String(key);
            }
            Ok(out.to_string())
        }

        "mem_search" => {
            let p: SearchParams = parse(args)?;
            let results = store.search(
                &p.query,
                &SearchOptions {
                    kind: p.kind,
                    project: p.project,
                    scope: p.scope,
                    limit: p.limit,
                },
            )?;
            if results.is_empty() {
                return Ok(format!("No memories match {:?}.", p.query));
            }
            let mut out = format!("{} result(s) for {:?}:\n", results.len(), p.query);
            for r in &results {
                let o = &r.observation;
                out.push_str(&format!("\n#{} [{}] {}\n   {}\n", o.id, o.kind, o.title, snippet(&o.content)));
            }
            Ok(out)
        }

        "mem_update" => {
            let p: UpdateParams = parse(args)?;
            let updated = store.update_observation(p.id, &p.fields)?;
            Ok(serde_json::to_string_pretty(&updated)?)
        }

        "mem_delete" => {
            let p: DeleteParams = parse(args)?;
            store.delete_observation(p.id, p.hard_delete)?;
            let mode = if p.hard_delete { "hard" } else { "soft" };
            Ok(format!("Deleted observation {} ({mode}).", p.id))
        }

        "mem_context" => {
            let p: ContextParams = parse(args)?;
            format_context(store, p.project.as_deref(), p.scope)
        }

        "mem_stats" => {
            let stats = store.stats()?;
            Ok(serde_json::to_string_pretty(&stats)?)
        }

        "mem_timeline" => {
            let p: TimelineParams = parse(args)?;
            let timeline = store.timeline(p.observation_id, p.before.unwrap_or(5), p.after.unwrap_or(5))?;
            Ok(serde_json::to_string_pretty(&timeline)?)
        }

        "mem_get_observation" => {
            let p: GetParams = parse(args)?;
            let obs = store.get_observation(p.id)?;
            Ok(serde_json::to_string_pretty(&obs)?)
        }

        "mem_save_prompt" => {
            let p: SavePromptParams = parse(args)?;
            let session_id = match p.session_id {
                Some(id) if !id.is_empty() => id,
                _ => ensure_default_session(store, p.project.as_deref())?,
            };
            let id = store.add_prompt(&AddPrompt {
                session_id,
                content: p.content,
                project: p.project,
            })?;
            Ok(json!({"id": id}).to_string())
        }

        "mem_session_start" => {
            let p: SessionStartParams = parse(args)?;
            store.create_session(&p.id, &p.project, p.directory.as_deref())?;
            Ok(format!("Session {} started.", p.id))
        }

        "mem_session_end" => {
            let p: SessionEndParams = parse(args)?;
            store.end_session(&p.id, p.summary.as_deref().unwrap_or_default())?;
            Ok(format!("Session {} ended.", p.id))
        }

        "mem_session_summary" => {
            let p: SessionSummaryParams = parse(args)?;
            let session_id = match p.session_id {
                Some(id) if !id.is_empty() => id,
                _ => ensure_default_session(store, Some(&p.project))?,
            };
            let result = store.add_observation(&AddObservation {
                session_id,
                kind: Some(SUMMARY_KIND.to_string()),
                title: p.content.chars().take(SUMMARY_TITLE_LEN).collect(),
                content: p.content,
                project: Some(p.project),
                scope: None,
                topic_key: None,
                tool_name: None,
            })?;
            Ok(json!({"id": result.id}).to_string())
        }

        "mem_suggest_topic_key" => {
            let p: SuggestParams = parse(args)?;
            let title = p.title.unwrap_or_default();
            let content = p.content.unwrap_or_default();
            if title.trim().is_empty() && content.trim().is_empty() {
                return Err(Error::invalid_input("title or content is required"));
            }
            let key = store.suggest_topic(&p.kind.unwrap_or_default(), &title, &content);
            if key.is_empty() {
                return Err(Error::invalid_input("no topic key can be derived from the input"));
            }
            Ok(key)
        }

        "mem_capture_passive" => {
            let p: CaptureParams = parse(args)?;
            let session_id = match p.session_id {
                Some(id) if !id.is_empty() => id,
                _ => ensure_default_session(store, p.project.as_deref())?,
            };
            let outcome = passive::capture(
                store,
                &session_id,
                &p.content,
                p.project.as_deref(),
                p.source.as_deref(),
            )?;
            Ok(serde_json::to_string(&outcome)?)
        }

        other => Err(Error::invalid_input(format!("unknown tool: {other}"))),
    }
}

fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| Error::invalid_input(format!("invalid arguments: {e}")))
}

/// One-line content preview for rendered search results.
fn snippet(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > 120 {
        let cut: String = line.chars().take(120).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

/// Idempotently create the conventional ad-hoc session for a project and
/// return its id. Scoping by project keeps ids from colliding.
fn ensure_default_session(store: &mut Store, project: Option<&str>) -> Result<String> {
    let project = match project {
        Some(p) if !p.trim().is_empty() => p,
        _ => DEFAULT_PROJECT,
    };
    let id = format!("manual-save-{project}");
    store.create_session(&id, project, None)?;
    Ok(id)
}

/// The stdio tool server: a registry plus the store it drives.
#[derive(Debug)]
pub struct ToolServer {
    store: Store,
    tools: Vec<ToolDef>,
}

impl ToolServer {
    /// Build a server over a store with the given `--tools` selection.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on an unknown profile.
    pub fn new(store: Store, selection: Option<&str>) -> Result<Self> {
        Ok(Self {
            store,
            tools: select_tools(selection)?,
        })
    }

    /// Registered tool names, in catalog order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }

    /// Handle one JSON-RPC request. Notifications yield no response.
    pub fn handle_request(&mut self, request: Request) -> Option<Response> {
        let result = match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "engram",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {"tools": {"listChanged": false}},
            })),
            "notifications/initialized" => return None,
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": self.tools.iter().map(|t| json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema,
                })).collect::<Vec<_>>(),
            })),
            "tools/call" => self.handle_tools_call(request.params),
            method => Err(RpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(value) => Response::success(request.id, value),
            Err(error) => Response::error(request.id, error),
        })
    }

    fn handle_tools_call(&mut self, params: Option<Value>) -> std::result::Result<Value, RpcError> {
        #[derive(Deserialize)]
        struct CallParams {
            name: String,
            #[serde(default)]
            arguments: Value,
        }

        let params: CallParams = params
            .ok_or_else(|| RpcError::invalid_params("missing params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| RpcError::invalid_params(&e.to_string()))
            })?;

        if !self.tools.iter().any(|t| t.name == params.name) {
            return Err(RpcError::method_not_found(&params.name));
        }

        let args = if params.arguments.is_null() {
            json!({})
        } else {
            params.arguments
        };

        match call_tool(&mut self.store, &params.name, args) {
            Ok(text) => Ok(tool_result(&text, false)),
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "tool call failed");
                Ok(tool_result(&e.to_string(), true))
            }
        }
    }
}

fn tool_result(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error,
    })
}
