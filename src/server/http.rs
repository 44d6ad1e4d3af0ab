//! Local HTTP/JSON frontend.
//!
//! An axum router bound to `127.0.0.1` that maps REST routes onto the
//! same store calls every other frontend uses. Errors come back as
//! `{"error": "<message>"}` with 400/404/409/413/500 per the error kind.
//!
//! The store sits behind a mutex; every handler takes the lock for the
//! duration of one synchronous store call and never across an await.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::format_context;
use crate::error::{Error, Result};
use crate::model::{
    AddObservation, AddPrompt, Scope, SearchOptions, Snapshot, UpdateObservation,
};
use crate::passive;
use crate::storage::Store;

/// Maximum accepted `/import` body.
pub const IMPORT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Default size of a timeline window when the query omits one.
const TIMELINE_DEFAULT: usize = 5;

type SharedStore = Arc<Mutex<Store>>;

/// Serve the HTTP frontend until interrupted.
///
/// # Errors
///
/// Bind or I/O failures.
pub async fn serve(store: Store, port: u16) -> Result<()> {
    let state: SharedStore = Arc::new(Mutex::new(store));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("engram HTTP server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("engram HTTP server shutting down");
    Ok(())
}

/// Build the router (exposed separately for handler tests).
pub fn router(state: SharedStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/recent", get(recent_sessions))
        .route("/sessions/{id}/end", post(end_session))
        .route("/observations", post(create_observation))
        .route("/observations/passive", post(capture_passive))
        .route("/observations/recent", get(recent_observations))
        .route(
            "/observations/{id}",
            get(get_observation)
                .patch(update_observation)
                .delete(delete_observation),
        )
        .route("/search", get(search))
        .route("/timeline", get(timeline))
        .route("/prompts", post(create_prompt))
        .route("/prompts/recent", get(recent_prompts))
        .route("/prompts/search", get(search_prompts))
        .route("/context", get(context))
        .route("/export", get(export))
        .route(
            "/import",
            post(import).layer(axum::extract::DefaultBodyLimit::max(IMPORT_BODY_LIMIT + 1024)),
        )
        .route("/stats", get(stats))
        .with_state(state)
}

/// Store errors rendered as the `{"error": …}` JSON shape.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Parse a JSON body into a typed struct with our 400 shape.
fn from_body<T: serde::de::DeserializeOwned>(value: Value) -> ApiResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ApiError(Error::invalid_input(format!("invalid body: {e}"))))
}

fn lock(state: &SharedStore) -> std::sync::MutexGuard<'_, Store> {
    // A poisoned mutex means a handler panicked mid-call; the store's
    // transactions have already rolled back, so the data is consistent.
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── Handlers ──────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "engram",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct CreateSessionBody {
    id: String,
    project: String,
    #[serde(default)]
    directory: Option<String>,
}

async fn create_session(
    State(state): State<SharedStore>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let body: CreateSessionBody = from_body(body)?;
    let mut store = lock(&state);
    store.create_session(&body.id, &body.project, body.directory.as_deref())?;
    let session = store.get_session(&body.id)?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Deserialize, Default)]
struct EndSessionBody {
    #[serde(default)]
    summary: Option<String>,
}

async fn end_session(
    State(state): State<SharedStore>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let body: EndSessionBody = if body.is_empty() {
        EndSessionBody::default()
    } else {
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| ApiError(Error::invalid_input(format!("invalid body: {e}"))))?;
        from_body(value)?
    };
    let session = lock(&state).end_session(&id, body.summary.as_deref().unwrap_or_default())?;
    Ok(Json(serde_json::to_value(session).map_err(Error::from)?))
}

#[derive(Deserialize)]
struct RecentQuery {
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    scope: Option<Scope>,
}

async fn recent_sessions(
    State(state): State<SharedStore>,
    Query(q): Query<RecentQuery>,
) -> ApiResult<Json<Value>> {
    let sessions = lock(&state).recent_sessions(q.project.as_deref(), q.limit.unwrap_or(20))?;
    Ok(Json(serde_json::to_value(sessions).map_err(Error::from)?))
}

async fn create_observation(
    State(state): State<SharedStore>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let params: AddObservation = from_body(body)?;
    let result = lock(&state).add_observation(&params)?;
    Ok((StatusCode::CREATED, Json(json!({"id": result.id}))))
}

#[derive(Deserialize)]
struct PassiveBody {
    session_id: String,
    content: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

async fn capture_passive(
    State(state): State<SharedStore>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let body: PassiveBody = from_body(body)?;
    let mut store = lock(&state);
    let outcome = passive::capture(
        &mut store,
        &body.session_id,
        &body.content,
        body.project.as_deref(),
        body.source.as_deref(),
    )?;
    Ok(Json(serde_json::to_value(outcome).map_err(Error::from)?))
}

async fn recent_observations(
    State(state): State<SharedStore>,
    Query(q): Query<RecentQuery>,
) -> ApiResult<Json<Value>> {
    let observations =
        lock(&state).recent_observations(q.project.as_deref(), q.scope, q.limit.unwrap_or(20))?;
    Ok(Json(serde_json::to_value(observations).map_err(Error::from)?))
}

async fn get_observation(
    State(state): State<SharedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let obs = lock(&state).get_observation(id)?;
    Ok(Json(serde_json::to_value(obs).map_err(Error::from)?))
}

async fn update_observation(
    State(state): State<SharedStore>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let params: UpdateObservation = from_body(body)?;
    let obs = lock(&state).update_observation(id, &params)?;
    Ok(Json(serde_json::to_value(obs).map_err(Error::from)?))
}

#[derive(Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    hard: Option<bool>,
}

async fn delete_observation(
    State(state): State<SharedStore>,
    Path(id): Path<i64>,
    Query(q): Query<DeleteQuery>,
) -> ApiResult<Json<Value>> {
    let hard = q.hard.unwrap_or(false);
    lock(&state).delete_observation(id, hard)?;
    Ok(Json(json!({"deleted": id, "hard": hard})))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    scope: Option<Scope>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search(
    State(state): State<SharedStore>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let results = lock(&state).search(
        &q.q,
        &SearchOptions {
            kind: q.kind,
            project: q.project,
            scope: q.scope,
            limit: q.limit,
        },
    )?;
    Ok(Json(serde_json::to_value(results).map_err(Error::from)?))
}

#[derive(Deserialize)]
struct TimelineQuery {
    observation_id: i64,
    #[serde(default)]
    before: Option<usize>,
    #[serde(default)]
    after: Option<usize>,
}

async fn timeline(
    State(state): State<SharedStore>,
    Query(q): Query<TimelineQuery>,
) -> ApiResult<Json<Value>> {
    let timeline = lock(&state).timeline(
        q.observation_id,
        q.before.unwrap_or(TIMELINE_DEFAULT),
        q.after.unwrap_or(TIMELINE_DEFAULT),
    )?;
    Ok(Json(serde_json::to_value(timeline).map_err(Error::from)?))
}

async fn create_prompt(
    State(state): State<SharedStore>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let params: AddPrompt = from_body(body)?;
    let id = lock(&state).add_prompt(&params)?;
    Ok((StatusCode::CREATED, Json(json!({"id": id}))))
}

async fn recent_prompts(
    State(state): State<SharedStore>,
    Query(q): Query<RecentQuery>,
) -> ApiResult<Json<Value>> {
    let prompts = lock(&state).recent_prompts(q.project.as_deref(), q.limit.unwrap_or(20))?;
    Ok(Json(serde_json::to_value(prompts).map_err(Error::from)?))
}

#[derive(Deserialize)]
struct PromptSearchQuery {
    q: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search_prompts(
    State(state): State<SharedStore>,
    Query(q): Query<PromptSearchQuery>,
) -> ApiResult<Json<Value>> {
    let prompts =
        lock(&state).search_prompts(&q.q, q.project.as_deref(), q.limit.unwrap_or(20))?;
    Ok(Json(serde_json::to_value(prompts).map_err(Error::from)?))
}

#[derive(Deserialize)]
struct ContextQuery {
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    scope: Option<Scope>,
}

async fn context(
    State(state): State<SharedStore>,
    Query(q): Query<ContextQuery>,
) -> ApiResult<Json<Value>> {
    let block = format_context(&lock(&state), q.project.as_deref(), q.scope)?;
    Ok(Json(json!({"context": block})))
}

async fn export(State(state): State<SharedStore>) -> ApiResult<Json<Value>> {
    let snapshot = lock(&state).export()?;
    Ok(Json(serde_json::to_value(snapshot).map_err(Error::from)?))
}

async fn import(State(state): State<SharedStore>, body: Bytes) -> ApiResult<Json<Value>> {
    if body.len() > IMPORT_BODY_LIMIT {
        return Err(ApiError(Error::TooLarge {
            size: body.len(),
            limit: IMPORT_BODY_LIMIT,
        }));
    }
    let snapshot: Snapshot = serde_json::from_slice(&body)
        .map_err(|e| ApiError(Error::invalid_input(format!("invalid snapshot: {e}"))))?;
    let counts = lock(&state).import(&snapshot)?;
    Ok(Json(serde_json::to_value(counts).map_err(Error::from)?))
}

async fn stats(State(state): State<SharedStore>) -> ApiResult<Json<Value>> {
    let stats = lock(&state).stats()?;
    Ok(Json(serde_json::to_value(stats).map_err(Error::from)?))
}

/// Resolve on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!("failed to listen for SIGTERM: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
