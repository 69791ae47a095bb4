use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Task;
use crate::assembly::{Assembly, AssemblyStore};
use crate::config::Config;
use crate::error::StoreError;
use crate::evaluation::{Orchestrator, Strategy};
use crate::mediator::BroadcastMediator;
use crate::metrics::Metrics;
use crate::ws;

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn AssemblyStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<Metrics>,
    pub events: Arc<BroadcastMediator>,
    pub semaphore: Arc<Semaphore>,
    pub started_at: chrono::DateTime<Utc>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .route("/grader/interaction", post(interaction))
        .route("/assemblies", get(list_assemblies).post(upsert_assembly))
        .route(
            "/assemblies/:id",
            get(get_assembly).put(update_assembly).delete(delete_assembly),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::CollectionMissing => api_error(StatusCode::NOT_FOUND, e.to_string()),
        StoreError::Malformed { .. } | StoreError::MissingId => {
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    title: &'static str,
    message: String,
    content: T,
}

fn envelope<T: Serialize>(title: &'static str, message: impl Into<String>, content: T) -> Json<Envelope<T>> {
    Json(Envelope {
        title,
        message: message.into(),
        content,
    })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: i64,
    active_runs: u64,
    total_runs: u64,
    succeeded: u64,
    failed: u64,
    interactions: u64,
    capacity: usize,
    available_slots: usize,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
        active_runs: state.metrics.runs_active.load(Ordering::Relaxed),
        total_runs: state.metrics.runs_total.load(Ordering::Relaxed),
        succeeded: state.metrics.runs_succeeded.load(Ordering::Relaxed),
        failed: state.metrics.runs_failed.load(Ordering::Relaxed),
        interactions: state.metrics.interactions_completed.load(Ordering::Relaxed),
        capacity: state.config.max_concurrent_runs,
        available_slots: state.semaphore.available_permits(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let body = state.metrics.render_prometheus();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

#[derive(Deserialize)]
struct InteractionPayload {
    case_id: String,
    #[serde(default)]
    strategy: Strategy,
    #[serde(flatten)]
    task: Task,
}

async fn interaction(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InteractionPayload>,
) -> Result<Json<Value>, ApiError> {
    if payload.case_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "case_id is required"));
    }

    // Held for the whole run.
    let _permit = state.semaphore.clone().try_acquire_owned().map_err(|_| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "At capacity (max {} concurrent runs). Try again later.",
                state.config.max_concurrent_runs
            ),
        )
    })?;

    let run = state.metrics.track_run();
    let (result, progress) = state
        .orchestrator
        .run_tracked(&payload.case_id, payload.task, payload.strategy)
        .await;
    run.finish(result.is_ok());

    match result {
        Ok(aggregate) => {
            info!(
                assembly_id = %payload.case_id,
                agents = progress.agent_count(),
                results = aggregate.len(),
                elapsed_ms = progress.elapsed_ms(),
                "Interaction served"
            );
            let text = serde_json::to_value(&aggregate).map_err(|e| {
                api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode result: {e}"))
            })?;
            Ok(Json(serde_json::json!({ "text": text })))
        }
        Err(e) => {
            let status = if e.is_not_found() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err(api_error(status, e.to_string()))
        }
    }
}

async fn list_assemblies(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let docs = state.store.list().await.map_err(store_error)?;
    Ok(envelope("Assemblies", format!("{} assemblies", docs.len()), docs))
}

async fn get_assembly(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = state
        .store
        .get_by_id(&id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Assembly {id} not found")))?;
    Ok(envelope("Assembly", format!("Assembly {id}"), doc))
}

/// Rejects documents that would not resolve into an assembly later.
fn validate(doc: &Value) -> Result<(), ApiError> {
    Assembly::from_document(doc.clone())
        .map(|_| ())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid assembly: {e}")))
}

async fn upsert_assembly(
    State(state): State<Arc<AppState>>,
    Json(doc): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&doc)?;
    let saved = state.store.upsert(doc).await.map_err(store_error)?;
    let id = saved.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    info!(assembly_id = %id, "Assembly saved");
    Ok((
        StatusCode::CREATED,
        envelope("Assembly saved", format!("Assembly {id} saved"), saved),
    ))
}

async fn update_assembly(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let Value::Object(patch) = patch else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Body must be a JSON object"));
    };

    let mut doc = state
        .store
        .get_by_id(&id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Assembly {id} not found")))?;

    if let Value::Object(ref mut fields) = doc {
        fields.extend(patch);
        fields.insert("id".to_string(), Value::String(id.clone()));
    }
    validate(&doc)?;

    let saved = state.store.upsert(doc).await.map_err(store_error)?;
    info!(assembly_id = %id, "Assembly updated");
    Ok(envelope("Assembly updated", format!("Assembly {id} updated"), saved))
}

async fn delete_assembly(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .store
        .delete(&id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Assembly {id} not found")))?;
    warn!(assembly_id = %id, "Assembly deleted");
    Ok(envelope("Assembly deleted", format!("Assembly {id} deleted"), removed))
}
