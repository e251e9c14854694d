use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{patch, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::models::Collection;
use crate::query::Filter;
use crate::services::{
    BatchResult, CreateResult, DeleteResult, SyncReport, SyncStatusView, UpdateResult,
};
use crate::state::AppState;

#[derive(Deserialize)]
struct ConnectivityEvent {
    reachable: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", post(sync_now))
        .route("/sync/status", get(sync_status))
        .route("/connectivity", post(connectivity_event))
        .route("/collections/{collection}/records", get(list_records).post(create_record))
        .route("/collections/{collection}/records/batch", post(create_batch))
        .route(
            "/collections/{collection}/records/{local_id}",
            patch(update_record).delete(delete_record),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn sync_now(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    let report = state
        .scheduler
        .sync_now()
        .await?
        .ok_or_else(|| AppError::Conflict("a sync sweep is already running".to_string()))?;
    Ok(Json(report))
}

async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusView> {
    Json(state.scheduler.status().await)
}

async fn connectivity_event(
    State(state): State<AppState>,
    Json(event): Json<ConnectivityEvent>,
) -> StatusCode {
    state.connectivity.set_reachable(event.reachable);
    StatusCode::NO_CONTENT
}

async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Value>>, AppError> {
    let collection: Collection = collection.parse()?;
    let filter = Filter::from_query_pairs(params)?;
    let rows = state.query.query(collection, &filter).await?;
    Ok(Json(rows))
}

async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<CreateResult>), AppError> {
    let created = state.recorder.create(collection.parse()?, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn create_batch(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(payloads): Json<Vec<Value>>,
) -> Result<Json<BatchResult>, AppError> {
    let result = state.recorder.create_batch(collection.parse()?, payloads).await?;
    Ok(Json(result))
}

async fn update_record(
    State(state): State<AppState>,
    Path((collection, local_id)): Path<(String, i64)>,
    Json(changes): Json<Value>,
) -> Result<Json<UpdateResult>, AppError> {
    let updated = state.recorder.update(collection.parse()?, local_id, changes).await?;
    Ok(Json(updated))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((collection, local_id)): Path<(String, i64)>,
) -> Result<Json<DeleteResult>, AppError> {
    let deleted = state.recorder.delete(collection.parse()?, local_id).await?;
    Ok(Json(deleted))
}
