//! Sync API endpoints
//!
//! Provides endpoints for multi-device synchronization.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{SyncRequest, SyncResponse};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(sync_changes))
        .route("/changes", get(get_changes))
}

/// Query parameters for the catch-up feed
#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    pub since: Option<DateTime<Utc>>,
}

/// Merge a client's local changes and return what it must reconcile
async fn sync_changes(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    let response = state
        .sync()
        .apply_changes(user.id(), &req)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id(), error = %e, "sync failed");
            AppError::Internal("sync failed".to_string())
        })?;

    Ok(Json(response))
}

/// Everything changed for the user since a checkpoint, or the full dataset
async fn get_changes(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<SyncResponse>> {
    let response = state.sync().changes_since(user.id(), query.since).await?;
    Ok(Json(response))
}
