//! API route handlers.
//!
//! The trigger handler runs the pipeline detached from the request
//! lifecycle: the response only acknowledges that the attempt started,
//! and the terminal outcome is logged server-side. A successful update
//! would tear this connection down on restart anyway.

use axum::extract::State;
use axum::Json;
use tracing::{debug, error, info};

use murmur_updater::UpdateStatus;

use crate::error::Result;
use crate::models::TriggerResponse;
use crate::state::AppState;

/// GET /api/update/check - Compare local and remote versions.
pub async fn check_update(State(state): State<AppState>) -> Result<Json<UpdateStatus>> {
    debug!("checking for updates");
    let status = state.updater.check().await?;
    Ok(Json(status))
}

/// GET /api/update/notes - Proxy the remote release-notes document.
pub async fn update_notes(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let notes = state.updater.remote_notes().await?;
    Ok(Json(notes))
}

/// POST /api/update/trigger - Start the update pipeline.
///
/// Claims the update slot synchronously so a concurrent trigger gets
/// 409 instead of racing, then runs the pipeline in a detached task.
pub async fn trigger_update(State(state): State<AppState>) -> Result<Json<TriggerResponse>> {
    let guard = state.updater.try_begin()?;
    info!("update trigger accepted");

    let updater = state.updater.clone();
    tokio::spawn(async move {
        match updater.run(guard).await {
            Ok(outcome) => info!(?outcome, "update pipeline finished"),
            Err(e) => error!(error = %e, "update pipeline failed"),
        }
    });

    Ok(Json(TriggerResponse {
        success: true,
        message: "update started".to_string(),
    }))
}
