//! Wire models for the update API.
//!
//! The check response reuses [`murmur_updater::UpdateStatus`] directly;
//! release notes pass through as arbitrary JSON.

use serde::{Deserialize, Serialize};

/// Response for `POST /api/update/trigger`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
}
