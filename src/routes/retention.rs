use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RetentionRunResponse {
    /// Rows affected per protected dataset
    pub results: BTreeMap<&'static str, u64>,
}

/// Trigger a retention sweep outside the schedule
///
/// Safe to call at any time: the sweep is idempotent.
pub async fn run_retention(State(state): State<AppState>) -> Result<Json<RetentionRunResponse>> {
    let results = state.retention.run_all().await;
    Ok(Json(RetentionRunResponse { results }))
}
