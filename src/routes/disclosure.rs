use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::disclosure::PendingDisclosure;
use crate::error::Result;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QueueDisclosureRequest {
    #[serde(rename = "postId")]
    pub post_id: i64,
    pub board: String,
    /// Raw submitter address; encrypted before it is stored
    #[serde(rename = "sourceAddress")]
    pub source_address: String,
    #[serde(rename = "postContent")]
    pub post_content: String,
    #[serde(default)]
    pub evidence: serde_json::Value,
    #[serde(rename = "reporterId")]
    pub reporter_id: String,
}

#[derive(Debug, Serialize)]
pub struct QueueDisclosureResponse {
    #[serde(rename = "reportId")]
    pub report_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListPendingParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(rename = "perPage", default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    25
}

#[derive(Debug, Deserialize)]
pub struct ApproveDisclosureRequest {
    #[serde(rename = "staffId")]
    pub staff_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectDisclosureRequest {
    #[serde(rename = "staffId")]
    pub staff_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct DisclosureActionResponse {
    pub success: bool,
    pub message: String,
}

/// Flag a post for third-party abuse reporting
pub async fn queue_disclosure(
    State(state): State<AppState>,
    Json(payload): Json<QueueDisclosureRequest>,
) -> Result<Json<QueueDisclosureResponse>> {
    let report_id = state
        .disclosure
        .queue_for_review(
            payload.post_id,
            &payload.board,
            payload.source_address,
            &payload.post_content,
            payload.evidence,
            &payload.reporter_id,
        )
        .await?;

    Ok(Json(QueueDisclosureResponse { report_id }))
}

/// List the pending review queue, addresses masked
pub async fn list_pending_disclosures(
    State(state): State<AppState>,
    Query(params): Query<ListPendingParams>,
) -> Result<Json<Vec<PendingDisclosure>>> {
    let reports = state
        .disclosure
        .list_pending(params.page, params.per_page)
        .await?;
    Ok(Json(reports))
}

/// Approve a pending report and submit it externally
pub async fn approve_disclosure(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    Json(payload): Json<ApproveDisclosureRequest>,
) -> Result<Json<DisclosureActionResponse>> {
    state
        .disclosure
        .approve_and_submit(report_id, &payload.staff_id)
        .await?;

    Ok(Json(DisclosureActionResponse {
        success: true,
        message: "Report submitted to StopForumSpam".to_string(),
    }))
}

/// Reject a pending report
pub async fn reject_disclosure(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    Json(payload): Json<RejectDisclosureRequest>,
) -> Result<Json<DisclosureActionResponse>> {
    state
        .disclosure
        .reject(report_id, &payload.staff_id, &payload.reason)
        .await?;

    Ok(Json(DisclosureActionResponse {
        success: true,
        message: "Report rejected".to_string(),
    }))
}
