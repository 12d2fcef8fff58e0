use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::moderation::{BanStatus, ReportSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    #[serde(rename = "postId")]
    pub post_id: i64,
    pub board: String,
    pub category: String,
    #[serde(rename = "postSnapshot", default)]
    pub post_snapshot: serde_json::Value,
    #[serde(rename = "reporterAddress")]
    pub reporter_address: String,
    #[serde(rename = "postAddress")]
    pub post_address: String,
}

#[derive(Debug, Serialize)]
pub struct CreateReportResponse {
    #[serde(rename = "reportId")]
    pub report_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListReportsParams {
    #[serde(default)]
    pub board: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct RecordDecisionRequest {
    #[serde(rename = "staffId")]
    pub staff_id: String,
    pub action: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RecordDecisionResponse {
    #[serde(rename = "decisionId")]
    pub decision_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateBanRequest {
    #[serde(default)]
    pub board: Option<String>,
    #[serde(rename = "hostAddress")]
    pub host_address: String,
    #[serde(rename = "staffId")]
    pub staff_id: String,
    pub reason: String,
    #[serde(rename = "expiresAt", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateBanResponse {
    #[serde(rename = "banId")]
    pub ban_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckBanParams {
    pub board: String,
    #[serde(rename = "ipHash")]
    pub ip_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct BanMediaRequest {
    #[serde(rename = "mediaHash")]
    pub media_hash: String,
}

#[derive(Debug, Serialize)]
pub struct BanMediaResponse {
    pub success: bool,
}

/// File a report against a post
pub async fn create_report(
    State(state): State<AppState>,
    Json(payload): Json<CreateReportRequest>,
) -> Result<Json<CreateReportResponse>> {
    let report_id = state
        .moderation
        .create_report(
            payload.post_id,
            &payload.board,
            &payload.category,
            payload.post_snapshot,
            payload.reporter_address,
            payload.post_address,
        )
        .await?;

    Ok(Json(CreateReportResponse { report_id }))
}

/// Open reports for the review queue
pub async fn list_reports(
    State(state): State<AppState>,
    Query(params): Query<ListReportsParams>,
) -> Result<Json<Vec<ReportSummary>>> {
    let reports = state
        .moderation
        .list_open_reports(params.board.as_deref(), params.limit)
        .await?;
    Ok(Json(reports))
}

/// Record a staff decision on a report
pub async fn record_decision(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    Json(payload): Json<RecordDecisionRequest>,
) -> Result<Json<RecordDecisionResponse>> {
    let decision_id = state
        .moderation
        .record_decision(report_id, &payload.staff_id, &payload.action, &payload.reason)
        .await?;

    Ok(Json(RecordDecisionResponse { decision_id }))
}

/// Place a ban
pub async fn create_ban(
    State(state): State<AppState>,
    Json(payload): Json<CreateBanRequest>,
) -> Result<Json<CreateBanResponse>> {
    let ban_id = state
        .moderation
        .create_ban(
            payload.board.as_deref(),
            payload.host_address,
            &payload.staff_id,
            &payload.reason,
            payload.expires_at,
        )
        .await?;

    Ok(Json(CreateBanResponse { ban_id }))
}

/// Active-ban lookup by identity hash
pub async fn check_ban(
    State(state): State<AppState>,
    Query(params): Query<CheckBanParams>,
) -> Result<Json<BanStatus>> {
    let status = state
        .moderation
        .check_ban(&params.board, &params.ip_hash)
        .await?;
    Ok(Json(status))
}

/// Add a media fingerprint to the block set
pub async fn ban_media(
    State(state): State<AppState>,
    Json(payload): Json<BanMediaRequest>,
) -> Result<Json<BanMediaResponse>> {
    state.engine.ban_media(&payload.media_hash).await?;
    Ok(Json(BanMediaResponse { success: true }))
}
