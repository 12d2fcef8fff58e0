use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::constants::ERR_INVALID_IDENTITY_HASH;
use crate::error::{AppError, Result};
use crate::security;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Deterministic identity hash; the posting layer derives it from the
    /// source address so raw PII never has to travel for rate limiting
    #[serde(rename = "identityHash")]
    pub identity_hash: String,
    pub content: String,
    #[serde(rename = "isThread", default)]
    pub is_thread: bool,
    #[serde(rename = "mediaHash", default)]
    pub media_hash: Option<String>,
    /// Raw address, used only for external intelligence lookups
    #[serde(rename = "sourceAddress", default)]
    pub source_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub score: i32,
    pub reasons: Vec<String>,
    #[serde(rename = "captchaRequired")]
    pub captcha_required: bool,
}

/// Decision pipeline entrypoint, consumed by the posting layer
pub async fn check_submission(
    State(state): State<AppState>,
    Json(payload): Json<CheckRequest>,
) -> Result<Json<CheckResponse>> {
    if !security::is_valid_hash(&payload.identity_hash) {
        return Err(AppError::InvalidInput(ERR_INVALID_IDENTITY_HASH.to_string()));
    }

    let verdict = state
        .engine
        .evaluate(
            &payload.identity_hash,
            &payload.content,
            payload.is_thread,
            payload.media_hash.as_deref(),
            payload.source_address.as_deref(),
        )
        .await;

    Ok(Json(CheckResponse {
        allowed: verdict.allowed,
        score: verdict.score,
        reasons: verdict.reasons,
        captcha_required: verdict.challenge_required,
    }))
}
