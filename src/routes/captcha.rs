use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct IssueCaptchaResponse {
    pub token: String,
    /// The caller renders this server-side; it is not sent to end clients
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCaptchaRequest {
    pub token: String,
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCaptchaResponse {
    pub valid: bool,
}

/// Issue a challenge token for a high-risk submission
pub async fn issue_captcha(State(state): State<AppState>) -> Result<Json<IssueCaptchaResponse>> {
    let challenge = state.captcha.issue().await?;
    Ok(Json(IssueCaptchaResponse {
        token: challenge.token,
        answer: challenge.answer,
    }))
}

/// Verify a challenge response; tokens are single use
pub async fn verify_captcha(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCaptchaRequest>,
) -> Result<Json<VerifyCaptchaResponse>> {
    let valid = state.captcha.verify(&payload.token, &payload.response).await?;
    Ok(Json(VerifyCaptchaResponse { valid }))
}
