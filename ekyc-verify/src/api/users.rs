//! User onboarding endpoints

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::VerifyResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub user_id: i64,
}

/// POST /api/users
pub async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> VerifyResult<Json<RegisterResponse>> {
    let user_id = state
        .engine
        .register_user(&req.full_name, &req.email, &req.phone)
        .await?;
    Ok(Json(RegisterResponse {
        success: true,
        user_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub success: bool,
    pub session_id: String,
    pub token: String,
    pub expires_at: NaiveDateTime,
    /// Relative URL the user follows to begin verification
    pub verification_url: String,
}

/// POST /api/users/:user_id/verification-link
///
/// Always mints a fresh session; prior links for the same user stay
/// valid until their own deadlines but are never extended.
pub async fn issue_verification_link(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> VerifyResult<Json<LinkResponse>> {
    let link = state.engine.issue_link(user_id).await?;
    let verification_url = format!("/verify?token={}", link.token);
    Ok(Json(LinkResponse {
        success: true,
        session_id: link.session_id,
        token: link.token,
        expires_at: link.expires_at,
        verification_url,
    }))
}
