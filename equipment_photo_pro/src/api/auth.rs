//! Login, logout and account routes

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use photo_pro_auth::{CodeSent, LoginOutcome, TrialStatus, UserStats};
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::{bearer_token, ApiJson, AuthUser};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

fn required(value: Option<String>, message: &str) -> AppResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}

/// POST /api/auth/send-code
pub async fn send_code(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SendCodeRequest>,
) -> AppResult<Json<CodeSent>> {
    let email = required(body.email, "Email is required")?;
    Ok(Json(state.auth.send_login_code(&email).await?))
}

/// POST /api/auth/verify-code
pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<VerifyCodeRequest>,
) -> AppResult<Json<LoginOutcome>> {
    let email = required(body.email, "Email and code are required")?;
    let code = required(body.code, "Email and code are required")?;
    Ok(Json(state.auth.verify_login_code(&email, &code).await?))
}

/// POST /api/auth/logout; succeeds with or without a live session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    if let Some(token) = bearer_token(&headers) {
        state.auth.logout(&token)?;
    }
    Ok(Json(json!({ "success": true, "message": "Logged out successfully" })))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<UserStats>> {
    let stats = tokio::task::spawn_blocking(move || state.auth.user_stats(user.id)).await??;
    Ok(Json(stats))
}

/// GET /api/auth/trial-status
pub async fn trial_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<TrialStatus>> {
    Ok(Json(state.auth.trial_status(user.id)?))
}
