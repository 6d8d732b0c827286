//! Admin routes

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use photo_pro_auth::{AdminStats, SubscriptionStatus, UserProfile};
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::{AdminUser, ApiJson};
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestEmailRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
) -> AppResult<Json<AdminStats>> {
    // full-table aggregates; keep them off the async workers
    let stats = tokio::task::spawn_blocking(move || state.auth.admin_stats()).await??;
    Ok(Json(stats))
}

/// POST /api/admin/users/:id/subscription
pub async fn set_subscription(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    ApiJson(body): ApiJson<SubscriptionRequest>,
) -> AppResult<Json<UserProfile>> {
    let status: SubscriptionStatus = body.status.parse()?;
    tracing::info!(admin = %admin.email, user_id, %status, "admin subscription change");
    Ok(Json(state.auth.set_subscription(user_id, status)?))
}

/// POST /api/admin/test-email; defaults to the admin's own address
pub async fn test_email(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    body: Option<ApiJson<TestEmailRequest>>,
) -> AppResult<Json<Value>> {
    // body is optional; no address means the admin's own
    let to = body
        .and_then(|ApiJson(body)| body.email)
        .filter(|e| !e.trim().is_empty())
        .unwrap_or(admin.email);

    let message_id = state.auth.send_test_email(&to).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Test email sent",
        "messageId": message_id,
        "to": to,
        "transport": state.auth.mailer_name(),
    })))
}
