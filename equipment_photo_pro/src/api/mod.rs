//! Equipment Photo Pro - HTTP API
//!
//! JSON over HTTP. Authenticated routes take `Authorization: Bearer <token>`.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod extract;
pub mod images;
pub mod system;

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the full application router
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let body_limit = state.limits.body_limit();

    Router::new()
        // System
        .route("/api/health", get(system::health))
        .route("/api/prompt", get(system::prompt))
        .route("/api/ai-status", get(system::ai_status))
        // Auth
        .route("/api/auth/send-code", post(auth::send_code))
        .route("/api/auth/verify-code", post(auth::verify_code))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/trial-status", get(auth::trial_status))
        // Images
        .route("/api/upload", post(images::upload))
        .route("/api/ai-suggestions", post(images::ai_suggestions))
        .route("/api/download/:filename", get(images::download))
        // Admin
        .route("/api/admin/stats", get(admin::stats))
        .route(
            "/api/admin/users/:id/subscription",
            post(admin::set_subscription),
        )
        .route("/api/admin/test-email", post(admin::test_email))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}
