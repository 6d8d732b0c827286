//! Health, prompt and AI status routes

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::prompt::{option_keys, DEFAULT_PROMPT, PROMPT_DESCRIPTION};
use crate::state::AppState;

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Equipment Photo Pro API is running",
        "version": crate::VERSION,
    }))
}

/// GET /api/prompt
pub async fn prompt() -> Json<Value> {
    let (skies, pavements, landscapes) = option_keys();

    Json(json!({
        "prompt": DEFAULT_PROMPT,
        "description": PROMPT_DESCRIPTION,
        "options": {
            "skyType": skies,
            "pavementType": pavements,
            "landscapeType": landscapes,
        },
    }))
}

/// GET /api/ai-status
pub async fn ai_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let body = match state.enhancer.model_name() {
        Some(model) => json!({
            "configured": true,
            "message": "Google AI is configured and ready",
            "model": model,
        }),
        None => json!({
            "configured": false,
            "message": "Google AI not configured. Add GOOGLE_AI_API_KEY to environment variables.",
            "model": "not-configured",
        }),
    };
    Json(body)
}
