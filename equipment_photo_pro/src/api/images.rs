//! Upload, enhancement, suggestion and download routes

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use photo_pro_auth::AuthError;
use serde::Serialize;
use serde_json::{json, Value};

use super::extract::AuthUser;
use crate::ai::default_suggestions;
use crate::error::{AppError, AppResult};
use crate::filters::FilterSettings;
use crate::pipeline::{EnhancementMethod, EnhancementReport};
use crate::prompt::{resolve_prompt, PromptSettings};
use crate::state::AppState;
use crate::uploads::{enhanced_name, ImageKind};

/// An `images` part as received
struct IncomingFile {
    filename: String,
    data: Vec<u8>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalFile {
    pub filename: String,
    pub stored_name: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedFile {
    pub filename: String,
    pub download_url: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
    pub original: OriginalFile,
    pub enhanced: EnhancedFile,
    pub method: EnhancementMethod,
    pub watermarked: bool,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

/// Form fields of an upload request
struct UploadForm {
    files: Vec<IncomingFile>,
    prompt_settings: PromptSettings,
    filter_settings: FilterSettings,
    dynamic_prompt: Option<String>,
}

async fn read_upload_form(state: &AppState, mut multipart: Multipart) -> AppResult<UploadForm> {
    let limits = state.limits;
    let mut form = UploadForm {
        files: Vec::new(),
        prompt_settings: PromptSettings::default(),
        filter_settings: FilterSettings::default(),
        dynamic_prompt: None,
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let is_image = field
                    .content_type()
                    .is_some_and(|mime| mime.starts_with("image/"));
                if !is_image {
                    return Err(AppError::UnsupportedMediaType(filename));
                }
                if form.files.len() >= limits.max_files {
                    return Err(AppError::BadRequest(format!(
                        "Too many files (max: {})",
                        limits.max_files
                    )));
                }

                let data = field.bytes().await?;
                let size = data.len() as u64;
                if size > limits.max_file_bytes {
                    return Err(AppError::FileTooLarge {
                        size,
                        max: limits.max_file_bytes,
                    });
                }

                form.files.push(IncomingFile {
                    filename,
                    data: data.to_vec(),
                });
            }
            "promptSettings" => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    form.prompt_settings = serde_json::from_str(&raw).map_err(|e| {
                        AppError::BadRequest(format!("Invalid promptSettings: {e}"))
                    })?;
                    form.filter_settings = serde_json::from_str(&raw).map_err(|e| {
                        AppError::BadRequest(format!("Invalid promptSettings: {e}"))
                    })?;
                }
            }
            "dynamicPrompt" => {
                form.dynamic_prompt = Some(field.text().await?);
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown form field");
            }
        }
    }

    Ok(form)
}

/// POST /api/upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    state.auth.ensure_can_process(user.id)?;

    let form = read_upload_form(&state, multipart).await?;
    if form.files.is_empty() {
        return Err(AppError::NoImages);
    }

    let prompt = resolve_prompt(&form.prompt_settings, form.dynamic_prompt.as_deref());
    let mut files = Vec::new();
    let mut skipped = Vec::new();

    for incoming in form.files {
        match state.auth.reserve_image(user.id) {
            Ok(()) => {}
            Err(AuthError::TrialDenied(reason)) => {
                skipped.push(SkippedFile {
                    filename: incoming.filename,
                    reason,
                });
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        match process_file(&state, user.id, &incoming, form.filter_settings, &prompt).await {
            Ok(processed) => files.push(processed),
            Err(e) => {
                if let Err(release) = state.auth.release_image(user.id) {
                    tracing::error!(user_id = user.id, "failed to release trial slot: {}", release);
                }
                tracing::warn!(user_id = user.id, file = %incoming.filename, "image skipped: {}", e);
                skipped.push(SkippedFile {
                    filename: incoming.filename,
                    reason: e.to_string(),
                });
            }
        }
    }

    let message = match (files.len(), skipped.len()) {
        (n, 0) => format!("Successfully processed {n} image(s)"),
        (n, s) => format!("Processed {n} image(s), skipped {s}"),
    };

    Ok(Json(json!({
        "success": !files.is_empty(),
        "message": message,
        "files": files,
        "skipped": skipped,
        "prompt": prompt,
        "aiConfigured": state.enhancer.ai_configured(),
        "aiModel": state.enhancer.model_name(),
        "enhancements": form.filter_settings,
        "trial": state.auth.trial_status(user.id)?,
    })))
}

async fn process_file(
    state: &AppState,
    user_id: i64,
    incoming: &IncomingFile,
    settings: FilterSettings,
    prompt: &str,
) -> AppResult<ProcessedFile> {
    let started = Instant::now();

    let stored = state
        .uploads
        .save_upload(&incoming.data, state.limits.max_file_bytes)?;
    let output_name = enhanced_name(&stored.name);
    let output_path = state.uploads.resolve(&output_name)?;

    let report: EnhancementReport = state
        .enhancer
        .enhance(&stored.path, &output_path, stored.kind.mime(), settings, prompt)
        .await?;

    let elapsed = started.elapsed().as_millis() as u64;
    state.auth.track_image_processing(
        user_id,
        &incoming.filename,
        stored.size,
        elapsed,
        report.method.as_str(),
    )?;

    Ok(ProcessedFile {
        original: OriginalFile {
            filename: incoming.filename.clone(),
            stored_name: stored.name,
            size: stored.size,
        },
        enhanced: EnhancedFile {
            download_url: format!("/api/download/{output_name}"),
            filename: output_name,
            size: report.output_size,
            width: report.width,
            height: report.height,
        },
        method: report.method,
        watermarked: report.watermarked,
        processing_time_ms: elapsed,
        fallback_reason: report.fallback_reason,
        analysis: report.analysis,
    })
}

/// POST /api/ai-suggestions
pub async fn ai_suggestions(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let data = field.bytes().await?;
            if data.len() as u64 > state.limits.max_file_bytes {
                return Err(AppError::FileTooLarge {
                    size: data.len() as u64,
                    max: state.limits.max_file_bytes,
                });
            }
            image = Some(data);
        }
    }

    let data = image.ok_or_else(|| AppError::BadRequest("No image provided".into()))?;
    let kind = ImageKind::detect(&data)
        .ok_or_else(|| AppError::UnsupportedMediaType("unrecognised image data".into()))?;

    let Some(generator) = state.generator.as_ref() else {
        return Ok(Json(json!({
            "success": true,
            "aiConfigured": false,
            "suggestions": default_suggestions(),
        })));
    };

    let suggestions = match generator.suggestions(&data, kind.mime()).await {
        Ok(list) if !list.is_empty() => list,
        Ok(_) => default_suggestions(),
        Err(e) => {
            tracing::warn!("AI suggestions failed, using defaults: {}", e);
            default_suggestions()
        }
    };

    Ok(Json(json!({
        "success": true,
        "aiConfigured": true,
        "suggestions": suggestions,
    })))
}

/// GET /api/download/:filename
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let data = state.uploads.read_file(&filename)?;

    let mime = filename
        .rsplit_once('.')
        .and_then(|(_, ext)| ImageKind::from_extension(ext))
        .map(|k| k.mime())
        .unwrap_or("application/octet-stream");

    let headers = [
        (CONTENT_TYPE, mime.to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];

    Ok((headers, data))
}
