//! Equipment Photo Pro - AI Enhancement
//!
//! Gemini `generateContent` client. Enhancement is two calls: the analysis
//! model describes the equipment, then the image model renders it into the
//! requested scene. Quota exhaustion is an outcome, not an error, so the
//! pipeline can fall back to local filters.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::AiConfig;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const ANALYSIS_MODEL: &str = "gemini-2.5-flash";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";

const ANALYSIS_PROMPT: &str = "Analyze this equipment image and describe:
1. What type of equipment is shown (tractor, combine harvester, ATV, etc.)
2. The color of the equipment
3. Any visible text, numbers, or logos
4. The current background
5. The current lighting conditions

Provide a detailed description that could be used to recreate this equipment in a professional setting.";

const SUGGESTIONS_PROMPT: &str = "Analyze this equipment image and suggest specific enhancements for a professional dealership listing. Focus on:
1. Background improvements
2. Lighting adjustments
3. Color enhancements
4. Detail sharpening
5. Any issues that need fixing

Provide 3-5 specific, actionable suggestions.";

/// Shown when the AI is unavailable
pub const DEFAULT_SUGGESTIONS: &[&str] = &[
    "Enable background replacement for professional look",
    "Adjust lighting for better equipment visibility",
    "Enhance colors while preserving equipment details",
    "Apply sharpening for crisp equipment features",
];

pub fn default_suggestions() -> Vec<String> {
    DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Google AI API key not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Gemini returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Gemini returned no usable content")]
    EmptyResponse,

    #[error("Invalid image data in response: {0}")]
    InvalidImageData(String),
}

pub type AiResult<T> = Result<T, AiError>;

impl AiError {
    /// Rate limit or exhausted quota
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            AiError::Api { status, message } => {
                let message = message.to_ascii_lowercase();
                *status == 429
                    || message.contains("quota")
                    || message.contains("resource_exhausted")
                    || message.contains("too many requests")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        AiError::Http(e.to_string())
    }
}

/// What the model produced for one image
#[derive(Debug, Clone, PartialEq)]
pub enum AiOutcome {
    /// A generated replacement image
    Image { data: Vec<u8>, mime: String },
    /// Text only; the pipeline applies guided filters instead
    Analysis { text: String },
    QuotaExceeded,
}

impl AiOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            AiOutcome::Image { .. } => "image",
            AiOutcome::Analysis { .. } => "analysis",
            AiOutcome::QuotaExceeded => "quota-exceeded",
        }
    }
}

/// An AI backend able to enhance equipment photos
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn enhance(&self, image: &[u8], mime: &str, prompt: &str) -> AiResult<AiOutcome>;

    async fn suggestions(&self, image: &[u8], mime: &str) -> AiResult<Vec<String>>;
}

/// The API rejects `image/jpg`
pub fn normalize_mime(mime: &str) -> &str {
    if mime.eq_ignore_ascii_case("image/jpg") {
        "image/jpeg"
    } else {
        mime
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESPONSE SHAPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: Option<String>,
    data: String,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> Option<String> {
        let text = self
            .parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    fn inline_image(&self) -> Option<&InlineData> {
        self.parts()
            .filter_map(|p| p.inline_data.as_ref())
            .find(|d| !d.data.is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GEMINI CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Google Gemini over REST
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    analysis_model: String,
    image_model: String,
}

impl GeminiClient {
    /// Create new client with default endpoint and models
    pub fn new(api_key: SecretString) -> AiResult<Self> {
        Self::build(
            api_key,
            GEMINI_API_BASE,
            ANALYSIS_MODEL,
            IMAGE_MODEL,
            Duration::from_secs(120),
        )
    }

    /// `None` when no API key is configured
    pub fn from_config(config: &AiConfig) -> AiResult<Option<Self>> {
        let Some(key) = config.api_key.as_ref().filter(|_| config.is_configured()) else {
            return Ok(None);
        };

        Self::build(
            SecretString::new(key.expose_secret().clone()),
            &config.api_base,
            &config.analysis_model,
            &config.image_model,
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    fn build(
        api_key: SecretString,
        base_url: &str,
        analysis_model: &str,
        image_model: &str,
        timeout: Duration,
    ) -> AiResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            analysis_model: analysis_model.to_string(),
            image_model: image_model.to_string(),
        })
    }

    /// Point the client at another endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn generate(&self, model: &str, body: &Value) -> AiResult<GenerateResponse> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| text.chars().take(300).collect());

            tracing::warn!(%model, %status, "gemini request failed: {}", message);
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| AiError::Http(format!("malformed response: {e}")))
    }

    fn request(prompt: &str, image_b64: &str, mime: &str) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": mime, "data": image_b64 } },
                ]
            }]
        })
    }

    async fn enhance_inner(&self, image: &[u8], mime: &str, prompt: &str) -> AiResult<AiOutcome> {
        let mime = normalize_mime(mime);
        let image_b64 = STANDARD.encode(image);

        tracing::debug!(model = %self.analysis_model, "analyzing equipment image");
        let analysis = self
            .generate(
                &self.analysis_model,
                &Self::request(ANALYSIS_PROMPT, &image_b64, mime),
            )
            .await?
            .text()
            .ok_or(AiError::EmptyResponse)?;

        let full_prompt = format!(
            "Create a professional equipment photo based on this description: {analysis}\n\n\
             Apply these enhancement requirements:\n{prompt}\n\n\
             Generate a new image that:\n\
             1. Shows the same type of equipment with the same colors and details\n\
             2. Keeps the scene, surface and sky requested above\n\
             3. Has realistic, balanced lighting that enhances the subject without looking artificial\n\
             4. Maintains a clean, professional aesthetic\n\
             5. Preserves all text, numbers, and logos from the original equipment\n\n\
             The image should look professional and suitable for a dealership listing."
        );

        let mut body = Self::request(&full_prompt, &image_b64, mime);
        body["generationConfig"] = json!({ "responseModalities": ["TEXT", "IMAGE"] });

        tracing::debug!(model = %self.image_model, "generating enhanced image");
        let response = self.generate(&self.image_model, &body).await?;

        if let Some(inline) = response.inline_image() {
            let data = STANDARD
                .decode(inline.data.trim())
                .map_err(|e| AiError::InvalidImageData(e.to_string()))?;
            let mime = inline
                .mime_type
                .clone()
                .unwrap_or_else(|| "image/png".to_string());

            tracing::info!(bytes = data.len(), %mime, "gemini generated enhanced image");
            return Ok(AiOutcome::Image { data, mime });
        }

        tracing::info!("gemini returned analysis instead of an image");
        Ok(AiOutcome::Analysis {
            text: response.text().unwrap_or(analysis),
        })
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    fn model_name(&self) -> &str {
        &self.analysis_model
    }

    async fn enhance(&self, image: &[u8], mime: &str, prompt: &str) -> AiResult<AiOutcome> {
        match self.enhance_inner(image, mime, prompt).await {
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!("gemini quota exceeded, falling back to local enhancement");
                Ok(AiOutcome::QuotaExceeded)
            }
            other => other,
        }
    }

    async fn suggestions(&self, image: &[u8], mime: &str) -> AiResult<Vec<String>> {
        let body = Self::request(SUGGESTIONS_PROMPT, &STANDARD.encode(image), normalize_mime(mime));
        let text = self
            .generate(&self.analysis_model, &body)
            .await?
            .text()
            .ok_or(AiError::EmptyResponse)?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}
