//! # Equipment Photo Pro
//!
//! Photo enhancement backend for equipment dealers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  EQUIPMENT PHOTO PRO                     │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  HTTP API   │  │  AUTH       │  │  SWEEPER        │  │
//! │  │  (axum)     │──│  codes +    │  │  uploads +      │  │
//! │  │             │  │  sessions   │  │  sessions       │  │
//! │  └──────┬──────┘  └─────────────┘  └─────────────────┘  │
//! │         │                                                │
//! │  ┌──────┴──────────────────────────────────────────────┐ │
//! │  │                 ENHANCEMENT PIPELINE                 │ │
//! │  │   Gemini image  →  guided filters  →  manual filters │ │
//! │  │              then watermark + JPEG                   │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Access Model
//!
//! - Passwordless login with emailed six-digit codes
//! - Bearer session tokens, hashed at rest
//! - Trial quota (30 images / 30 days) unless subscribed or admin
//! - Uploads and outputs expire after the retention window

pub mod ai;
pub mod api;
pub mod config;
pub mod error;
pub mod filters;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod state;
pub mod sweeper;
pub mod uploads;
pub mod watermark;

pub use ai::{AiError, AiOutcome, GeminiClient, ImageGenerator};
pub use config::{ConfigError, ServerConfig};
pub use error::{AppError, AppResult};
pub use pipeline::{EnhancementMethod, EnhancementReport, Enhancer};
pub use prompt::PromptSettings;
pub use state::{AppState, UploadLimits};
pub use uploads::UploadStore;

/// Equipment Photo Pro version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_auth_crate() {
        assert_eq!(VERSION, photo_pro_auth::VERSION);
    }
}
