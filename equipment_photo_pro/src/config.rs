//! Equipment Photo Pro - Server Configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `.env`,
//! then process environment. `validate()` runs last.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use photo_pro_auth::{AuthPolicy, TrialPolicy};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ═══════════════════════════════════════════════════════════════════════════════
// SECTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Gemini settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Missing key disables AI processing
    pub api_key: Option<SecretString>,
    pub api_base: String,
    pub analysis_model: String,
    pub image_model: String,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: crate::ai::GEMINI_API_BASE.to_string(),
            analysis_model: crate::ai::ANALYSIS_MODEL.to_string(),
            image_model: crate::ai::IMAGE_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

impl AiConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }
}

/// Which mail transport to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailTransport {
    /// Print messages to the log
    Log,
    SendGrid,
}

impl FromStr for EmailTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" | "console" | "dev" => Ok(Self::Log),
            "sendgrid" => Ok(Self::SendGrid),
            other => Err(format!("unknown email service '{other}'")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub service: EmailTransport,
    pub api_key: Option<SecretString>,
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            service: EmailTransport::Log,
            api_key: None,
            from: "Equipment Photo Pro <noreply@equipmentphotopro.com>".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVER CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub uploads_dir: PathBuf,

    /// Allowed browser origins; empty allows any
    pub cors_origins: Vec<String>,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Per-file upload limit (bytes)
    pub max_upload_bytes: u64,
    pub max_files_per_request: usize,

    /// Uploaded and enhanced files older than this are deleted
    pub retention_minutes: u64,
    pub sweep_interval_minutes: u64,

    pub ai: AiConfig,
    pub email: EmailConfig,
    pub auth: AuthPolicy,
    pub trial: TrialPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            database_path: PathBuf::from("./data/equipment_photo_pro.db"),
            uploads_dir: PathBuf::from("./uploads"),
            cors_origins: Vec::new(),
            log_json: false,
            max_upload_bytes: 10 * 1024 * 1024,
            max_files_per_request: 10,
            retention_minutes: 60,
            sweep_interval_minutes: 60,
            ai: AiConfig::default(),
            email: EmailConfig::default(),
            auth: AuthPolicy::default(),
            trial: TrialPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, optional TOML file, `.env`, then the environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Ignoring unreadable .env file: {e}"),
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from environment variables looked up through `var`
    pub fn apply_env<F>(&mut self, var: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = parse_var("PORT", &port)?;
        }
        if let Some(path) = var("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(dir) = var("UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(dir);
        }
        if let Some(origins) = var("CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(json) = var("LOG_JSON") {
            self.log_json = parse_var("LOG_JSON", &json)?;
        }

        if let Some(key) = var("GOOGLE_AI_API_KEY") {
            self.ai.api_key = Some(SecretString::new(key));
        }

        if let Some(service) = var("EMAIL_SERVICE") {
            self.email.service = service.parse().map_err(|message| ConfigError::Invalid {
                key: "EMAIL_SERVICE",
                message,
            })?;
        }
        // EMAIL_PASSWORD is the older name for the provider key
        if let Some(key) = var("EMAIL_API_KEY").or_else(|| var("EMAIL_PASSWORD")) {
            self.email.api_key = Some(SecretString::new(key));
        }
        if let Some(from) = var("EMAIL_FROM") {
            self.email.from = from;
        }

        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_upload_bytes == 0 {
            return Err(invalid("max_upload_bytes", "must be greater than zero"));
        }
        if self.max_files_per_request == 0 {
            return Err(invalid("max_files_per_request", "must be greater than zero"));
        }
        if self.sweep_interval_minutes == 0 {
            return Err(invalid("sweep_interval_minutes", "must be greater than zero"));
        }
        if self.auth.code_ttl_minutes <= 0 || self.auth.session_ttl_days <= 0 {
            return Err(invalid("auth", "expiry windows must be positive"));
        }
        if self.auth.max_code_attempts == 0 {
            return Err(invalid("auth.max_code_attempts", "must be at least 1"));
        }
        if self.email.service == EmailTransport::SendGrid {
            let has_key = self
                .email
                .api_key
                .as_ref()
                .is_some_and(|k| !k.expose_secret().trim().is_empty());
            if !has_key {
                return Err(invalid(
                    "EMAIL_API_KEY",
                    "required when EMAIL_SERVICE is sendgrid",
                ));
            }
        }
        if !self.ai.is_configured() {
            warn!("GOOGLE_AI_API_KEY not set, images will be enhanced with local filters only");
        }
        Ok(())
    }

    /// `host:port` for the listener; host names are resolved at bind time
    /// and bare IPv6 literals get bracketed.
    pub fn bind_addr(&self) -> ConfigResult<String> {
        let host = self.host.trim();
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid("HOST", "must be a host name or IP address"));
        }
        if host.contains(':') && !host.starts_with('[') {
            Ok(format!("[{host}]:{}", self.port))
        } else {
            Ok(format!("{host}:{}", self.port))
        }
    }
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: &str) -> ConfigResult<T>
where
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        invalid(key, e.to_string())
    })
}
