//! Equipment Photo Pro - Shared Server State

use std::sync::Arc;

use photo_pro_auth::{AuthService, AuthStore, LogMailer, Mailer, SendGridMailer};
use secrecy::{ExposeSecret, SecretString};

use crate::ai::{GeminiClient, ImageGenerator};
use crate::config::{EmailTransport, ServerConfig};
use crate::error::AppResult;
use crate::pipeline::Enhancer;
use crate::uploads::UploadStore;

/// Per-request upload limits
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 10,
        }
    }
}

impl UploadLimits {
    /// Whole multipart body: every file at the limit plus room for form fields
    pub fn body_limit(&self) -> usize {
        (self.max_file_bytes as usize)
            .saturating_mul(self.max_files)
            .saturating_add(1024 * 1024)
    }
}

/// Everything the handlers share
pub struct AppState {
    pub auth: AuthService,
    pub enhancer: Enhancer,
    pub generator: Option<Arc<dyn ImageGenerator>>,
    pub uploads: UploadStore,
    pub limits: UploadLimits,
}

impl AppState {
    pub fn new(
        auth: AuthService,
        generator: Option<Arc<dyn ImageGenerator>>,
        uploads: UploadStore,
        limits: UploadLimits,
    ) -> Self {
        Self {
            auth,
            enhancer: Enhancer::new(generator.clone()),
            generator,
            uploads,
            limits,
        }
    }

    /// Open the database and uploads directory, build the mail and AI clients
    pub fn from_config(config: &ServerConfig) -> AppResult<Self> {
        Ok(Self::new(
            build_auth(config)?,
            build_generator(config)?,
            UploadStore::new(&config.uploads_dir)?,
            UploadLimits {
                max_file_bytes: config.max_upload_bytes,
                max_files: config.max_files_per_request,
            },
        ))
    }
}

pub fn build_mailer(config: &ServerConfig) -> AppResult<Arc<dyn Mailer>> {
    let mailer: Arc<dyn Mailer> = match config.email.service {
        EmailTransport::Log => Arc::new(LogMailer),
        EmailTransport::SendGrid => {
            let key = config
                .email
                .api_key
                .as_ref()
                .map(|k| SecretString::new(k.expose_secret().clone()))
                .ok_or_else(|| {
                    crate::error::AppError::Internal("EMAIL_API_KEY is not set".into())
                })?;
            Arc::new(SendGridMailer::new(key, config.email.from.clone())?)
        }
    };

    tracing::info!(transport = mailer.name(), "email transport ready");
    Ok(mailer)
}

pub fn build_auth(config: &ServerConfig) -> AppResult<AuthService> {
    let store = AuthStore::open(&config.database_path)?;
    tracing::info!(path = %config.database_path.display(), "database opened");

    Ok(AuthService::new(
        store,
        build_mailer(config)?,
        config.auth.clone(),
        config.trial.clone(),
    ))
}

fn build_generator(config: &ServerConfig) -> AppResult<Option<Arc<dyn ImageGenerator>>> {
    match GeminiClient::from_config(&config.ai)? {
        Some(client) => {
            tracing::info!(
                analysis = %config.ai.analysis_model,
                image = %config.ai.image_model,
                "Google AI configured"
            );
            Ok(Some(Arc::new(client)))
        }
        None => Ok(None),
    }
}
