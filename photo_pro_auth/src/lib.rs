//! # Photo Pro Auth - passwordless accounts for Equipment Photo Pro
//!
//! ## Capabilities:
//! - Six-digit email verification codes (10 minute expiry, attempt limit)
//! - 256-bit bearer session tokens, stored hashed (30 day expiry)
//! - Trial accounting (30 images / 30 days) with subscription override
//! - Processing history and admin statistics
//! - SendGrid delivery with a log transport for development

pub mod email;
pub mod error;
pub mod mailer;
pub mod policy;
pub mod service;
pub mod store;
pub mod tokens;

// Re-exports
pub use email::EmailMessage;
pub use error::{AuthError, AuthResult};
pub use mailer::{LogMailer, Mailer, MemoryMailer, SendGridMailer};
pub use policy::{AuthPolicy, SubscriptionStatus, TrialPolicy, TrialStatus};
pub use service::{
    AdminStats, AdminUserRow, AuthService, CleanupReport, CodeSent, LoginOutcome, UserProfile,
    UserStats,
};
pub use store::{AuthStore, ProcessingRecord, TotalStats, User};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
