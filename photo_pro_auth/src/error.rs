//! Error types for the auth crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Invalid code format")]
    InvalidCodeFormat,

    #[error("Invalid or expired verification code")]
    InvalidCode,

    #[error("Too many attempts - request a new verification code")]
    CodeAttemptsExceeded,

    #[error("No session token provided")]
    MissingToken,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Admin privileges required")]
    NotAdmin,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Processing not allowed: {0}")]
    TrialDenied(String),

    #[error("Unknown subscription status: {0}")]
    InvalidSubscriptionStatus(String),

    #[error("Failed to send email: {0}")]
    EmailDelivery(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupted record: {0}")]
    CorruptedRecord(String),
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Errors caused by the caller's input rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEmail
                | Self::InvalidCodeFormat
                | Self::InvalidCode
                | Self::CodeAttemptsExceeded
                | Self::InvalidSubscriptionStatus(_)
        )
    }

    /// Errors that mean the caller is not (or no longer) authenticated
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::MissingToken | Self::InvalidSession)
    }
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        AuthError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::EmailDelivery(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(AuthError::InvalidEmail.is_client_error());
        assert!(AuthError::InvalidCode.is_client_error());
        assert!(!AuthError::Database("locked".into()).is_client_error());

        assert!(AuthError::InvalidSession.is_auth_failure());
        assert!(!AuthError::NotAdmin.is_auth_failure());
    }
}
