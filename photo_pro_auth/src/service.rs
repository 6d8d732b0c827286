//! Auth Service - the operations the HTTP layer calls
//!
//! Combines the store, the mail transport and the policies. Store calls are
//! short and synchronous; only mail delivery awaits.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::email::{test_email, verification_email, welcome_email};
use crate::error::{AuthError, AuthResult};
use crate::mailer::Mailer;
use crate::policy::{AuthPolicy, SubscriptionStatus, TrialPolicy, TrialStatus};
use crate::store::{AuthStore, CodeCheck, ProcessingRecord, TotalStats, User};
use crate::tokens::{
    generate_session_token, generate_verification_code, hash_token, is_valid_code,
    is_valid_email, normalize_email,
};

/// Records shown on the account page
pub const RECENT_HISTORY_LIMIT: usize = 20;

/// Public view of a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub images_processed_count: u32,
    pub is_admin: bool,
    pub subscription_status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            images_processed_count: user.images_processed_count,
            is_admin: user.is_admin,
            subscription_status: user.subscription_status,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSent {
    pub success: bool,
    pub message: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub success: bool,
    pub message: String,
    pub session_token: String,
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
    pub is_new_user: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user: UserProfile,
    pub trial: TrialStatus,
    pub recent_processing: Vec<ProcessingRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserRow {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub images_processed_count: u32,
    pub is_admin: bool,
    pub status: String,
    pub subscription_status: SubscriptionStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    #[serde(flatten)]
    pub totals: TotalStats,
    pub users: Vec<AdminUserRow>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub sessions_removed: usize,
    pub codes_removed: usize,
}

/// Passwordless auth, sessions and trial accounting
pub struct AuthService {
    store: AuthStore,
    mailer: Arc<dyn Mailer>,
    policy: AuthPolicy,
    trial: TrialPolicy,
}

impl AuthService {
    pub fn new(
        store: AuthStore,
        mailer: Arc<dyn Mailer>,
        policy: AuthPolicy,
        trial: TrialPolicy,
    ) -> Self {
        Self {
            store,
            mailer,
            policy,
            trial,
        }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn trial_policy(&self) -> &TrialPolicy {
        &self.trial
    }

    pub fn mailer_name(&self) -> &'static str {
        self.mailer.name()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LOGIN FLOW
    // ═══════════════════════════════════════════════════════════════════════

    /// Issue a fresh verification code and email it
    pub async fn send_login_code(&self, email: &str) -> AuthResult<CodeSent> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let code = generate_verification_code();
        let now = Utc::now();
        self.store
            .create_auth_code(&email, &code, now, now + self.policy.code_ttl())?;

        let message = verification_email(&email, &code, self.policy.code_ttl_minutes);
        let message_id = self.mailer.send(&message).await.map_err(|e| {
            tracing::error!(%email, "failed to deliver verification code: {}", e);
            e
        })?;

        tracing::info!(%email, %message_id, "verification code sent");

        Ok(CodeSent {
            success: true,
            message: "Verification code sent to your email".into(),
            expires_in: self.policy.code_ttl().num_milliseconds(),
        })
    }

    /// Exchange a verification code for a session
    pub async fn verify_login_code(&self, email: &str, code: &str) -> AuthResult<LoginOutcome> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let code = code.trim();
        if !is_valid_code(code) {
            return Err(AuthError::InvalidCodeFormat);
        }

        let now = Utc::now();
        match self
            .store
            .consume_auth_code(&email, code, now, self.policy.max_code_attempts)?
        {
            CodeCheck::Accepted => {}
            CodeCheck::TooManyAttempts => {
                tracing::warn!(%email, "verification code burned after too many attempts");
                return Err(AuthError::CodeAttemptsExceeded);
            }
            CodeCheck::Mismatch { attempts_left } => {
                tracing::debug!(%email, attempts_left, "wrong verification code");
                return Err(AuthError::InvalidCode);
            }
            CodeCheck::NotFound => return Err(AuthError::InvalidCode),
        }

        let (user, is_new_user) = match self.store.user_by_email(&email)? {
            Some(user) => (user, false),
            None => {
                let user = self.store.create_user(&email, now)?;
                tracing::info!(user_id = user.id, %email, "new account created");

                // Login does not depend on the welcome email
                if let Err(e) = self.mailer.send(&welcome_email(&email)).await {
                    tracing::warn!(%email, "failed to send welcome email: {}", e);
                }
                (user, true)
            }
        };

        self.store.touch_last_login(user.id, now)?;

        let session_token = generate_session_token();
        let expires_at = now + self.policy.session_ttl();
        self.store
            .create_session(user.id, &hash_token(&session_token), now, expires_at)?;

        let user = self
            .store
            .user_by_id(user.id)?
            .ok_or_else(|| AuthError::UserNotFound(user.id.to_string()))?;

        Ok(LoginOutcome {
            success: true,
            message: "Login successful".into(),
            session_token,
            user: UserProfile::from(&user),
            expires_at,
            is_new_user,
        })
    }

    /// Resolve a bearer token to its user
    pub fn verify_session(&self, token: &str) -> AuthResult<User> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        self.store
            .session_user(&hash_token(token), Utc::now())?
            .ok_or(AuthError::InvalidSession)
    }

    /// Like [`verify_session`](Self::verify_session) but admin-only
    pub fn verify_admin(&self, token: &str) -> AuthResult<User> {
        let user = self.verify_session(token)?;
        if !user.is_admin {
            return Err(AuthError::NotAdmin);
        }
        Ok(user)
    }

    pub fn logout(&self, token: &str) -> AuthResult<()> {
        if self.store.delete_session(&hash_token(token.trim()))? {
            tracing::debug!("session closed");
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRIAL GATE
    // ═══════════════════════════════════════════════════════════════════════

    fn user(&self, user_id: i64) -> AuthResult<User> {
        self.store
            .user_by_id(user_id)?
            .ok_or_else(|| AuthError::UserNotFound(user_id.to_string()))
    }

    pub fn trial_status(&self, user_id: i64) -> AuthResult<TrialStatus> {
        let user = self.user(user_id)?;
        Ok(self.trial.evaluate(&user.trial_access(), Utc::now()))
    }

    /// Error out when the account may not process images right now
    pub fn ensure_can_process(&self, user_id: i64) -> AuthResult<TrialStatus> {
        let status = self.trial_status(user_id)?;
        if !status.can_process {
            let reason = status
                .reason
                .clone()
                .unwrap_or_else(|| "processing not allowed".into());
            return Err(AuthError::TrialDenied(reason));
        }
        Ok(status)
    }

    /// Claim one image from the quota before processing starts.
    ///
    /// Concurrent callers cannot overshoot the trial limit: the check and the
    /// increment are one statement. Pair a failed run with [`Self::release_image`].
    pub fn reserve_image(&self, user_id: i64) -> AuthResult<()> {
        let cutoff = Utc::now() - Duration::days(self.trial.period_days);
        if self
            .store
            .reserve_trial_image(user_id, self.trial.image_limit, cutoff)?
        {
            return Ok(());
        }

        let status = self.trial_status(user_id)?;
        let reason = status
            .reason
            .unwrap_or_else(|| "Trial image limit reached".into());
        Err(AuthError::TrialDenied(reason))
    }

    /// Return a slot claimed by [`Self::reserve_image`] for an image that failed
    pub fn release_image(&self, user_id: i64) -> AuthResult<()> {
        self.store.release_trial_image(user_id)
    }

    /// Record a finished image. The trial slot was already taken by [`Self::reserve_image`].
    pub fn track_image_processing(
        &self,
        user_id: i64,
        filename: &str,
        original_size: u64,
        processing_time_ms: u64,
        method: &str,
    ) -> AuthResult<()> {
        self.store.add_processing_record(
            user_id,
            filename,
            original_size,
            processing_time_ms,
            method,
            Utc::now(),
        )?;
        self.store.increment_image_count(user_id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATS & ADMIN
    // ═══════════════════════════════════════════════════════════════════════

    pub fn user_stats(&self, user_id: i64) -> AuthResult<UserStats> {
        let user = self.user(user_id)?;
        let recent_processing = self
            .store
            .processing_history(user_id, RECENT_HISTORY_LIMIT)?;

        Ok(UserStats {
            trial: self.trial.evaluate(&user.trial_access(), Utc::now()),
            user: UserProfile::from(&user),
            recent_processing,
        })
    }

    pub fn admin_stats(&self) -> AuthResult<AdminStats> {
        let totals = self.store.total_stats(Utc::now())?;
        let users = self
            .store
            .list_users()?
            .into_iter()
            .map(|u| AdminUserRow {
                id: u.id,
                email: u.email,
                created_at: u.created_at,
                last_login: u.last_login,
                images_processed_count: u.images_processed_count,
                is_admin: u.is_admin,
                status: u.status,
                subscription_status: u.subscription_status,
            })
            .collect();

        Ok(AdminStats { totals, users })
    }

    pub fn set_subscription(&self, user_id: i64, status: SubscriptionStatus) -> AuthResult<UserProfile> {
        self.store.set_subscription_status(user_id, status)?;
        tracing::info!(user_id, %status, "subscription status changed");
        Ok(UserProfile::from(&self.user(user_id)?))
    }

    /// Create or promote an admin account. Returns true when the account was created.
    pub fn promote_admin(&self, email: &str) -> AuthResult<bool> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let created = self.store.set_admin(&email, Utc::now())?;
        tracing::info!(%email, created, "admin access granted");
        Ok(created)
    }

    /// Remove expired sessions and dead codes
    pub fn cleanup(&self) -> AuthResult<CleanupReport> {
        let now = Utc::now();
        let report = CleanupReport {
            sessions_removed: self.store.delete_expired_sessions(now)?,
            codes_removed: self.store.delete_stale_auth_codes(now)?,
        };

        tracing::debug!(
            sessions = report.sessions_removed,
            codes = report.codes_removed,
            "auth cleanup finished"
        );
        Ok(report)
    }

    pub async fn send_test_email(&self, to: &str) -> AuthResult<String> {
        let to = normalize_email(to);
        if !is_valid_email(&to) {
            return Err(AuthError::InvalidEmail);
        }
        self.mailer.send(&test_email(&to)).await
    }
}
