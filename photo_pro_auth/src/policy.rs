//! Auth and trial policies - expiry windows and the usage gate

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Expiry and attempt rules for codes and sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthPolicy {
    /// Verification code lifetime (minutes)
    pub code_ttl_minutes: i64,

    /// Session lifetime (days)
    pub session_ttl_days: i64,

    /// Wrong guesses before a code is burned
    pub max_code_attempts: u32,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            code_ttl_minutes: 10,
            session_ttl_days: 30,
            max_code_attempts: 5,
        }
    }
}

impl AuthPolicy {
    pub fn code_ttl(&self) -> Duration {
        Duration::minutes(self.code_ttl_minutes)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::days(self.session_ttl_days)
    }
}

/// Subscription state of a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Cancelled,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Trial
    }
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trial" => Ok(Self::Trial),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(AuthError::InvalidSubscriptionStatus(other.to_string())),
        }
    }
}

impl ToSql for SubscriptionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SubscriptionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e: AuthError| FromSqlError::Other(Box::new(e)))
    }
}

/// Per-user quota applied while the account has no active subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialPolicy {
    /// Images allowed during the trial
    pub image_limit: u32,

    /// Trial length (days)
    pub period_days: i64,
}

impl Default for TrialPolicy {
    fn default() -> Self {
        Self {
            image_limit: 30,
            period_days: 30,
        }
    }
}

/// The subset of a user record the gate looks at
#[derive(Debug, Clone)]
pub struct TrialAccess {
    pub is_admin: bool,
    pub subscription_status: SubscriptionStatus,
    pub trial_started_at: DateTime<Utc>,
    pub trial_images_used: u32,
}

/// Result of evaluating the gate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialStatus {
    pub can_process: bool,
    pub reason: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub is_admin: bool,
    pub images_used: u32,
    pub image_limit: Option<u32>,
    pub images_remaining: Option<u32>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
}

impl TrialStatus {
    fn unlimited(access: &TrialAccess) -> Self {
        Self {
            can_process: true,
            reason: None,
            subscription_status: access.subscription_status,
            is_admin: access.is_admin,
            images_used: access.trial_images_used,
            image_limit: None,
            images_remaining: None,
            trial_ends_at: None,
            days_remaining: None,
        }
    }

    /// How many more images may be processed right now (`None` = no cap)
    pub fn allowance(&self) -> Option<u32> {
        if !self.can_process {
            return Some(0);
        }
        self.images_remaining
    }
}

impl TrialPolicy {
    pub fn trial_ends_at(&self, started: DateTime<Utc>) -> DateTime<Utc> {
        started + Duration::days(self.period_days)
    }

    /// Decide whether the account may process images at `now`
    pub fn evaluate(&self, access: &TrialAccess, now: DateTime<Utc>) -> TrialStatus {
        if access.is_admin {
            return TrialStatus::unlimited(access);
        }

        match access.subscription_status {
            SubscriptionStatus::Active => return TrialStatus::unlimited(access),
            SubscriptionStatus::Expired | SubscriptionStatus::Cancelled => {
                return TrialStatus {
                    can_process: false,
                    reason: Some(format!(
                        "Subscription {} - renew to continue processing images",
                        access.subscription_status
                    )),
                    image_limit: None,
                    images_remaining: Some(0),
                    ..TrialStatus::unlimited(access)
                };
            }
            SubscriptionStatus::Trial => {}
        }

        let ends_at = self.trial_ends_at(access.trial_started_at);
        let remaining = self.image_limit.saturating_sub(access.trial_images_used);
        // partial days count as a whole day
        let days_remaining = if now >= ends_at {
            0
        } else {
            (ends_at - now + Duration::days(1) - Duration::nanoseconds(1)).num_days()
        };

        let reason = if now >= ends_at {
            Some(format!("Free trial expired after {} days", self.period_days))
        } else if remaining == 0 {
            Some(format!(
                "Free trial limit of {} images reached",
                self.image_limit
            ))
        } else {
            None
        };

        TrialStatus {
            can_process: reason.is_none(),
            reason,
            subscription_status: access.subscription_status,
            is_admin: false,
            images_used: access.trial_images_used,
            image_limit: Some(self.image_limit),
            images_remaining: Some(if now >= ends_at { 0 } else { remaining }),
            trial_ends_at: Some(ends_at),
            days_remaining: Some(days_remaining),
        }
    }
}
