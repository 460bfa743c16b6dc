//! Backing-store records read during eligibility evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// `connection_status` value of a healthy connected account
pub const CONNECTED: &str = "connected";

/// User profile, as held by the profile store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Administrative suspension flag
    #[serde(default)]
    pub is_suspended: bool,

    /// Soft-deletion timestamp
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Plan identifier (starter, pro, plus, ...)
    #[serde(default)]
    pub current_plan: Option<String>,

    /// End of the trial window; absent when the plan has no trial
    #[serde(default)]
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// OAuth failure recorded against a connected account
///
/// Older rows carry a bare string, newer rows an object with a `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OAuthError {
    Legacy(String),
    Detailed {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl OAuthError {
    /// Error type for diagnostics; `unknown` for the legacy string shape
    pub fn error_type(&self) -> &str {
        match self {
            OAuthError::Detailed {
                kind: Some(kind), ..
            } => kind,
            _ => "unknown",
        }
    }
}

/// Connected third-party account, keyed by (user, account, platform)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedAccountRecord {
    pub connection_status: String,

    /// An empty legacy string means no error
    #[serde(default, deserialize_with = "non_empty_oauth_error")]
    pub oauth_error: Option<OAuthError>,
}

fn non_empty_oauth_error<'de, D>(deserializer: D) -> Result<Option<OAuthError>, D::Error>
where
    D: Deserializer<'de>,
{
    let error = Option::<OAuthError>::deserialize(deserializer)?;
    Ok(error.filter(|e| !matches!(e, OAuthError::Legacy(raw) if raw.trim().is_empty())))
}

impl ConnectedAccountRecord {
    /// A healthy connected account
    pub fn connected() -> Self {
        Self {
            connection_status: CONNECTED.to_string(),
            oauth_error: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.connection_status = status.into();
        self
    }

    pub fn with_oauth_error(mut self, error: OAuthError) -> Self {
        self.oauth_error = Some(error);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status == CONNECTED
    }
}

/// Subscription row, as mirrored from the billing provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Raw status string; see [`SubscriptionStatus`]
    pub status: String,

    /// End of the current paid period
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            current_period_end: None,
        }
    }

    pub fn with_period_end(mut self, period_end: DateTime<Utc>) -> Self {
        self.current_period_end = Some(period_end);
        self
    }

    /// Parsed status, `None` when the store holds a value we do not know
    pub fn parsed_status(&self) -> Option<SubscriptionStatus> {
        self.status.parse().ok()
    }
}

/// Known subscription lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    /// Cancelled, but paid access runs until the period end
    CanceledPending,
    Paused,
    ExpiredTrialPendingPayment,
    PaymentRetry,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::CanceledPending => "canceled_pending",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::ExpiredTrialPendingPayment => "expired_trial_pending_payment",
            SubscriptionStatus::PaymentRetry => "payment_retry",
        }
    }

    /// Statuses that grant access unconditionally
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "canceled_pending" => Ok(SubscriptionStatus::CanceledPending),
            "paused" => Ok(SubscriptionStatus::Paused),
            "expired_trial_pending_payment" => Ok(SubscriptionStatus::ExpiredTrialPendingPayment),
            "payment_retry" => Ok(SubscriptionStatus::PaymentRetry),
            other => Err(other.to_string()),
        }
    }
}

/// `limit` value that marks a plan without a usage cap
pub const UNLIMITED: i64 = -1;

/// Remaining ingestion allowance for one budget key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageAllowance {
    /// `-1` on unlimited plans, otherwise never below zero in the store
    pub remaining: i64,

    #[serde(default)]
    pub limit: Option<i64>,

    #[serde(default)]
    pub used: Option<i64>,

    /// Set by stores that flag uncapped plans explicitly
    #[serde(default)]
    pub unlimited: bool,
}

impl UsageAllowance {
    pub fn new(remaining: i64) -> Self {
        Self {
            remaining,
            limit: None,
            used: None,
            unlimited: false,
        }
    }

    /// Allowance of a plan without a usage cap
    pub fn unlimited() -> Self {
        Self {
            remaining: UNLIMITED,
            limit: Some(UNLIMITED),
            used: None,
            unlimited: true,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_used(mut self, used: i64) -> Self {
        self.used = Some(used);
        self
    }

    pub fn is_unlimited(&self) -> bool {
        self.unlimited || self.limit == Some(UNLIMITED)
    }

    pub fn is_exhausted(&self) -> bool {
        !self.is_unlimited() && self.remaining <= 0
    }
}

/// Sliding-window counter state for one rate-limit key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUsage {
    /// Hits inside the window
    pub count: u64,

    /// Oldest hit still inside the window
    pub oldest_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_error_object_shape() {
        let err: OAuthError =
            serde_json::from_str(r#"{"type":"token_revoked","message":"revoked"}"#).unwrap();
        assert_eq!(err.error_type(), "token_revoked");
    }

    #[test]
    fn test_oauth_error_legacy_string_shape() {
        let err: OAuthError = serde_json::from_str(r#""invalid_grant""#).unwrap();
        assert_eq!(err, OAuthError::Legacy("invalid_grant".into()));
        assert_eq!(err.error_type(), "unknown");
    }

    #[test]
    fn test_oauth_error_object_without_type() {
        let err: OAuthError = serde_json::from_str(r#"{"message":"boom"}"#).unwrap();
        assert_eq!(err.error_type(), "unknown");
    }

    #[test]
    fn test_account_record_defaults() {
        let record: ConnectedAccountRecord =
            serde_json::from_str(r#"{"connection_status":"connected"}"#).unwrap();
        assert!(record.is_connected());
        assert!(record.oauth_error.is_none());
    }

    #[test]
    fn test_subscription_status_parsing() {
        let record = SubscriptionRecord::new("canceled_pending");
        assert_eq!(
            record.parsed_status(),
            Some(SubscriptionStatus::CanceledPending)
        );
        assert!(SubscriptionRecord::new("incomplete").parsed_status().is_none());
        assert!(SubscriptionStatus::Trialing.is_active());
        assert!(!SubscriptionStatus::Paused.is_active());
    }

    #[test]
    fn test_allowance_exhaustion() {
        assert!(UsageAllowance::new(0).is_exhausted());
        assert!(UsageAllowance::new(0).with_limit(10).with_used(10).is_exhausted());
        assert!(!UsageAllowance::new(1).with_limit(10).is_exhausted());
    }

    #[test]
    fn test_unlimited_allowance_never_exhausted() {
        assert!(!UsageAllowance::new(-1).with_limit(UNLIMITED).is_exhausted());
        assert!(!UsageAllowance::unlimited().is_exhausted());

        let stored: UsageAllowance =
            serde_json::from_str(r#"{"remaining":0,"unlimited":true}"#).unwrap();
        assert!(stored.is_unlimited());
        assert!(!stored.is_exhausted());
    }

    #[test]
    fn test_empty_legacy_oauth_error_is_absent() {
        let record: ConnectedAccountRecord =
            serde_json::from_str(r#"{"connection_status":"connected","oauth_error":""}"#).unwrap();
        assert!(record.oauth_error.is_none());

        let record: ConnectedAccountRecord =
            serde_json::from_str(r#"{"connection_status":"connected","oauth_error":null}"#)
                .unwrap();
        assert!(record.oauth_error.is_none());

        let record: ConnectedAccountRecord =
            serde_json::from_str(r#"{"connection_status":"connected","oauth_error":"expired"}"#)
                .unwrap();
        assert_eq!(record.oauth_error, Some(OAuthError::Legacy("expired".into())));
    }
}
