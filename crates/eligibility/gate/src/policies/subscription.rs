//! Subscription policy
//!
//! Classifies the subscription `status` column:
//!
//! | status | outcome |
//! |---|---|
//! | `active`, `trialing` | allow |
//! | `canceled_pending` | allow while `now < current_period_end`, else `subscription_inactive` |
//! | `paused`, `expired_trial_pending_payment`, `payment_retry` | `subscription_inactive` |
//! | anything else | `subscription_status_unknown` |
//!
//! A user without a subscription row is allowed with
//! `status = no_subscription`; whether they may ingest is then up to the
//! trial policy.

use crate::context::EligibilityContext;
use crate::decision::{BlockReason, PolicyResult};
use crate::error::Result;
use crate::gate::EligibilityPolicy;
use crate::policies::error_kind;
use crate::store::{bounded, SubscriptionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eligibility_types::{SubscriptionRecord, SubscriptionStatus};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Metadata status reported when the user has no subscription row
pub const NO_SUBSCRIPTION: &str = "no_subscription";

pub struct SubscriptionPolicy {
    subscriptions: Arc<dyn SubscriptionStore>,
    timeout: Duration,
}

impl SubscriptionPolicy {
    pub const NAME: &'static str = "SubscriptionPolicy";

    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, timeout: Duration) -> Self {
        Self {
            subscriptions,
            timeout,
        }
    }

    /// Classify a subscription record at `now`
    pub fn classify(record: &SubscriptionRecord, now: DateTime<Utc>) -> PolicyResult {
        let Some(status) = record.parsed_status() else {
            return PolicyResult::block(BlockReason::SubscriptionStatusUnknown)
                .with_meta("status", record.status.as_str());
        };

        match status {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing => {
                PolicyResult::allow().with_meta("status", status.as_str())
            }
            SubscriptionStatus::CanceledPending => {
                let period_end = record.current_period_end.map(|end| end.to_rfc3339());
                if in_grace_period(record, now) {
                    PolicyResult::allow()
                        .with_meta("status", status.as_str())
                        .with_meta("grace_period", true)
                        .with_meta("current_period_end", period_end)
                } else {
                    PolicyResult::block(BlockReason::SubscriptionInactive)
                        .with_meta("status", status.as_str())
                        .with_meta("current_period_end", period_end)
                }
            }
            SubscriptionStatus::Paused
            | SubscriptionStatus::ExpiredTrialPendingPayment
            | SubscriptionStatus::PaymentRetry => {
                PolicyResult::block(BlockReason::SubscriptionInactive)
                    .with_meta("status", status.as_str())
            }
        }
    }

    /// Whether the record currently grants paid access
    pub fn grants_access(record: &SubscriptionRecord, now: DateTime<Utc>) -> bool {
        match record.parsed_status() {
            Some(status) if status.is_active() => true,
            Some(SubscriptionStatus::CanceledPending) => in_grace_period(record, now),
            _ => false,
        }
    }
}

fn in_grace_period(record: &SubscriptionRecord, now: DateTime<Utc>) -> bool {
    record
        .current_period_end
        .map_or(false, |period_end| now < period_end)
}

impl fmt::Debug for SubscriptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionPolicy")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EligibilityPolicy for SubscriptionPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, context: &EligibilityContext) -> Result<PolicyResult> {
        let lookup = bounded(
            "subscription",
            self.timeout,
            self.subscriptions.get_subscription(context.user_id()),
        )
        .await;

        match lookup {
            Ok(Some(record)) => Ok(Self::classify(&record, Utc::now())),
            Ok(None) => Ok(PolicyResult::allow().with_meta("status", NO_SUBSCRIPTION)),
            Err(e) => {
                warn!(
                    request_id = %context.request_id(),
                    error = %e,
                    "Could not read subscription"
                );
                let reason = if e.is_verification_failure() {
                    BlockReason::SubscriptionVerificationError
                } else {
                    BlockReason::SubscriptionPolicyError
                };
                Ok(PolicyResult::block(reason).with_meta("error_kind", error_kind(&e)))
            }
        }
    }

    fn description(&self) -> &str {
        "Requires an active subscription, or a cancelled one still in its paid period"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::{MemoryBackend, StoreKind};
    use chrono::Duration as ChronoDuration;
    use eligibility_types::{IngestionFlow, Platform};

    fn ctx() -> EligibilityContext {
        EligibilityContext::new("u1", "a1", Platform::X, IngestionFlow::Timeline)
    }

    fn policy(backend: Arc<MemoryBackend>) -> SubscriptionPolicy {
        SubscriptionPolicy::new(backend, Duration::from_secs(1))
    }

    #[test]
    fn test_active_statuses_allowed() {
        let now = Utc::now();
        for status in ["active", "trialing"] {
            let result = SubscriptionPolicy::classify(&SubscriptionRecord::new(status), now);
            assert!(result.is_allowed(), "{} should be allowed", status);
        }
    }

    #[test]
    fn test_inactive_statuses_blocked() {
        let now = Utc::now();
        for status in ["paused", "expired_trial_pending_payment", "payment_retry"] {
            let result = SubscriptionPolicy::classify(&SubscriptionRecord::new(status), now);
            assert_eq!(
                result.reason(),
                Some(BlockReason::SubscriptionInactive),
                "{} should be inactive",
                status
            );
        }
    }

    #[test]
    fn test_canceled_pending_within_grace_period() {
        let now = Utc::now();
        let record =
            SubscriptionRecord::new("canceled_pending").with_period_end(now + ChronoDuration::days(7));

        let result = SubscriptionPolicy::classify(&record, now);
        assert!(result.is_allowed());
        assert_eq!(result.metadata()["grace_period"], true);
        assert!(SubscriptionPolicy::grants_access(&record, now));
    }

    #[test]
    fn test_canceled_pending_after_period_end() {
        let now = Utc::now();
        let period_end = now - ChronoDuration::days(7);
        let record = SubscriptionRecord::new("canceled_pending").with_period_end(period_end);

        let result = SubscriptionPolicy::classify(&record, now);
        assert_eq!(result.reason(), Some(BlockReason::SubscriptionInactive));
        assert_eq!(
            result.metadata()["current_period_end"],
            period_end.to_rfc3339()
        );
        assert!(!SubscriptionPolicy::grants_access(&record, now));
    }

    #[test]
    fn test_canceled_pending_without_period_end_blocked() {
        let result =
            SubscriptionPolicy::classify(&SubscriptionRecord::new("canceled_pending"), Utc::now());
        assert_eq!(result.reason(), Some(BlockReason::SubscriptionInactive));
    }

    #[test]
    fn test_unknown_status_blocked() {
        let result = SubscriptionPolicy::classify(&SubscriptionRecord::new("incomplete"), Utc::now());
        assert_eq!(result.reason(), Some(BlockReason::SubscriptionStatusUnknown));
        assert_eq!(result.metadata()["status"], "incomplete");
    }

    #[tokio::test]
    async fn test_no_subscription_defers() {
        let backend = Arc::new(MemoryBackend::new());
        let result = policy(backend).evaluate(&ctx()).await.unwrap();
        assert!(result.is_allowed());
        assert_eq!(result.metadata()["status"], NO_SUBSCRIPTION);
    }

    #[tokio::test]
    async fn test_store_error_is_verification_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_store(
            StoreKind::Subscription,
            StoreError::unavailable("subscription", "connection refused"),
        );

        let result = policy(backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(
            result.reason(),
            Some(BlockReason::SubscriptionVerificationError)
        );
    }

    #[tokio::test]
    async fn test_malformed_record_is_policy_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_store(
            StoreKind::Subscription,
            StoreError::malformed("subscription", "status was null"),
        );

        let result = policy(backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(result.reason(), Some(BlockReason::SubscriptionPolicyError));
    }
}
