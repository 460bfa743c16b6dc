//! Trial window policy
//!
//! A paying subscription overrides the trial entirely. The subscription
//! lookup here is best-effort: when it fails the trial window alone
//! decides, since [`SubscriptionPolicy`](super::SubscriptionPolicy) has
//! already failed closed on the same store earlier in the chain.

use crate::context::EligibilityContext;
use crate::decision::{BlockReason, PolicyResult};
use crate::error::Result;
use crate::gate::EligibilityPolicy;
use crate::policies::{error_kind, SubscriptionPolicy};
use crate::store::{bounded, ProfileStore, SubscriptionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct TrialPolicy {
    profiles: Arc<dyn ProfileStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    timeout: Duration,
}

impl TrialPolicy {
    pub const NAME: &'static str = "TrialPolicy";

    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            profiles,
            subscriptions,
            timeout,
        }
    }

    async fn has_paid_access(&self, context: &EligibilityContext, now: DateTime<Utc>) -> bool {
        let lookup = bounded(
            "subscription",
            self.timeout,
            self.subscriptions.get_subscription(context.user_id()),
        )
        .await;

        match lookup {
            Ok(Some(record)) => SubscriptionPolicy::grants_access(&record, now),
            Ok(None) => false,
            Err(e) => {
                debug!(
                    request_id = %context.request_id(),
                    error = %e,
                    "Subscription lookup failed, using trial window only"
                );
                false
            }
        }
    }
}

impl fmt::Debug for TrialPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialPolicy")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EligibilityPolicy for TrialPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, context: &EligibilityContext) -> Result<PolicyResult> {
        let lookup = bounded(
            "profile",
            self.timeout,
            self.profiles.get_profile(context.user_id()),
        )
        .await;

        let profile = match lookup {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return Ok(PolicyResult::block(BlockReason::TrialVerificationError)
                    .with_meta("profile_found", false));
            }
            Err(e) => {
                warn!(
                    request_id = %context.request_id(),
                    error = %e,
                    "Could not read profile for trial window"
                );
                let reason = if e.is_verification_failure() {
                    BlockReason::TrialVerificationError
                } else {
                    BlockReason::TrialPolicyError
                };
                return Ok(PolicyResult::block(reason).with_meta("error_kind", error_kind(&e)));
            }
        };

        let now = Utc::now();
        if self.has_paid_access(context, now).await {
            return Ok(PolicyResult::allow()
                .with_meta("trial_applicable", false)
                .with_meta("has_active_subscription", true));
        }

        let Some(trial_ends_at) = profile.trial_ends_at else {
            return Ok(PolicyResult::allow().with_meta("trial_applicable", false));
        };

        if now < trial_ends_at {
            Ok(PolicyResult::allow()
                .with_meta("trial_applicable", true)
                .with_meta("trial_ends_at", trial_ends_at.to_rfc3339()))
        } else {
            Ok(PolicyResult::block(BlockReason::TrialExpired)
                .with_meta("trial_ends_at", trial_ends_at.to_rfc3339()))
        }
    }

    fn description(&self) -> &str {
        "Blocks expired trials unless a subscription grants access"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::{MemoryBackend, StoreKind};
    use chrono::Duration as ChronoDuration;
    use eligibility_types::{IngestionFlow, Platform, ProfileRecord, SubscriptionRecord};

    fn ctx() -> EligibilityContext {
        EligibilityContext::new("u1", "a1", Platform::X, IngestionFlow::Timeline)
    }

    fn policy(backend: &Arc<MemoryBackend>) -> TrialPolicy {
        TrialPolicy::new(backend.clone(), backend.clone(), Duration::from_secs(1))
    }

    async fn backend_with_trial(ends: Option<DateTime<Utc>>) -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .set_profile(
                "u1",
                ProfileRecord {
                    trial_ends_at: ends,
                    ..Default::default()
                },
            )
            .await;
        backend
    }

    #[tokio::test]
    async fn test_no_trial_not_applicable() {
        let backend = backend_with_trial(None).await;
        let result = policy(&backend).evaluate(&ctx()).await.unwrap();
        assert!(result.is_allowed());
        assert_eq!(result.metadata()["trial_applicable"], false);
    }

    #[tokio::test]
    async fn test_running_trial_allowed() {
        let backend = backend_with_trial(Some(Utc::now() + ChronoDuration::days(3))).await;
        let result = policy(&backend).evaluate(&ctx()).await.unwrap();
        assert!(result.is_allowed());
        assert!(result.metadata().contains_key("trial_ends_at"));
    }

    #[tokio::test]
    async fn test_expired_trial_blocked() {
        let backend = backend_with_trial(Some(Utc::now() - ChronoDuration::days(1))).await;
        let result = policy(&backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(result.reason(), Some(BlockReason::TrialExpired));
    }

    #[tokio::test]
    async fn test_active_subscription_overrides_expired_trial() {
        let backend = backend_with_trial(Some(Utc::now() - ChronoDuration::days(1))).await;
        backend
            .set_subscription("u1", SubscriptionRecord::new("active"))
            .await;

        let result = policy(&backend).evaluate(&ctx()).await.unwrap();
        assert!(result.is_allowed());
        assert_eq!(result.metadata()["trial_applicable"], false);
    }

    #[tokio::test]
    async fn test_inactive_subscription_does_not_override() {
        let backend = backend_with_trial(Some(Utc::now() - ChronoDuration::days(1))).await;
        backend
            .set_subscription("u1", SubscriptionRecord::new("paused"))
            .await;

        let result = policy(&backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(result.reason(), Some(BlockReason::TrialExpired));
    }

    #[tokio::test]
    async fn test_subscription_lookup_failure_falls_back_to_window() {
        let backend = backend_with_trial(Some(Utc::now() + ChronoDuration::days(3))).await;
        backend.fail_store(
            StoreKind::Subscription,
            StoreError::unavailable("subscription", "down"),
        );

        let result = policy(&backend).evaluate(&ctx()).await.unwrap();
        assert!(result.is_allowed());
        assert_eq!(result.metadata()["trial_applicable"], true);
    }

    #[tokio::test]
    async fn test_profile_failure_is_verification_error() {
        let backend = backend_with_trial(None).await;
        backend.fail_store(StoreKind::Profile, StoreError::unavailable("profile", "down"));

        let result = policy(&backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(result.reason(), Some(BlockReason::TrialVerificationError));
        assert_eq!(backend.read_count(StoreKind::Subscription), 0);
    }

    #[tokio::test]
    async fn test_malformed_profile_is_policy_error() {
        let backend = backend_with_trial(None).await;
        backend.fail_store(
            StoreKind::Profile,
            StoreError::malformed("profile", "trial_ends_at is not a date"),
        );

        let result = policy(&backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(result.reason(), Some(BlockReason::TrialPolicyError));
    }
}
