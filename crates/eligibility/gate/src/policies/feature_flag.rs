//! Feature flag policy
//!
//! Ingestion must be switched on both globally and for the account. The
//! global kill switch is read first so a platform-wide outage never costs
//! a per-account lookup.

use crate::config::FeatureFlagConfig;
use crate::context::EligibilityContext;
use crate::decision::{BlockReason, PolicyResult};
use crate::error::Result;
use crate::gate::EligibilityPolicy;
use crate::policies::error_kind;
use crate::store::{bounded, FeatureFlagService, FlagScope};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct FeatureFlagPolicy {
    flags: Arc<dyn FeatureFlagService>,
    config: FeatureFlagConfig,
    timeout: Duration,
}

impl FeatureFlagPolicy {
    pub const NAME: &'static str = "FeatureFlagPolicy";

    pub fn new(
        flags: Arc<dyn FeatureFlagService>,
        config: FeatureFlagConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            flags,
            config,
            timeout,
        }
    }

    /// `None` when the flag is on, otherwise the blocking result
    async fn check(
        &self,
        context: &EligibilityContext,
        flag: &str,
        scope: FlagScope<'_>,
    ) -> Option<PolicyResult> {
        let lookup = bounded(
            "feature_flag",
            self.timeout,
            self.flags.is_enabled(flag, scope),
        )
        .await;

        match lookup {
            Ok(true) => None,
            Ok(false) => Some(
                PolicyResult::block(BlockReason::FeatureDisabled)
                    .with_meta("scope", scope.as_str())
                    .with_meta("flag", flag),
            ),
            Err(e) => {
                warn!(
                    request_id = %context.request_id(),
                    flag = %flag,
                    scope = scope.as_str(),
                    error = %e,
                    "Could not read feature flag"
                );
                Some(
                    PolicyResult::block(BlockReason::FeatureFlagVerificationError)
                        .with_meta("scope", scope.as_str())
                        .with_meta("flag", flag)
                        .with_meta("error_kind", error_kind(&e)),
                )
            }
        }
    }
}

impl fmt::Debug for FeatureFlagPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureFlagPolicy")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EligibilityPolicy for FeatureFlagPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, context: &EligibilityContext) -> Result<PolicyResult> {
        if let Some(blocked) = self
            .check(context, &self.config.global_flag, FlagScope::Global)
            .await
        {
            return Ok(blocked);
        }

        let Some(account_id) = context.account_id().filter(|id| !id.is_empty()) else {
            return Ok(PolicyResult::block(BlockReason::FeatureFlagVerificationError)
                .with_meta("scope", "account")
                .with_meta("flag", self.config.account_flag.as_str()));
        };

        if let Some(blocked) = self
            .check(
                context,
                &self.config.account_flag,
                FlagScope::Account { account_id },
            )
            .await
        {
            return Ok(blocked);
        }

        Ok(PolicyResult::allow())
    }

    fn description(&self) -> &str {
        "Requires ingestion to be enabled globally and for the account"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::{MemoryBackend, StoreKind};
    use eligibility_types::{IngestionFlow, Platform};

    fn ctx() -> EligibilityContext {
        EligibilityContext::new("u1", "a1", Platform::X, IngestionFlow::Timeline)
    }

    fn policy(backend: Arc<MemoryBackend>) -> FeatureFlagPolicy {
        FeatureFlagPolicy::new(
            backend,
            FeatureFlagConfig::default(),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_enabled_everywhere_allowed() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_global_flag("ingestion_enabled", true).await;

        let result = policy(backend).evaluate(&ctx()).await.unwrap();
        assert!(result.is_allowed());
    }

    #[tokio::test]
    async fn test_global_kill_switch_checked_first() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_global_flag("ingestion_enabled", false).await;
        backend
            .set_account_flag("a1", "ingestion_enabled", true)
            .await;

        let result = policy(backend.clone()).evaluate(&ctx()).await.unwrap();
        assert_eq!(result.reason(), Some(BlockReason::FeatureDisabled));
        assert_eq!(result.metadata()["scope"], "global");
        assert_eq!(backend.read_count(StoreKind::FeatureFlag), 1);
    }

    #[tokio::test]
    async fn test_account_flag_disabled() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_global_flag("ingestion_enabled", true).await;
        backend
            .set_account_flag("a1", "ingestion_enabled", false)
            .await;

        let result = policy(backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(result.reason(), Some(BlockReason::FeatureDisabled));
        assert_eq!(result.metadata()["scope"], "account");
    }

    #[tokio::test]
    async fn test_unknown_flag_is_disabled() {
        let backend = Arc::new(MemoryBackend::new());
        let result = policy(backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(result.reason(), Some(BlockReason::FeatureDisabled));
    }

    #[tokio::test]
    async fn test_flag_service_failure_fails_closed() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_global_flag("ingestion_enabled", true).await;
        backend.fail_store(
            StoreKind::FeatureFlag,
            StoreError::unavailable("feature_flag", "timeout talking to flag service"),
        );

        let result = policy(backend).evaluate(&ctx()).await.unwrap();
        assert_eq!(
            result.reason(),
            Some(BlockReason::FeatureFlagVerificationError)
        );
        assert_eq!(result.metadata()["scope"], "global");
    }
}
