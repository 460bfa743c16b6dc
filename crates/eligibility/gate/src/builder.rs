//! Builder for the production eligibility gate
//!
//! Wires the seven standard policies, in their fixed order, to the store
//! ports and configuration.

use crate::config::GateConfig;
use crate::emitter::BlockEmitter;
use crate::error::ConfigError;
use crate::gate::{EligibilityGate, EligibilityPolicy};
use crate::metrics::GateMetrics;
use crate::policies::{
    AccountStatusPolicy, CreditPolicy, FeatureFlagPolicy, RateLimitPolicy, SubscriptionPolicy,
    TrialPolicy, UserStatusPolicy,
};
use crate::store::{
    AccountStore, FeatureFlagService, ProfileStore, RateLimitStore, SubscriptionStore, UsageStore,
};
use std::sync::Arc;

/// Every store port the standard policies read from
#[derive(Clone)]
pub struct GateStores {
    pub profiles: Arc<dyn ProfileStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub flags: Arc<dyn FeatureFlagService>,
    pub usage: Arc<dyn UsageStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
}

impl GateStores {
    /// Use one backend for every port
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ProfileStore
            + AccountStore
            + SubscriptionStore
            + FeatureFlagService
            + UsageStore
            + RateLimitStore
            + 'static,
    {
        Self {
            profiles: backend.clone(),
            accounts: backend.clone(),
            subscriptions: backend.clone(),
            flags: backend.clone(),
            usage: backend.clone(),
            rate_limits: backend,
        }
    }
}

/// The standard policies in production order
pub fn standard_policies(stores: &GateStores, config: &GateConfig) -> Vec<Arc<dyn EligibilityPolicy>> {
    let timeout = config.stores.timeout();

    vec![
        Arc::new(UserStatusPolicy::new(stores.profiles.clone(), timeout)),
        Arc::new(AccountStatusPolicy::new(stores.accounts.clone(), timeout)),
        Arc::new(SubscriptionPolicy::new(stores.subscriptions.clone(), timeout)),
        Arc::new(TrialPolicy::new(
            stores.profiles.clone(),
            stores.subscriptions.clone(),
            timeout,
        )),
        Arc::new(CreditPolicy::new(
            stores.usage.clone(),
            config.credit.scope,
            timeout,
        )),
        Arc::new(FeatureFlagPolicy::new(
            stores.flags.clone(),
            config.feature_flags.clone(),
            timeout,
        )),
        Arc::new(RateLimitPolicy::new(
            stores.rate_limits.clone(),
            config.rate_limit.clone(),
            timeout,
        )),
    ]
}

/// Builder for constructing an [`EligibilityGate`]
pub struct EligibilityGateBuilder {
    config: GateConfig,
    stores: Option<GateStores>,
    extra_policies: Vec<Arc<dyn EligibilityPolicy>>,
    emitter: Option<BlockEmitter>,
    metrics: Option<Arc<GateMetrics>>,
}

impl EligibilityGateBuilder {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            stores: None,
            extra_policies: Vec::new(),
            emitter: None,
            metrics: None,
        }
    }

    /// Set the store ports
    pub fn with_stores(mut self, stores: GateStores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Append a policy after the standard ones
    pub fn add_policy(mut self, policy: Arc<dyn EligibilityPolicy>) -> Self {
        self.extra_policies.push(policy);
        self
    }

    /// Set the block emitter
    pub fn with_emitter(mut self, emitter: BlockEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Set the metrics collector
    pub fn with_metrics(mut self, metrics: Arc<GateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the gate
    pub fn build(self) -> Result<EligibilityGate, ConfigError> {
        self.config.validate()?;
        let stores = self
            .stores
            .ok_or_else(|| ConfigError::Invalid("stores required".into()))?;

        let mut policies = standard_policies(&stores, &self.config);
        policies.extend(self.extra_policies);

        let mut gate = EligibilityGate::new(policies);
        if let Some(emitter) = self.emitter {
            gate = gate.with_emitter(emitter);
        }
        if let Some(metrics) = self.metrics {
            gate = gate.with_metrics(metrics);
        }
        Ok(gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    #[test]
    fn test_builder_missing_stores() {
        let result = EligibilityGateBuilder::new(GateConfig::default()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_standard_order() {
        let backend = Arc::new(MemoryBackend::new());
        let gate = EligibilityGateBuilder::new(GateConfig::default())
            .with_stores(GateStores::from_backend(backend))
            .build()
            .unwrap();

        assert_eq!(
            gate.policy_names(),
            vec![
                "UserStatusPolicy",
                "AccountStatusPolicy",
                "SubscriptionPolicy",
                "TrialPolicy",
                "CreditPolicy",
                "FeatureFlagPolicy",
                "RateLimitPolicy",
            ]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GateConfig::default();
        config.stores.timeout_ms = 0;

        let result = EligibilityGateBuilder::new(config)
            .with_stores(GateStores::from_backend(Arc::new(MemoryBackend::new())))
            .build();
        assert!(result.is_err());
    }
}
