//! Read-only ports onto the gate's backing stores
//!
//! Every port is read-only; the gate never writes. A missing record is
//! `Ok(None)`, never an error.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use eligibility_types::{
    ConnectedAccountRecord, Platform, ProfileRecord, SubscriptionRecord, UsageAllowance,
    WindowUsage,
};
use std::future::Future;
use std::time::Duration;

/// User profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<ProfileRecord>>;
}

/// Connected third-party accounts
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up by the composite key (user, account, platform)
    async fn get_account(
        &self,
        user_id: &str,
        account_id: &str,
        platform: Platform,
    ) -> StoreResult<Option<ConnectedAccountRecord>>;
}

/// Billing subscriptions
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get_subscription(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>>;
}

/// Scope a feature flag is resolved at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagScope<'a> {
    Global,
    Account { account_id: &'a str },
}

impl FlagScope<'_> {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagScope::Global => "global",
            FlagScope::Account { .. } => "account",
        }
    }
}

/// Feature flag service
#[async_trait]
pub trait FeatureFlagService: Send + Sync {
    async fn is_enabled(&self, flag: &str, scope: FlagScope<'_>) -> StoreResult<bool>;
}

/// Usage allowance (credits) by budget key
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn remaining_allowance(&self, budget_key: &str) -> StoreResult<Option<UsageAllowance>>;
}

/// Sliding-window rate-limit counters held outside the process
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn window_usage(&self, key: &str, window: Duration) -> StoreResult<WindowUsage>;
}

/// Bound a single store call; elapsed time becomes [`StoreError::Timeout`]
pub async fn bounded<T, F>(store: &'static str, timeout: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            store,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
