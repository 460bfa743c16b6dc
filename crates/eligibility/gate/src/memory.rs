//! In-memory backing stores for development and testing
//!
//! [`MemoryBackend`] implements every store port. It can be seeded from a
//! JSON [`BackendSnapshot`], made to fail per store, and reports how many
//! reads each store served.

use crate::error::{StoreError, StoreResult};
use crate::store::{
    AccountStore, FeatureFlagService, FlagScope, ProfileStore, RateLimitStore, SubscriptionStore,
    UsageStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eligibility_types::{
    ConnectedAccountRecord, Platform, ProfileRecord, SubscriptionRecord, UsageAllowance,
    WindowUsage,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Which port a read or an injected failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Profile,
    Account,
    Subscription,
    FeatureFlag,
    Usage,
    RateLimit,
}

type AccountKey = (String, String, Platform);

/// In-memory implementation of every store port
#[derive(Debug, Default)]
pub struct MemoryBackend {
    profiles: RwLock<HashMap<String, ProfileRecord>>,
    accounts: RwLock<HashMap<AccountKey, ConnectedAccountRecord>>,
    subscriptions: RwLock<HashMap<String, SubscriptionRecord>>,
    allowances: RwLock<HashMap<String, UsageAllowance>>,
    global_flags: RwLock<HashMap<String, bool>>,
    account_flags: RwLock<HashMap<(String, String), bool>>,
    rate_hits: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    failures: Mutex<HashMap<StoreKind, StoreError>>,
    reads: Mutex<HashMap<StoreKind, u64>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend pre-populated from a snapshot
    pub fn from_snapshot(snapshot: BackendSnapshot) -> Self {
        let accounts = snapshot
            .accounts
            .into_iter()
            .map(|entry| ((entry.user_id, entry.account_id, entry.platform), entry.record))
            .collect();

        let account_flags = snapshot
            .flags
            .account
            .into_iter()
            .flat_map(|(account_id, flags)| {
                flags
                    .into_iter()
                    .map(move |(flag, enabled)| ((account_id.clone(), flag), enabled))
            })
            .collect();

        Self {
            profiles: RwLock::new(snapshot.profiles),
            accounts: RwLock::new(accounts),
            subscriptions: RwLock::new(snapshot.subscriptions),
            allowances: RwLock::new(snapshot.allowances),
            global_flags: RwLock::new(snapshot.flags.global),
            account_flags: RwLock::new(account_flags),
            rate_hits: RwLock::new(snapshot.rate_hits),
            ..Self::default()
        }
    }

    pub async fn set_profile(&self, user_id: impl Into<String>, profile: ProfileRecord) {
        self.profiles.write().await.insert(user_id.into(), profile);
    }

    pub async fn set_account(
        &self,
        user_id: impl Into<String>,
        account_id: impl Into<String>,
        platform: Platform,
        record: ConnectedAccountRecord,
    ) {
        self.accounts
            .write()
            .await
            .insert((user_id.into(), account_id.into(), platform), record);
    }

    pub async fn set_subscription(&self, user_id: impl Into<String>, record: SubscriptionRecord) {
        self.subscriptions
            .write()
            .await
            .insert(user_id.into(), record);
    }

    pub async fn set_allowance(&self, budget_key: impl Into<String>, allowance: UsageAllowance) {
        self.allowances
            .write()
            .await
            .insert(budget_key.into(), allowance);
    }

    pub async fn set_global_flag(&self, flag: impl Into<String>, enabled: bool) {
        self.global_flags.write().await.insert(flag.into(), enabled);
    }

    /// Account-level override; accounts without one inherit the global value
    pub async fn set_account_flag(
        &self,
        account_id: impl Into<String>,
        flag: impl Into<String>,
        enabled: bool,
    ) {
        self.account_flags
            .write()
            .await
            .insert((account_id.into(), flag.into()), enabled);
    }

    /// Record a hit against a rate-limit key
    ///
    /// Called by the ingestion pipeline after work is admitted; the gate
    /// itself never records.
    pub async fn record_hit(&self, key: impl Into<String>, at: DateTime<Utc>) {
        self.rate_hits
            .write()
            .await
            .entry(key.into())
            .or_default()
            .push(at);
    }

    /// Make every subsequent read of `kind` fail with `error`
    pub fn fail_store(&self, kind: StoreKind, error: StoreError) {
        self.failures.lock().insert(kind, error);
    }

    pub fn heal_store(&self, kind: StoreKind) {
        self.failures.lock().remove(&kind);
    }

    /// Number of reads served (or refused) by `kind`
    pub fn read_count(&self, kind: StoreKind) -> u64 {
        self.reads.lock().get(&kind).copied().unwrap_or(0)
    }

    fn begin_read(&self, kind: StoreKind) -> StoreResult<()> {
        *self.reads.lock().entry(kind).or_insert(0) += 1;
        match self.failures.lock().get(&kind) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<ProfileRecord>> {
        self.begin_read(StoreKind::Profile)?;
        Ok(self.profiles.read().await.get(user_id).cloned())
    }
}

#[async_trait]
impl AccountStore for MemoryBackend {
    async fn get_account(
        &self,
        user_id: &str,
        account_id: &str,
        platform: Platform,
    ) -> StoreResult<Option<ConnectedAccountRecord>> {
        self.begin_read(StoreKind::Account)?;
        let key = (user_id.to_string(), account_id.to_string(), platform);
        Ok(self.accounts.read().await.get(&key).cloned())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryBackend {
    async fn get_subscription(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>> {
        self.begin_read(StoreKind::Subscription)?;
        Ok(self.subscriptions.read().await.get(user_id).cloned())
    }
}

#[async_trait]
impl FeatureFlagService for MemoryBackend {
    async fn is_enabled(&self, flag: &str, scope: FlagScope<'_>) -> StoreResult<bool> {
        self.begin_read(StoreKind::FeatureFlag)?;
        let global = self
            .global_flags
            .read()
            .await
            .get(flag)
            .copied()
            .unwrap_or(false);

        match scope {
            FlagScope::Global => Ok(global),
            FlagScope::Account { account_id } => {
                let key = (account_id.to_string(), flag.to_string());
                Ok(self
                    .account_flags
                    .read()
                    .await
                    .get(&key)
                    .copied()
                    .unwrap_or(global))
            }
        }
    }
}

#[async_trait]
impl UsageStore for MemoryBackend {
    async fn remaining_allowance(&self, budget_key: &str) -> StoreResult<Option<UsageAllowance>> {
        self.begin_read(StoreKind::Usage)?;
        Ok(self.allowances.read().await.get(budget_key).copied())
    }
}

#[async_trait]
impl RateLimitStore for MemoryBackend {
    async fn window_usage(&self, key: &str, window: Duration) -> StoreResult<WindowUsage> {
        self.begin_read(StoreKind::RateLimit)?;
        let window = chrono::Duration::from_std(window)
            .map_err(|e| StoreError::malformed("rate_limit", e.to_string()))?;
        let window_start = Utc::now() - window;

        let hits = self.rate_hits.read().await;
        let in_window = hits
            .get(key)
            .map(|hits| hits.iter().filter(|at| **at > window_start).copied().collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(WindowUsage {
            count: in_window.len() as u64,
            oldest_at: in_window.iter().min().copied(),
        })
    }
}

/// JSON-friendly dump of backing data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSnapshot {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileRecord>,

    #[serde(default)]
    pub accounts: Vec<AccountEntry>,

    #[serde(default)]
    pub subscriptions: HashMap<String, SubscriptionRecord>,

    #[serde(default)]
    pub allowances: HashMap<String, UsageAllowance>,

    #[serde(default)]
    pub flags: FlagSnapshot,

    /// Rate-limit key to hit timestamps
    #[serde(default)]
    pub rate_hits: HashMap<String, Vec<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub user_id: String,
    pub account_id: String,
    pub platform: Platform,
    #[serde(flatten)]
    pub record: ConnectedAccountRecord,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagSnapshot {
    #[serde(default)]
    pub global: HashMap<String, bool>,

    /// Account id to flag overrides
    #[serde(default)]
    pub account: HashMap<String, HashMap<String, bool>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_profile_roundtrip_and_read_count() {
        let backend = MemoryBackend::new();
        backend.set_profile("u1", ProfileRecord::default()).await;

        assert!(backend.get_profile("u1").await.unwrap().is_some());
        assert!(backend.get_profile("u2").await.unwrap().is_none());
        assert_eq!(backend.read_count(StoreKind::Profile), 2);
        assert_eq!(backend.read_count(StoreKind::Account), 0);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = MemoryBackend::new();
        backend.fail_store(
            StoreKind::Subscription,
            StoreError::unavailable("subscription", "connection refused"),
        );
        assert!(backend.get_subscription("u1").await.is_err());

        backend.heal_store(StoreKind::Subscription);
        assert_eq!(backend.get_subscription("u1").await, Ok(None));
    }

    #[tokio::test]
    async fn test_account_flag_inherits_global() {
        let backend = MemoryBackend::new();
        backend.set_global_flag("ingestion_enabled", true).await;
        backend.set_account_flag("a2", "ingestion_enabled", false).await;

        let inherit = backend
            .is_enabled("ingestion_enabled", FlagScope::Account { account_id: "a1" })
            .await
            .unwrap();
        let overridden = backend
            .is_enabled("ingestion_enabled", FlagScope::Account { account_id: "a2" })
            .await
            .unwrap();
        let unknown = backend
            .is_enabled("other_flag", FlagScope::Global)
            .await
            .unwrap();

        assert!(inherit);
        assert!(!overridden);
        assert!(!unknown);
    }

    #[tokio::test]
    async fn test_window_usage_ignores_old_hits() {
        let backend = MemoryBackend::new();
        let now = Utc::now();
        backend.record_hit("k", now - chrono::Duration::hours(2)).await;
        backend.record_hit("k", now - chrono::Duration::minutes(10)).await;
        backend.record_hit("k", now - chrono::Duration::minutes(5)).await;

        let usage = backend
            .window_usage("k", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(usage.count, 2);
        assert_eq!(usage.oldest_at, Some(now - chrono::Duration::minutes(10)));
    }

    #[tokio::test]
    async fn test_from_snapshot() {
        let json = r#"{
            "profiles": { "u1": { "is_suspended": false } },
            "accounts": [
                { "user_id": "u1", "account_id": "a1", "platform": "x",
                  "connection_status": "connected" }
            ],
            "subscriptions": { "u1": { "status": "active" } },
            "allowances": { "user:u1": { "remaining": 5 } },
            "flags": { "global": { "ingestion_enabled": true } }
        }"#;
        let snapshot: BackendSnapshot = serde_json::from_str(json).unwrap();
        let backend = MemoryBackend::from_snapshot(snapshot);

        let account = backend.get_account("u1", "a1", Platform::X).await.unwrap();
        assert!(account.unwrap().is_connected());
        assert_eq!(
            backend.remaining_allowance("user:u1").await.unwrap(),
            Some(UsageAllowance::new(5))
        );
        assert!(backend
            .is_enabled("ingestion_enabled", FlagScope::Global)
            .await
            .unwrap());
    }
}
