//! Gate configuration
//!
//! Loaded from defaults, then an optional file, then `INGEST_GATE__*`
//! environment variables (e.g. `INGEST_GATE__RATE_LIMIT__PER_USER__MAX=200`).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub feature_flags: FeatureFlagConfig,

    #[serde(default)]
    pub credit: CreditConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub stores: StoreConfig,

    #[serde(default)]
    pub emitter: EmitterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GateConfig {
    /// Load configuration from an optional file plus environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&GateConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("INGEST_GATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: GateConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a policy meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, scope) in self.rate_limit.scopes() {
            if scope.enabled && scope.window_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate_limit.{} window_secs must be > 0",
                    name
                )));
            }
        }
        if self.stores.timeout_ms == 0 {
            return Err(ConfigError::Invalid("stores.timeout_ms must be > 0".into()));
        }
        if self.emitter.capacity == 0 {
            return Err(ConfigError::Invalid("emitter.capacity must be > 0".into()));
        }
        if self.feature_flags.global_flag.is_empty() || self.feature_flags.account_flag.is_empty() {
            return Err(ConfigError::Invalid("feature flag names must not be empty".into()));
        }
        Ok(())
    }
}

/// Flags consulted by the feature-flag policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlagConfig {
    #[serde(default = "default_ingestion_flag")]
    pub global_flag: String,

    #[serde(default = "default_ingestion_flag")]
    pub account_flag: String,
}

impl Default for FeatureFlagConfig {
    fn default() -> Self {
        Self {
            global_flag: default_ingestion_flag(),
            account_flag: default_ingestion_flag(),
        }
    }
}

/// Dimension a usage allowance is tracked by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetScope {
    Global,
    #[default]
    User,
    Account,
    Platform,
}

impl BudgetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetScope::Global => "global",
            BudgetScope::User => "user",
            BudgetScope::Account => "account",
            BudgetScope::Platform => "platform",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreditConfig {
    #[serde(default)]
    pub scope: BudgetScope,
}

/// One sliding-window limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub max: u64,
    pub window_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl WindowLimit {
    pub fn new(max: u64, window_secs: u64) -> Self {
        Self {
            max,
            window_secs,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Ingestion rate limits, checked global first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_global_limit")]
    pub global: WindowLimit,

    #[serde(default = "default_per_user_limit")]
    pub per_user: WindowLimit,

    #[serde(default = "default_per_account_limit")]
    pub per_account: WindowLimit,

    /// Retry hint returned when the counter store cannot be read
    #[serde(default = "default_store_error_retry")]
    pub store_error_retry_secs: u64,
}

impl RateLimitConfig {
    /// Scopes in evaluation order
    pub fn scopes(&self) -> [(&'static str, WindowLimit); 3] {
        [
            ("global", self.global),
            ("perUser", self.per_user),
            ("perAccount", self.per_account),
        ]
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: default_global_limit(),
            per_user: default_per_user_limit(),
            per_account: default_per_account_limit(),
            store_error_retry_secs: default_store_error_retry(),
        }
    }
}

/// Bounds each policy puts on its own store calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bounded queue size; events beyond it are dropped
    #[serde(default = "default_emitter_capacity")]
    pub capacity: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_emitter_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_ingestion_flag() -> String {
    "ingestion_enabled".to_string()
}

fn default_global_limit() -> WindowLimit {
    WindowLimit::new(1000, 3600)
}

fn default_per_user_limit() -> WindowLimit {
    WindowLimit::new(100, 3600)
}

fn default_per_account_limit() -> WindowLimit {
    WindowLimit::new(50, 3600)
}

fn default_store_error_retry() -> u64 {
    60
}

fn default_store_timeout() -> u64 {
    2000
}

fn default_emitter_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}
