//! Ingestion rate limit policy
//!
//! Sliding-window counters live in an external store so limits hold across
//! processes. Enabled scopes are checked global, then per user, then per
//! account. This policy only reads the counters; recording a hit belongs to
//! the ingestion pipeline once work is actually accepted.
//!
//! This is the only policy that sets `retry_after_seconds`.

use crate::config::{RateLimitConfig, WindowLimit};
use crate::context::EligibilityContext;
use crate::decision::{BlockReason, PolicyResult};
use crate::error::Result;
use crate::gate::EligibilityPolicy;
use crate::policies::{error_kind, mask_key};
use crate::store::{bounded, RateLimitStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eligibility_types::WindowUsage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix shared by every ingestion counter key
pub const KEY_PREFIX: &str = "ratelimit:ingestion";

pub struct RateLimitPolicy {
    counters: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
    timeout: Duration,
}

impl RateLimitPolicy {
    pub const NAME: &'static str = "RateLimitPolicy";

    pub fn new(
        counters: Arc<dyn RateLimitStore>,
        config: RateLimitConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            counters,
            config,
            timeout,
        }
    }

    /// Counter key for a scope, `None` when the context lacks its id
    pub fn counter_key(scope: &str, context: &EligibilityContext) -> Option<String> {
        let id = match scope {
            "global" => "global",
            "perUser" => context.user_id(),
            "perAccount" => context.account_id().filter(|id| !id.is_empty())?,
            _ => return None,
        };
        Some(format!("{}.{}:{}", KEY_PREFIX, scope, id))
    }

    fn verification_error(&self, scope: &str) -> PolicyResult {
        PolicyResult::throttle(
            BlockReason::RateLimitVerificationError,
            self.config.store_error_retry_secs,
        )
        .with_meta("scope", scope)
    }
}

/// Seconds until the oldest hit leaves the window, at least one
pub fn retry_after(usage: &WindowUsage, limit: &WindowLimit, now: DateTime<Utc>) -> u64 {
    let Some(oldest_at) = usage.oldest_at else {
        return limit.window_secs.max(1);
    };

    let window_ms = i64::try_from(limit.window_secs)
        .unwrap_or(i64::MAX / 1000)
        .saturating_mul(1000);
    let remaining_ms = oldest_at
        .timestamp_millis()
        .saturating_add(window_ms)
        .saturating_sub(now.timestamp_millis());

    if remaining_ms <= 0 {
        return 1;
    }
    let secs = (remaining_ms + 999) / 1000;
    u64::try_from(secs).unwrap_or(u64::MAX).max(1)
}

impl fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EligibilityPolicy for RateLimitPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, context: &EligibilityContext) -> Result<PolicyResult> {
        for (scope, limit) in self.config.scopes() {
            if !limit.enabled {
                continue;
            }

            let Some(key) = Self::counter_key(scope, context) else {
                debug!(
                    request_id = %context.request_id(),
                    scope = scope,
                    "No identifier for rate limit scope"
                );
                return Ok(self.verification_error(scope));
            };

            let lookup = bounded(
                "rate_limit",
                self.timeout,
                self.counters.window_usage(&key, limit.window()),
            )
            .await;

            let usage = match lookup {
                Ok(usage) => usage,
                Err(e) => {
                    warn!(
                        request_id = %context.request_id(),
                        key = %mask_key(&key),
                        error = %e,
                        "Could not read rate limit counter"
                    );
                    return Ok(self
                        .verification_error(scope)
                        .with_meta("error_kind", error_kind(&e)));
                }
            };

            if usage.count >= limit.max {
                let retry = retry_after(&usage, &limit, Utc::now());
                debug!(
                    request_id = %context.request_id(),
                    key = %mask_key(&key),
                    count = usage.count,
                    limit = limit.max,
                    retry_after_seconds = retry,
                    "Rate limit exceeded"
                );
                return Ok(PolicyResult::throttle(BlockReason::RateLimitExceeded, retry)
                    .with_meta("scope", scope)
                    .with_meta("limit", limit.max)
                    .with_meta("window_secs", limit.window_secs));
            }
        }

        Ok(PolicyResult::allow())
    }

    fn description(&self) -> &str {
        "Protects ingestion infrastructure with sliding-window limits"
    }
}
