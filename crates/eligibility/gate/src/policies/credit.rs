//! Usage allowance policy
//!
//! The allowance is looked up under a budget key derived from the
//! configured [`BudgetScope`]: `global`, `user:<id>`, `account:<id>` or
//! `platform:<name>`. A key with no allowance record has nothing left.

use crate::config::BudgetScope;
use crate::context::EligibilityContext;
use crate::decision::{BlockReason, PolicyResult};
use crate::error::Result;
use crate::gate::EligibilityPolicy;
use crate::policies::error_kind;
use crate::store::{bounded, UsageStore};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct CreditPolicy {
    usage: Arc<dyn UsageStore>,
    scope: BudgetScope,
    timeout: Duration,
}

impl CreditPolicy {
    pub const NAME: &'static str = "CreditPolicy";

    pub fn new(usage: Arc<dyn UsageStore>, scope: BudgetScope, timeout: Duration) -> Self {
        Self {
            usage,
            scope,
            timeout,
        }
    }

    /// Budget key for a context, `None` when the context lacks the scoped id
    pub fn budget_key(scope: BudgetScope, context: &EligibilityContext) -> Option<String> {
        match scope {
            BudgetScope::Global => Some("global".to_string()),
            BudgetScope::User => Some(format!("user:{}", context.user_id())),
            BudgetScope::Account => context
                .account_id()
                .filter(|id| !id.is_empty())
                .map(|id| format!("account:{}", id)),
            BudgetScope::Platform => context.platform().map(|p| format!("platform:{}", p)),
        }
    }
}

impl fmt::Debug for CreditPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreditPolicy")
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EligibilityPolicy for CreditPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, context: &EligibilityContext) -> Result<PolicyResult> {
        let Some(key) = Self::budget_key(self.scope, context) else {
            return Ok(PolicyResult::block(BlockReason::CreditPolicyError)
                .with_meta("budget_scope", self.scope.as_str()));
        };

        let lookup = bounded(
            "usage",
            self.timeout,
            self.usage.remaining_allowance(&key),
        )
        .await;

        let allowance = match lookup {
            Ok(allowance) => allowance,
            Err(e) => {
                warn!(
                    request_id = %context.request_id(),
                    error = %e,
                    "Could not read usage allowance"
                );
                let reason = if e.is_verification_failure() {
                    BlockReason::CreditVerificationError
                } else {
                    BlockReason::CreditPolicyError
                };
                return Ok(PolicyResult::block(reason).with_meta("error_kind", error_kind(&e)));
            }
        };

        let Some(allowance) = allowance else {
            return Ok(PolicyResult::block(BlockReason::CreditExhausted)
                .with_meta("remaining", 0)
                .with_meta("allowance_found", false));
        };

        let result = if allowance.is_exhausted() {
            PolicyResult::block(BlockReason::CreditExhausted)
        } else {
            PolicyResult::allow()
        };

        Ok(result
            .with_meta("remaining", allowance.remaining)
            .with_meta("limit", allowance.limit)
            .with_meta("used", allowance.used)
            .with_meta("unlimited", allowance.is_unlimited()))
    }

    fn description(&self) -> &str {
        "Requires remaining ingestion allowance"
    }
}
