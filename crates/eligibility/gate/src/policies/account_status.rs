//! Connected-account status policy
//!
//! The account is looked up by (user, account, platform). It must exist,
//! be `connected`, and carry no OAuth error. OAuth errors come in two
//! shapes: an object with a `type`, and the older bare string, which is
//! reported with type `unknown`.

use crate::context::EligibilityContext;
use crate::decision::{BlockReason, PolicyResult};
use crate::error::Result;
use crate::gate::EligibilityPolicy;
use crate::policies::error_kind;
use crate::store::{bounded, AccountStore};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct AccountStatusPolicy {
    accounts: Arc<dyn AccountStore>,
    timeout: Duration,
}

impl AccountStatusPolicy {
    pub const NAME: &'static str = "AccountStatusPolicy";

    pub fn new(accounts: Arc<dyn AccountStore>, timeout: Duration) -> Self {
        Self { accounts, timeout }
    }
}

impl fmt::Debug for AccountStatusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountStatusPolicy")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EligibilityPolicy for AccountStatusPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, context: &EligibilityContext) -> Result<PolicyResult> {
        let account_id = context.account_id().filter(|id| !id.is_empty());
        let (account_id, platform) = match (account_id, context.platform()) {
            (Some(account_id), Some(platform)) => (account_id, platform),
            (account_id, platform) => {
                debug!(
                    request_id = %context.request_id(),
                    "Eligibility context lacks account or platform"
                );
                return Ok(PolicyResult::block(BlockReason::AccountContextMissing)
                    .with_meta("has_account_id", account_id.is_some())
                    .with_meta("has_platform", platform.is_some()));
            }
        };

        let lookup = bounded(
            "account",
            self.timeout,
            self.accounts
                .get_account(context.user_id(), account_id, platform),
        )
        .await;

        let account = match lookup {
            Ok(Some(account)) => account,
            Ok(None) => {
                return Ok(PolicyResult::block(BlockReason::AccountNotFound)
                    .with_meta("platform", platform.as_str()));
            }
            Err(e) => {
                warn!(
                    request_id = %context.request_id(),
                    platform = %platform,
                    error = %e,
                    "Could not read connected account"
                );
                let reason = if e.is_verification_failure() {
                    BlockReason::AccountStatusUnknown
                } else {
                    BlockReason::AccountStatusError
                };
                return Ok(PolicyResult::block(reason).with_meta("error_kind", error_kind(&e)));
            }
        };

        if !account.is_connected() {
            return Ok(PolicyResult::block(BlockReason::AccountDisconnected)
                .with_meta("platform", platform.as_str())
                .with_meta("connection_status", account.connection_status));
        }

        if let Some(oauth_error) = &account.oauth_error {
            return Ok(PolicyResult::block(BlockReason::AccountOauthError)
                .with_meta("platform", platform.as_str())
                .with_meta("oauth_error_type", oauth_error.error_type()));
        }

        Ok(PolicyResult::allow()
            .with_meta("platform", platform.as_str())
            .with_meta("connection_status", account.connection_status))
    }

    fn description(&self) -> &str {
        "Requires a connected account without OAuth errors"
    }
}
