//! User status policy
//!
//! Blocks deleted and suspended users. Deletion is checked before
//! suspension, so a deleted-and-suspended profile reports `user_deleted`.

use crate::context::EligibilityContext;
use crate::decision::{BlockReason, PolicyResult};
use crate::error::Result;
use crate::gate::EligibilityPolicy;
use crate::policies::error_kind;
use crate::store::{bounded, ProfileStore};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct UserStatusPolicy {
    profiles: Arc<dyn ProfileStore>,
    timeout: Duration,
}

impl UserStatusPolicy {
    pub const NAME: &'static str = "UserStatusPolicy";

    pub fn new(profiles: Arc<dyn ProfileStore>, timeout: Duration) -> Self {
        Self { profiles, timeout }
    }
}

impl fmt::Debug for UserStatusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserStatusPolicy")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EligibilityPolicy for UserStatusPolicy {
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
                return Ok(PolicyResult::block(BlockReason::UserStatusUnknown)
                    .with_meta("profile_found", false));
            }
            Err(e) => {
                warn!(
                    request_id = %context.request_id(),
                    error = %e,
                    "Could not read profile for user status"
                );
                return Ok(PolicyResult::block(BlockReason::UserStatusUnknown)
                    .with_meta("error_kind", error_kind(&e)));
            }
        };

        if let Some(deleted_at) = profile.deleted_at {
            return Ok(PolicyResult::block(BlockReason::UserDeleted)
                .with_meta("deleted_at", deleted_at.to_rfc3339()));
        }

        if profile.is_suspended {
            return Ok(PolicyResult::block(BlockReason::UserSuspended));
        }

        Ok(PolicyResult::allow().with_meta("current_plan", profile.current_plan))
    }

    fn description(&self) -> &str {
        "Blocks deleted and suspended users"
    }
}
