//! Eligibility evaluation context
//!
//! One context is built per evaluation call and only ever read afterwards.
//! Account and platform are optional at the type level because upstream
//! callers sometimes fail to supply them; the account-status policy turns
//! that into a block instead of the gate refusing to run.

use eligibility_types::{IngestionFlow, Platform};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context for a single eligibility evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityContext {
    user_id: String,

    #[serde(default)]
    account_id: Option<String>,

    #[serde(default)]
    platform: Option<Platform>,

    flow: IngestionFlow,

    /// Correlation id, generated when the caller does not supply one
    #[serde(default = "Uuid::new_v4")]
    request_id: Uuid,
}

impl EligibilityContext {
    /// Create a context for ingesting `flow` from a connected account
    pub fn new(
        user_id: impl Into<String>,
        account_id: impl Into<String>,
        platform: Platform,
        flow: IngestionFlow,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            account_id: Some(account_id.into()),
            platform: Some(platform),
            flow,
            request_id: Uuid::new_v4(),
        }
    }

    /// Create a context from possibly incomplete caller input
    pub fn from_parts(
        user_id: impl Into<String>,
        account_id: Option<String>,
        platform: Option<Platform>,
        flow: IngestionFlow,
        request_id: Option<Uuid>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            account_id,
            platform,
            flow,
            request_id: request_id.unwrap_or_else(Uuid::new_v4),
        }
    }

    /// Use a caller-supplied correlation id
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn flow(&self) -> IngestionFlow {
        self.flow
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = EligibilityContext::new("u1", "a1", Platform::X, IngestionFlow::Timeline);
        assert_eq!(ctx.user_id(), "u1");
        assert_eq!(ctx.account_id(), Some("a1"));
        assert_eq!(ctx.platform(), Some(Platform::X));
        assert_eq!(ctx.flow(), IngestionFlow::Timeline);
    }

    #[test]
    fn test_request_id_generated_when_absent() {
        let a = EligibilityContext::from_parts("u1", None, None, IngestionFlow::Mentions, None);
        let b = EligibilityContext::from_parts("u1", None, None, IngestionFlow::Mentions, None);
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(a.request_id().get_version_num(), 4);
    }

    #[test]
    fn test_request_id_kept_when_supplied() {
        let id = Uuid::new_v4();
        let ctx = EligibilityContext::new("u1", "a1", Platform::YouTube, IngestionFlow::Replies)
            .with_request_id(id);
        assert_eq!(ctx.request_id(), id);
    }

    #[test]
    fn test_deserialize_without_request_id() {
        let ctx: EligibilityContext =
            serde_json::from_str(r#"{"user_id":"u1","account_id":"a1","platform":"x","flow":"timeline"}"#)
                .unwrap();
        assert_eq!(ctx.platform(), Some(Platform::X));
        assert_eq!(ctx.request_id().get_version_num(), 4);
    }

    #[test]
    fn test_deserialize_missing_account() {
        let ctx: EligibilityContext =
            serde_json::from_str(r#"{"user_id":"u1","flow":"replies"}"#).unwrap();
        assert!(ctx.account_id().is_none());
        assert!(ctx.platform().is_none());
    }
}
