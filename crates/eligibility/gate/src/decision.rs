//! Policy results and gate decisions
//!
//! A [`PolicyResult`] is what one policy says; a [`GateDecision`] is what the
//! gate says after running policies in order. Both are tagged unions so that
//! "blocked without a reason" and "allowed with a blocker" cannot be built.
//! On the wire a gate decision keeps the flat `{allowed, blocked_by}` shape
//! callers already parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Diagnostic values read during evaluation. Never secrets or PII.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Policy name the gate attributes its own safety-net blocks to
pub const GATE_POLICY_NAME: &str = "Gate";

/// Why a policy (or the gate) blocked ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    UserDeleted,
    UserSuspended,
    UserStatusUnknown,

    AccountContextMissing,
    AccountNotFound,
    AccountDisconnected,
    AccountOauthError,
    AccountStatusUnknown,
    AccountStatusError,

    SubscriptionInactive,
    SubscriptionStatusUnknown,
    SubscriptionVerificationError,
    SubscriptionPolicyError,

    TrialExpired,
    TrialVerificationError,
    TrialPolicyError,

    CreditExhausted,
    CreditVerificationError,
    CreditPolicyError,

    FeatureDisabled,
    FeatureFlagVerificationError,

    RateLimitExceeded,
    RateLimitVerificationError,

    /// A policy broke its own contract; attributed to the gate
    EvaluationError,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::UserDeleted => "user_deleted",
            BlockReason::UserSuspended => "user_suspended",
            BlockReason::UserStatusUnknown => "user_status_unknown",
            BlockReason::AccountContextMissing => "account_context_missing",
            BlockReason::AccountNotFound => "account_not_found",
            BlockReason::AccountDisconnected => "account_disconnected",
            BlockReason::AccountOauthError => "account_oauth_error",
            BlockReason::AccountStatusUnknown => "account_status_unknown",
            BlockReason::AccountStatusError => "account_status_error",
            BlockReason::SubscriptionInactive => "subscription_inactive",
            BlockReason::SubscriptionStatusUnknown => "subscription_status_unknown",
            BlockReason::SubscriptionVerificationError => "subscription_verification_error",
            BlockReason::SubscriptionPolicyError => "subscription_policy_error",
            BlockReason::TrialExpired => "trial_expired",
            BlockReason::TrialVerificationError => "trial_verification_error",
            BlockReason::TrialPolicyError => "trial_policy_error",
            BlockReason::CreditExhausted => "credit_exhausted",
            BlockReason::CreditVerificationError => "credit_verification_error",
            BlockReason::CreditPolicyError => "credit_policy_error",
            BlockReason::FeatureDisabled => "feature_disabled",
            BlockReason::FeatureFlagVerificationError => "feature_flag_verification_error",
            BlockReason::RateLimitExceeded => "rate_limit_exceeded",
            BlockReason::RateLimitVerificationError => "rate_limit_verification_error",
            BlockReason::EvaluationError => "evaluation_error",
        }
    }

    /// Expected business outcome, as opposed to a dependency failure
    pub fn is_business_block(&self) -> bool {
        matches!(
            self,
            BlockReason::UserDeleted
                | BlockReason::UserSuspended
                | BlockReason::AccountNotFound
                | BlockReason::AccountDisconnected
                | BlockReason::AccountOauthError
                | BlockReason::SubscriptionInactive
                | BlockReason::TrialExpired
                | BlockReason::CreditExhausted
                | BlockReason::FeatureDisabled
                | BlockReason::RateLimitExceeded
        )
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of a single policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PolicyResult {
    Allow {
        #[serde(default)]
        metadata: Metadata,
    },
    Block {
        reason: BlockReason,
        /// Only infrastructure-limit policies set this
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_seconds: Option<u64>,
        #[serde(default)]
        metadata: Metadata,
    },
}

impl PolicyResult {
    pub fn allow() -> Self {
        Self::Allow {
            metadata: Metadata::new(),
        }
    }

    pub fn block(reason: BlockReason) -> Self {
        Self::Block {
            reason,
            retry_after_seconds: None,
            metadata: Metadata::new(),
        }
    }

    /// Block with a retry hint
    ///
    /// The gate keeps the hint only when the blocking policy is the
    /// infrastructure rate limiter; other policies lose it.
    pub fn throttle(reason: BlockReason, retry_after_seconds: u64) -> Self {
        Self::Block {
            reason,
            retry_after_seconds: Some(retry_after_seconds),
            metadata: Metadata::new(),
        }
    }

    /// Attach a diagnostic value
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        match &mut self {
            Self::Allow { metadata } | Self::Block { metadata, .. } => {
                metadata.insert(key.into(), value.into());
            }
        }
        self
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn reason(&self) -> Option<BlockReason> {
        match self {
            Self::Allow { .. } => None,
            Self::Block { reason, .. } => Some(*reason),
        }
    }

    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Allow { .. } => None,
            Self::Block {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Allow { metadata } | Self::Block { metadata, .. } => metadata,
        }
    }
}

/// The single policy that stopped an evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedBy {
    pub policy: String,
    pub reason: BlockReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

/// Final answer of the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "DecisionWire", try_from = "DecisionWire")]
pub enum GateDecision {
    Allowed,
    Blocked(BlockedBy),
}

impl GateDecision {
    pub fn blocked(
        policy: impl Into<String>,
        reason: BlockReason,
        retry_after_seconds: Option<u64>,
    ) -> Self {
        Self::Blocked(BlockedBy {
            policy: policy.into(),
            reason,
            retry_after_seconds,
        })
    }

    /// Safety-net decision used when a policy breaks its contract
    pub fn evaluation_error() -> Self {
        Self::blocked(GATE_POLICY_NAME, BlockReason::EvaluationError, None)
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn blocked_by(&self) -> Option<&BlockedBy> {
        match self {
            Self::Allowed => None,
            Self::Blocked(blocked_by) => Some(blocked_by),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DecisionWire {
    allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blocked_by: Option<BlockedBy>,
}

impl From<GateDecision> for DecisionWire {
    fn from(decision: GateDecision) -> Self {
        match decision {
            GateDecision::Allowed => Self {
                allowed: true,
                blocked_by: None,
            },
            GateDecision::Blocked(blocked_by) => Self {
                allowed: false,
                blocked_by: Some(blocked_by),
            },
        }
    }
}

impl TryFrom<DecisionWire> for GateDecision {
    type Error = String;

    fn try_from(wire: DecisionWire) -> Result<Self, Self::Error> {
        match (wire.allowed, wire.blocked_by) {
            (true, None) => Ok(Self::Allowed),
            (false, Some(blocked_by)) => Ok(Self::Blocked(blocked_by)),
            (true, Some(_)) => Err("allowed decision must not carry blocked_by".into()),
            (false, None) => Err("blocked decision must carry blocked_by".into()),
        }
    }
}

/// Audit card for one gate evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityDecisionCard {
    /// Unique identifier for this card
    pub id: String,

    /// Correlation id from the context
    pub request_id: Uuid,

    pub decision: GateDecision,

    /// When the evaluation started
    pub timestamp: DateTime<Utc>,

    /// Policies that actually ran, in order
    pub policies_evaluated: Vec<PolicyEvaluationRecord>,
}

impl EligibilityDecisionCard {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id,
            decision: GateDecision::Allowed,
            timestamp: Utc::now(),
            policies_evaluated: Vec::new(),
        }
    }

    pub fn add_evaluation(&mut self, record: PolicyEvaluationRecord) {
        self.policies_evaluated.push(record);
    }

    pub fn was_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    /// Names of the policies that ran
    pub fn evaluated_policies(&self) -> Vec<&str> {
        self.policies_evaluated
            .iter()
            .map(|r| r.policy.as_str())
            .collect()
    }
}

/// Record of a single policy evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluationRecord {
    pub policy: String,

    /// `None` when the policy broke its contract and produced no result
    pub result: Option<PolicyResult>,

    /// Evaluation duration in microseconds
    pub duration_us: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PolicyEvaluationRecord {
    pub fn new(policy: impl Into<String>, result: Option<PolicyResult>, duration_us: u64) -> Self {
        Self {
            policy: policy.into(),
            result,
            duration_us,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
