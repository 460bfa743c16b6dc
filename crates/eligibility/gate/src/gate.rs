//! Eligibility policy trait and the gate that runs policies in order
//!
//! The gate evaluates its policies one after another, awaiting each, and
//! stops at the first block. Policy order is fixed when the gate is built;
//! see [`crate::builder::standard_policies`] for the production order.
//!
//! The gate never fails. A policy that returns `Err` or panics (both are
//! contract violations; policies are supposed to fail closed on their own)
//! is converted into a block attributed to [`GATE_POLICY_NAME`] with reason
//! `evaluation_error`.

use crate::context::EligibilityContext;
use crate::decision::{
    EligibilityDecisionCard, GateDecision, Metadata, PolicyEvaluationRecord, PolicyResult,
    GATE_POLICY_NAME,
};
use crate::emitter::{BlockEmitter, BlockEvent};
use crate::error::Result;
use crate::metrics::GateMetrics;
use crate::policies::RateLimitPolicy;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// A single, independent eligibility check
///
/// Implementations hold only read-only collaborators and must be safe to
/// share across concurrent evaluations. They read, never write, and turn
/// their own failures into a blocking [`PolicyResult`] with a
/// policy-specific reason.
#[async_trait]
pub trait EligibilityPolicy: Send + Sync + fmt::Debug {
    /// Name reported in `blocked_by.policy`
    fn name(&self) -> &str;

    /// Evaluate the context
    async fn evaluate(&self, context: &EligibilityContext) -> Result<PolicyResult>;

    fn description(&self) -> &str {
        "Eligibility policy"
    }
}

/// Gate running an ordered list of policies with first-block-wins semantics
#[derive(Debug)]
pub struct EligibilityGate {
    policies: Vec<Arc<dyn EligibilityPolicy>>,
    emitter: Option<BlockEmitter>,
    metrics: Option<Arc<GateMetrics>>,
}

enum PolicyRun {
    Completed(PolicyResult),
    Broken(String),
}

impl EligibilityGate {
    /// Create a gate over `policies`, evaluated in the given order
    pub fn new(policies: Vec<Arc<dyn EligibilityPolicy>>) -> Self {
        Self {
            policies,
            emitter: None,
            metrics: None,
        }
    }

    /// Emit a block event whenever the gate blocks
    pub fn with_emitter(mut self, emitter: BlockEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<GateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Policy names in evaluation order
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// Evaluate the context
    pub async fn evaluate(&self, context: &EligibilityContext) -> GateDecision {
        self.evaluate_with_card(context).await.decision
    }

    /// Convenience check
    pub async fn is_allowed(&self, context: &EligibilityContext) -> bool {
        self.evaluate(context).await.is_allowed()
    }

    /// Retry hints are honoured only from the infrastructure rate limiter
    fn retry_hint(
        policy: &str,
        retry_after_seconds: Option<u64>,
        context: &EligibilityContext,
    ) -> Option<u64> {
        if policy == RateLimitPolicy::NAME {
            return retry_after_seconds;
        }
        if let Some(seconds) = retry_after_seconds {
            debug!(
                request_id = %context.request_id(),
                policy = %policy,
                retry_after_seconds = seconds,
                "Dropping retry hint from non rate-limit policy"
            );
        }
        None
    }

    /// Evaluate the context and return the full decision card
    pub async fn evaluate_with_card(&self, context: &EligibilityContext) -> EligibilityDecisionCard {
        debug!(
            request_id = %context.request_id(),
            user_id = %context.user_id(),
            flow = %context.flow(),
            policies = self.policies.len(),
            "Evaluating ingestion eligibility"
        );

        let mut card = EligibilityDecisionCard::new(context.request_id());

        for policy in &self.policies {
            let start = Instant::now();
            let run = Self::run_policy(policy.as_ref(), context).await;
            let duration_us = start.elapsed().as_micros() as u64;

            if let Some(metrics) = &self.metrics {
                metrics.observe_policy(policy.name(), duration_us);
            }

            match run {
                PolicyRun::Completed(result) => {
                    debug!(
                        request_id = %context.request_id(),
                        policy = %policy.name(),
                        allowed = result.is_allowed(),
                        duration_us,
                        "Policy evaluated"
                    );

                    let blocked = match &result {
                        PolicyResult::Allow { .. } => None,
                        PolicyResult::Block {
                            reason,
                            retry_after_seconds,
                            metadata,
                        } => {
                            let retry_after_seconds =
                                Self::retry_hint(policy.name(), *retry_after_seconds, context);
                            Some((
                                GateDecision::blocked(policy.name(), *reason, retry_after_seconds),
                                metadata.clone(),
                            ))
                        }
                    };

                    card.add_evaluation(PolicyEvaluationRecord::new(
                        policy.name(),
                        Some(result),
                        duration_us,
                    ));

                    if let Some((decision, metadata)) = blocked {
                        return self.finish_blocked(card, decision, metadata, context);
                    }
                }
                PolicyRun::Broken(cause) => {
                    error!(
                        request_id = %context.request_id(),
                        policy = %policy.name(),
                        cause = %cause,
                        "Policy broke its contract, failing closed"
                    );

                    card.add_evaluation(
                        PolicyEvaluationRecord::new(policy.name(), None, duration_us)
                            .with_notes(cause),
                    );

                    let mut metadata = Metadata::new();
                    metadata.insert("failed_policy".into(), policy.name().into());
                    return self.finish_blocked(
                        card,
                        GateDecision::evaluation_error(),
                        metadata,
                        context,
                    );
                }
            }
        }

        debug!(request_id = %context.request_id(), "All eligibility policies passed");
        card.decision = GateDecision::Allowed;
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(&card.decision);
        }
        card
    }

    async fn run_policy(policy: &dyn EligibilityPolicy, context: &EligibilityContext) -> PolicyRun {
        match AssertUnwindSafe(policy.evaluate(context)).catch_unwind().await {
            Ok(Ok(result)) => PolicyRun::Completed(result),
            Ok(Err(e)) => PolicyRun::Broken(e.to_string()),
            Err(panic) => PolicyRun::Broken(panic_message(panic.as_ref())),
        }
    }

    fn finish_blocked(
        &self,
        mut card: EligibilityDecisionCard,
        decision: GateDecision,
        metadata: Metadata,
        context: &EligibilityContext,
    ) -> EligibilityDecisionCard {
        if let Some(blocked_by) = decision.blocked_by() {
            warn!(
                request_id = %context.request_id(),
                user_id = %context.user_id(),
                policy = %blocked_by.policy,
                reason = %blocked_by.reason,
                retry_after_seconds = ?blocked_by.retry_after_seconds,
                "Ingestion blocked"
            );

            if let Some(emitter) = &self.emitter {
                emitter.emit(BlockEvent::new(context, blocked_by, metadata));
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(&decision);
        }

        card.decision = decision;
        card
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic: <non-string payload>".to_string()
    }
}
