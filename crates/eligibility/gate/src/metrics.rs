//! Prometheus metrics for gate evaluations

use crate::decision::GateDecision;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::fmt;

/// Metrics for eligibility evaluations
#[derive(Clone)]
pub struct GateMetrics {
    /// Evaluations by outcome (allowed / blocked)
    pub evaluations_total: IntCounterVec,

    /// Blocks by attributed policy and reason
    pub blocks_total: IntCounterVec,

    /// Per-policy evaluation latency
    pub policy_duration_seconds: HistogramVec,
}

impl GateMetrics {
    /// Create and register gate metrics
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let evaluations_total = IntCounterVec::new(
            Opts::new("eligibility_evaluations_total", "Eligibility gate evaluations"),
            &["outcome"],
        )?;
        registry.register(Box::new(evaluations_total.clone()))?;

        let blocks_total = IntCounterVec::new(
            Opts::new("eligibility_blocks_total", "Eligibility gate blocks"),
            &["policy", "reason"],
        )?;
        registry.register(Box::new(blocks_total.clone()))?;

        let policy_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "eligibility_policy_duration_seconds",
                "Eligibility policy evaluation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["policy"],
        )?;
        registry.register(Box::new(policy_duration_seconds.clone()))?;

        Ok(Self {
            evaluations_total,
            blocks_total,
            policy_duration_seconds,
        })
    }

    pub fn record_decision(&self, decision: &GateDecision) {
        match decision {
            GateDecision::Allowed => {
                self.evaluations_total.with_label_values(&["allowed"]).inc();
            }
            GateDecision::Blocked(blocked_by) => {
                self.evaluations_total.with_label_values(&["blocked"]).inc();
                self.blocks_total
                    .with_label_values(&[blocked_by.policy.as_str(), blocked_by.reason.as_str()])
                    .inc();
            }
        }
    }

    pub fn observe_policy(&self, policy: &str, duration_us: u64) {
        self.policy_duration_seconds
            .with_label_values(&[policy])
            .observe(duration_us as f64 / 1_000_000.0);
    }
}

impl fmt::Debug for GateMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::BlockReason;

    #[test]
    fn test_metrics_record_decisions() {
        let registry = Registry::new();
        let metrics = GateMetrics::new(&registry).unwrap();

        metrics.record_decision(&GateDecision::Allowed);
        metrics.record_decision(&GateDecision::blocked(
            "TrialPolicy",
            BlockReason::TrialExpired,
            None,
        ));
        metrics.observe_policy("TrialPolicy", 1500);

        assert_eq!(
            metrics.evaluations_total.with_label_values(&["blocked"]).get(),
            1
        );
        assert_eq!(
            metrics
                .blocks_total
                .with_label_values(&["TrialPolicy", "trial_expired"])
                .get(),
            1
        );
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        assert!(GateMetrics::new(&registry).is_ok());
        assert!(GateMetrics::new(&registry).is_err());
    }
}
