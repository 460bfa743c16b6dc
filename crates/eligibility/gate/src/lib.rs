//! # Ingestion Eligibility Gate
//!
//! Decides whether an actor may run an ingestion of third-party data.
//!
//! ## Overview
//!
//! An [`EligibilityGate`] runs an ordered list of independent
//! [`EligibilityPolicy`] checks against an [`EligibilityContext`]. The first
//! policy to block decides the outcome and later policies never run. Every
//! failure is resolved as a block:
//!
//! - a store that cannot be read blocks with the policy's own
//!   verification-error reason
//! - a policy that errors or panics blocks with `evaluation_error`,
//!   attributed to the gate itself
//!
//! The gate only reads. It never enforces its own decision and never
//! increments usage or rate-limit counters.
//!
//! ## Key Components
//!
//! - [`EligibilityGate`]: ordered, fail-fast, fail-closed evaluation
//! - [`GateDecision`]: `{allowed, blocked_by?}` on the wire
//! - [`EligibilityDecisionCard`]: decision plus per-policy evaluation records
//! - [`BlockEmitter`]: fire-and-forget `ingestion_blocked` analytics events
//! - [`GateMetrics`]: Prometheus counters and latency histograms
//! - [`GateConfig`]: flags, budget scope, rate limits, store timeouts
//!
//! ## Standard Policies
//!
//! In evaluation order: [`UserStatusPolicy`], [`AccountStatusPolicy`],
//! [`SubscriptionPolicy`], [`TrialPolicy`], [`CreditPolicy`],
//! [`FeatureFlagPolicy`], [`RateLimitPolicy`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eligibility_gate::{
//!     EligibilityContext, EligibilityGateBuilder, GateConfig, GateStores, MemoryBackend,
//! };
//! use eligibility_types::{IngestionFlow, Platform};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(MemoryBackend::new());
//! let gate = EligibilityGateBuilder::new(GateConfig::load(None)?)
//!     .with_stores(GateStores::from_backend(backend))
//!     .build()?;
//!
//! let ctx = EligibilityContext::new("u1", "a1", Platform::X, IngestionFlow::Timeline);
//! let decision = gate.evaluate(&ctx).await;
//! if let Some(blocked_by) = decision.blocked_by() {
//!     println!("blocked by {}: {}", blocked_by.policy, blocked_by.reason);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod builder;
pub mod config;
pub mod context;
pub mod decision;
pub mod emitter;
pub mod error;
pub mod gate;
pub mod memory;
pub mod metrics;
pub mod policies;
pub mod store;

pub use builder::{standard_policies, EligibilityGateBuilder, GateStores};
pub use config::{
    BudgetScope, CreditConfig, EmitterConfig, FeatureFlagConfig, GateConfig, LoggingConfig,
    RateLimitConfig, StoreConfig, WindowLimit,
};
pub use context::EligibilityContext;
pub use decision::{
    BlockReason, BlockedBy, EligibilityDecisionCard, GateDecision, Metadata,
    PolicyEvaluationRecord, PolicyResult, GATE_POLICY_NAME,
};
pub use emitter::{
    AnalyticsSink, BlockEmitter, BlockEvent, MemoryAnalyticsSink, TracingAnalyticsSink,
    BLOCK_EVENT_NAME,
};
pub use error::{ConfigError, PolicyError, Result, SinkError, StoreError, StoreResult};
pub use gate::{EligibilityGate, EligibilityPolicy};
pub use memory::{BackendSnapshot, MemoryBackend, StoreKind};
pub use metrics::GateMetrics;
pub use policies::{
    AccountStatusPolicy, CreditPolicy, FeatureFlagPolicy, RateLimitPolicy, SubscriptionPolicy,
    TrialPolicy, UserStatusPolicy,
};
pub use store::{
    bounded, AccountStore, FeatureFlagService, FlagScope, ProfileStore, RateLimitStore,
    SubscriptionStore, UsageStore,
};
