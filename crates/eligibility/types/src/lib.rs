//! # Ingestion Eligibility Types
//!
//! Shared vocabulary for the ingestion eligibility gate:
//!
//! - [`Platform`] and [`IngestionFlow`]: what is being ingested and from where
//! - Backing-store records read by the gate's policies ([`ProfileRecord`],
//!   [`ConnectedAccountRecord`], [`SubscriptionRecord`], [`UsageAllowance`],
//!   [`WindowUsage`])
//!
//! Records mirror what the stores hold, not what the gate wants them to hold.
//! Status columns stay raw strings so that schema drift is detected by the
//! policies instead of failing deserialization.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod platform;
pub mod records;

pub use platform::{IngestionFlow, ParseError, Platform};
pub use records::{
    ConnectedAccountRecord, OAuthError, ProfileRecord, SubscriptionRecord, SubscriptionStatus,
    UsageAllowance, WindowUsage, CONNECTED, UNLIMITED,
};
