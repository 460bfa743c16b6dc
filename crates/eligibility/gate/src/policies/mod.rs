//! Eligibility policies
//!
//! Production order, cheapest and most certain to block first:
//!
//! 1. [`UserStatusPolicy`]: identity validity
//! 2. [`AccountStatusPolicy`]: connected-account validity
//! 3. [`SubscriptionPolicy`]: commercial state
//! 4. [`TrialPolicy`]: trial window
//! 5. [`CreditPolicy`]: usage allowance
//! 6. [`FeatureFlagPolicy`]: global and per-account kill switches
//! 7. [`RateLimitPolicy`]: infrastructure protection

pub mod account_status;
pub mod credit;
pub mod feature_flag;
pub mod rate_limit;
pub mod subscription;
pub mod trial;
pub mod user_status;

pub use account_status::AccountStatusPolicy;
pub use credit::CreditPolicy;
pub use feature_flag::FeatureFlagPolicy;
pub use rate_limit::RateLimitPolicy;
pub use subscription::SubscriptionPolicy;
pub use trial::TrialPolicy;
pub use user_status::UserStatusPolicy;

use crate::error::StoreError;

/// Short, secret-free label for a store failure, safe for metadata
pub(crate) fn error_kind(error: &StoreError) -> &'static str {
    match error {
        StoreError::Unavailable { .. } => "unavailable",
        StoreError::Malformed { .. } => "malformed",
        StoreError::Timeout { .. } => "timeout",
    }
}

/// Mask an identifier for logging
pub(crate) fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("ratelimit:ingestion.perUser:u1"), "rate***r:u1");
        assert_eq!(mask_key("short"), "***");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(error_kind(&StoreError::unavailable("profile", "down")), "unavailable");
        assert_eq!(
            error_kind(&StoreError::Timeout {
                store: "profile",
                timeout_ms: 10
            }),
            "timeout"
        );
    }
}
