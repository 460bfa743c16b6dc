//! Platforms and ingestion flows
//!
//! A connected account lives on exactly one platform; an ingestion run pulls
//! one flow (timeline, mentions, replies) from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a platform or flow identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Unknown ingestion flow: {0}")]
    UnknownFlow(String),
}

/// Third-party platform an account is connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// X (formerly Twitter)
    X,

    /// YouTube
    YouTube,
}

impl Platform {
    /// Wire identifier, as stored alongside connected accounts
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::X => "x",
            Platform::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x" | "twitter" => Ok(Platform::X),
            "youtube" => Ok(Platform::YouTube),
            other => Err(ParseError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Which stream of third-party data an ingestion run pulls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionFlow {
    Timeline,
    Mentions,
    Replies,
}

impl IngestionFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionFlow::Timeline => "timeline",
            IngestionFlow::Mentions => "mentions",
            IngestionFlow::Replies => "replies",
        }
    }
}

impl fmt::Display for IngestionFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestionFlow {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "timeline" => Ok(IngestionFlow::Timeline),
            "mentions" => Ok(IngestionFlow::Mentions),
            "replies" => Ok(IngestionFlow::Replies),
            other => Err(ParseError::UnknownFlow(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parsing() {
        assert_eq!("x".parse::<Platform>().unwrap(), Platform::X);
        assert_eq!("Twitter".parse::<Platform>().unwrap(), Platform::X);
        assert_eq!("youtube".parse::<Platform>().unwrap(), Platform::YouTube);
        assert!(matches!(
            "myspace".parse::<Platform>(),
            Err(ParseError::UnknownPlatform(_))
        ));
    }

    #[test]
    fn test_flow_parsing() {
        assert_eq!(
            "mentions".parse::<IngestionFlow>().unwrap(),
            IngestionFlow::Mentions
        );
        assert!("dms".parse::<IngestionFlow>().is_err());
    }

    #[test]
    fn test_platform_serde_uses_wire_names() {
        let json = serde_json::to_string(&Platform::YouTube).unwrap();
        assert_eq!(json, "\"youtube\"");
        let back: Platform = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(back, Platform::X);
    }
}
