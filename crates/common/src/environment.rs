//! Feed environment configuration.
//!
//! Supports the production and demo market-data endpoints.

use std::fmt;
use std::str::FromStr;

/// Market-data environment (production or demo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedEnvironment {
    /// Production feed.
    #[default]
    Production,
    /// Demo feed with simulated liquidity.
    Demo,
}

impl FeedEnvironment {
    /// WebSocket URL for the public book feed.
    pub fn ws_url(&self) -> &'static str {
        match self {
            Self::Production => "wss://www.cryptofacilities.com/ws/v1",
            Self::Demo => "wss://demo-futures.kraken.com/ws/v1",
        }
    }

    /// Returns true if this is the production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns true if this is the demo environment.
    pub fn is_demo(&self) -> bool {
        matches!(self, Self::Demo)
    }

    /// Load environment from `FEED_ENVIRONMENT` env var.
    ///
    /// Returns `Production` if not set or invalid.
    pub fn from_env() -> Self {
        std::env::var("FEED_ENVIRONMENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for FeedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Demo => write!(f, "demo"),
        }
    }
}

impl FromStr for FeedEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" | "live" => Ok(Self::Production),
            "demo" | "test" | "sandbox" => Ok(Self::Demo),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Error parsing environment string.
#[derive(Debug, Clone)]
pub struct ParseEnvironmentError(String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid environment '{}', expected 'production' or 'demo'",
            self.0
        )
    }
}

impl std::error::Error for ParseEnvironmentError {}
