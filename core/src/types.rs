//! Shared primitive types used across the risk core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stable, opaque user identifier. Never reused.
pub type UserId = String;

/// Every timestamp in the core is UTC.
pub type Timestamp = DateTime<Utc>;

/// Ordinal risk classification produced by every evaluator.
/// Ordering matters: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low    => "low",
            Self::Medium => "medium",
            Self::High   => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low"    => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high"   => Some(Self::High),
            _        => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a stored millisecond column back to a timestamp.
pub(crate) fn ts_from_millis(ms: i64) -> Timestamp {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
