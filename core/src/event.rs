//! Audit events appended to the activity log.
//!
//! RULE: every material finding an evaluator makes is recorded as exactly
//! one `RiskEvent`. The payload column holds the serialized event; the
//! action tag column holds `action_tag(&event)` so callers can filter by
//! prefix (`location_`, `payment_`, `device_`, `trust_`).

use crate::types::{RiskLevel, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Variants are appended as new findings are added; never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RiskEvent {
    // ── Trust ──────────────────────────────────────
    AccountFrozen {
        reason: String,
    },

    // ── Location ───────────────────────────────────
    LocationFlagged {
        risk_level: RiskLevel,
        latitude: f64,
        longitude: f64,
        reasons: Vec<String>,
        committed: bool,
    },
    LocationPolicyDenied {
        reason: String,
    },
    LocationValidationError {
        error: String,
    },

    // ── Payment ────────────────────────────────────
    PaymentScreened {
        attempt_id: String,
        amount: f64,
        risk_level: RiskLevel,
        recommended_action: String,
        confidence: i32,
        reasons: Vec<String>,
    },

    // ── Device ─────────────────────────────────────
    DeviceRegistered {
        fingerprint: String,
        risk_level: RiskLevel,
        existing_devices: i64,
    },
    DeviceSuspicious {
        fingerprint: String,
        risk_level: RiskLevel,
        reasons: Vec<String>,
    },
}

/// Stable tag for the `action_tag` column.
pub fn action_tag(event: &RiskEvent) -> &'static str {
    match event {
        RiskEvent::AccountFrozen { .. }           => "trust_account_frozen",
        RiskEvent::LocationFlagged { .. }         => "location_flagged",
        RiskEvent::LocationPolicyDenied { .. }    => "location_policy_denied",
        RiskEvent::LocationValidationError { .. } => "location_validation_error",
        RiskEvent::PaymentScreened { .. }         => "payment_screened",
        RiskEvent::DeviceRegistered { .. }        => "device_registered",
        RiskEvent::DeviceSuspicious { .. }        => "device_suspicious",
    }
}

/// The activity log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Option<i64>,
    pub user_id: UserId,
    pub action_tag: String,
    pub details: String, // JSON-serialized RiskEvent
    pub created_at: Timestamp,
}

impl ActivityLogEntry {
    pub fn from_event(user_id: &str, event: &RiskEvent, at: Timestamp) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            user_id: user_id.to_string(),
            action_tag: action_tag(event).to_string(),
            details: serde_json::to_string(event)?,
            created_at: at,
        })
    }

    pub fn event(&self) -> serde_json::Result<RiskEvent> {
        serde_json::from_str(&self.details)
    }
}
