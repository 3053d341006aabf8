//! Trust Score Ledger.
//!
//! Maps a closed set of `TrustAction`s to signed point deltas, clamps the
//! user's running score into [0, 100], and writes exactly one
//! `TrustScoreEvent` per call.
//!
//! `AccountCreated` is an absolute reset to the default score, not a delta.
//! Frozen accounts never gain points; their event is still written with
//! `points = 0`.
//!
//! Store errors propagate unchanged. Callers on the location and device
//! paths log and continue (fail open); retries are never attempted here.

use crate::{
    config::TrustConfig,
    error::{RiskError, RiskResult},
    event::{ActivityLogEntry, RiskEvent},
    store::{RiskStore, TrustAdjustment},
    types::{Timestamp, UserId},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const MIN_SCORE: i32 = 0;
pub const MAX_SCORE: i32 = 100;

// ── Actions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustAction {
    HelpCompleted,
    HelpReceived,
    PositiveFeedback,
    ReferralSuccess,
    LongTermMember,
    NoShow,
    NegativeFeedback,
    ReportReceived,
    PaymentFailed,
    SuspiciousActivity,
    AccountCreated,
    PaymentMade,
    ProfileUpdated,
    LocationUpdated,
}

impl TrustAction {
    pub const ALL: [TrustAction; 14] = [
        Self::HelpCompleted,
        Self::HelpReceived,
        Self::PositiveFeedback,
        Self::ReferralSuccess,
        Self::LongTermMember,
        Self::NoShow,
        Self::NegativeFeedback,
        Self::ReportReceived,
        Self::PaymentFailed,
        Self::SuspiciousActivity,
        Self::AccountCreated,
        Self::PaymentMade,
        Self::ProfileUpdated,
        Self::LocationUpdated,
    ];

    /// Signed point value. For `AccountCreated` this is unused; see `adjustment`.
    pub fn points(&self) -> i32 {
        match self {
            Self::HelpCompleted      => 10,
            Self::HelpReceived       => 2,
            Self::PositiveFeedback   => 5,
            Self::ReferralSuccess    => 5,
            Self::LongTermMember     => 5,
            Self::NoShow             => -15,
            Self::NegativeFeedback   => -10,
            Self::ReportReceived     => -20,
            Self::PaymentFailed      => -5,
            Self::SuspiciousActivity => -25,
            Self::AccountCreated     => 0,
            Self::PaymentMade        => 2,
            Self::ProfileUpdated     => 1,
            Self::LocationUpdated    => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HelpCompleted      => "HELP_COMPLETED",
            Self::HelpReceived       => "HELP_RECEIVED",
            Self::PositiveFeedback   => "POSITIVE_FEEDBACK",
            Self::ReferralSuccess    => "REFERRAL_SUCCESS",
            Self::LongTermMember     => "LONG_TERM_MEMBER",
            Self::NoShow             => "NO_SHOW",
            Self::NegativeFeedback   => "NEGATIVE_FEEDBACK",
            Self::ReportReceived     => "REPORT_RECEIVED",
            Self::PaymentFailed      => "PAYMENT_FAILED",
            Self::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            Self::AccountCreated     => "ACCOUNT_CREATED",
            Self::PaymentMade        => "PAYMENT_MADE",
            Self::ProfileUpdated     => "PROFILE_UPDATED",
            Self::LocationUpdated    => "LOCATION_UPDATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == s)
    }
}

// ── Badges ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustBadge {
    Restricted,
    Neutral,
    Trusted,
}

impl TrustBadge {
    pub fn from_score(score: i32, config: &TrustConfig) -> Self {
        if score >= config.trusted_threshold {
            Self::Trusted
        } else if score >= config.neutral_threshold {
            Self::Neutral
        } else {
            Self::Restricted
        }
    }
}

pub fn can_perform_action(score: i32, required_min: i32) -> bool {
    score >= required_min
}

// ── Records ──────────────────────────────────────────────────────────────────

/// The subset of the user row this core reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub user_id:            UserId,
    pub trust_score:        i32,
    pub is_frozen:          bool,
    pub is_helper_verified: bool,
    pub last_latitude:      Option<f64>,
    pub last_longitude:     Option<f64>,
    pub last_location_at:   Option<Timestamp>,
    pub created_at:         Timestamp,
}

impl UserRecord {
    pub fn new(user_id: impl Into<UserId>, default_score: i32, created_at: Timestamp) -> Self {
        Self {
            user_id: user_id.into(),
            trust_score: default_score,
            is_frozen: false,
            is_helper_verified: false,
            last_latitude: None,
            last_longitude: None,
            last_location_at: None,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScoreEvent {
    pub event_id:   String,
    pub user_id:    UserId,
    pub action:     TrustAction,
    /// Delta actually applied after clamping.
    pub points:     i32,
    pub old_score:  i32,
    pub new_score:  i32,
    pub reason:     String,
    pub metadata:   serde_json::Value,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreChange {
    pub old_score: i32,
    pub new_score: i32,
    pub delta:     i32,
}

impl ScoreChange {
    pub fn new(old_score: i32, new_score: i32) -> Self {
        Self { old_score, new_score, delta: new_score - old_score }
    }
}

pub fn clamp_score(score: i32) -> i32 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

// ── Ledger ───────────────────────────────────────────────────────────────────

pub struct TrustScoreLedger<'a, S: RiskStore + ?Sized> {
    store:  &'a S,
    config: &'a TrustConfig,
}

impl<'a, S: RiskStore + ?Sized> TrustScoreLedger<'a, S> {
    pub fn new(store: &'a S, config: &'a TrustConfig) -> Self {
        Self { store, config }
    }

    /// Create the user at the neutral default and record `AccountCreated`.
    pub fn open_account(&self, user_id: &str, helper_verified: bool) -> RiskResult<UserRecord> {
        let now = Utc::now();
        let mut user = UserRecord::new(user_id, self.config.default_score, now);
        user.is_helper_verified = helper_verified;
        self.store.insert_user(&user)?;
        self.apply_at(user_id, TrustAction::AccountCreated, None, "Account created", None, now)?;
        self.store
            .get_user(user_id)?
            .ok_or_else(|| RiskError::user_not_found(user_id))
    }

    pub fn apply_action(
        &self,
        user_id:  &str,
        action:   TrustAction,
        reason:   &str,
        metadata: Option<serde_json::Value>,
    ) -> RiskResult<ScoreChange> {
        self.apply_at(user_id, action, None, reason, metadata, Utc::now())
    }

    /// Apply a caller-chosen magnitude, logged under `action`.
    pub fn apply_points(
        &self,
        user_id:  &str,
        action:   TrustAction,
        points:   i32,
        reason:   &str,
        metadata: Option<serde_json::Value>,
    ) -> RiskResult<ScoreChange> {
        self.apply_at(user_id, action, Some(points), reason, metadata, Utc::now())
    }

    pub(crate) fn apply_at(
        &self,
        user_id:  &str,
        action:   TrustAction,
        points:   Option<i32>,
        reason:   &str,
        metadata: Option<serde_json::Value>,
        at:       Timestamp,
    ) -> RiskResult<ScoreChange> {
        let user = self
            .store
            .get_user(user_id)?
            .ok_or_else(|| RiskError::user_not_found(user_id))?;

        let adjustment = match (action, points) {
            (TrustAction::AccountCreated, None) => TrustAdjustment::Reset(self.config.default_score),
            (_, Some(p)) => TrustAdjustment::Delta(p),
            (a, None) => TrustAdjustment::Delta(a.points()),
        };
        let adjustment = match adjustment {
            TrustAdjustment::Delta(d) if d > 0 && user.is_frozen => {
                log::debug!("user={user_id} frozen; {} gain of {d} withheld", action.as_str());
                TrustAdjustment::Delta(0)
            }
            other => other,
        };

        let change = self
            .store
            .adjust_trust_score(user_id, adjustment)?
            .ok_or_else(|| RiskError::user_not_found(user_id))?;

        let event = TrustScoreEvent {
            event_id:   uuid::Uuid::new_v4().to_string(),
            user_id:    user_id.to_string(),
            action,
            points:     change.delta,
            old_score:  change.old_score,
            new_score:  change.new_score,
            reason:     reason.to_string(),
            metadata:   metadata.unwrap_or(serde_json::Value::Null),
            created_at: at,
        };
        self.store.insert_trust_event(&event)?;

        if change.delta < 0 {
            log::info!(
                "user={user_id} trust {} -> {} ({:+}) {}: {reason}",
                change.old_score, change.new_score, change.delta, action.as_str()
            );
        } else {
            log::debug!(
                "user={user_id} trust {} -> {} ({:+}) {}",
                change.old_score, change.new_score, change.delta, action.as_str()
            );
        }
        Ok(change)
    }

    /// Freeze the account and record why in the activity log.
    pub fn freeze(&self, user_id: &str, reason: &str, at: Timestamp) -> RiskResult<()> {
        if self.store.get_user(user_id)?.is_none() {
            return Err(RiskError::user_not_found(user_id));
        }
        self.store.set_frozen(user_id, true)?;
        let entry = ActivityLogEntry::from_event(
            user_id,
            &RiskEvent::AccountFrozen { reason: reason.to_string() },
            at,
        )?;
        self.store.append_activity(&entry)?;
        log::warn!("user={user_id} account frozen: {reason}");
        Ok(())
    }

    pub fn unfreeze(&self, user_id: &str) -> RiskResult<()> {
        if self.store.get_user(user_id)?.is_none() {
            return Err(RiskError::user_not_found(user_id));
        }
        self.store.set_frozen(user_id, false)
    }

    pub fn score(&self, user_id: &str) -> RiskResult<i32> {
        self.store
            .get_user(user_id)?
            .map(|u| u.trust_score)
            .ok_or_else(|| RiskError::user_not_found(user_id))
    }

    pub fn badge(&self, user_id: &str) -> RiskResult<TrustBadge> {
        Ok(TrustBadge::from_score(self.score(user_id)?, self.config))
    }

    /// Most recent events first.
    pub fn history(&self, user_id: &str, limit: usize) -> RiskResult<Vec<TrustScoreEvent>> {
        self.store.trust_events(user_id, limit)
    }

    /// High-risk tasks need a verified helper with a Trusted badge on an active account.
    pub fn can_accept_high_risk_task(&self, user_id: &str) -> RiskResult<bool> {
        let user = self
            .store
            .get_user(user_id)?
            .ok_or_else(|| RiskError::user_not_found(user_id))?;
        Ok(user.is_helper_verified
            && !user.is_frozen
            && TrustBadge::from_score(user.trust_score, self.config) == TrustBadge::Trusted)
    }
}
