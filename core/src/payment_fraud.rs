//! Payment Risk Evaluator.
//!
//! Additive scoring over independent checks:
//!   1. History shape (first payment, rejections, volume, repeated amounts)
//!   2. Amount anomaly (non-standard price, large round numbers)
//!   3. Timing anomaly (attempt velocity, outside normal hours)
//!   4. Network churn (distinct IPs, private/VPN-like ranges)
//!   5. Account state (frozen, low trust, bulk attempts from one IP)
//!
//! Any failure during analysis falls back to manual review with
//! confidence 50; it never approves and never blocks on an internal error.

use crate::{
    config::PaymentConfig,
    error::{RiskError, RiskResult},
    event::{ActivityLogEntry, RiskEvent},
    store::RiskStore,
    trust_score::{ScoreChange, TrustAction, TrustScoreLedger, UserRecord},
    types::{RiskLevel, Timestamp, UserId},
};
use chrono::{Duration, Timelike};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

const FALLBACK_CONFIDENCE: i32 = 50;

// ── Data Structures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Upi,
    Card,
    NetBanking,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upi        => "upi",
            Self::Card       => "card",
            Self::NetBanking => "net_banking",
            Self::Wallet     => "wallet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upi"         => Some(Self::Upi),
            "card"        => Some(Self::Card),
            "net_banking" => Some(Self::NetBanking),
            "wallet"      => Some(Self::Wallet),
            _             => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending   => "pending",
            Self::Completed => "completed",
            Self::Rejected  => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending"   => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "rejected"  => Some(Self::Rejected),
            _           => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAttempt {
    pub user_id:            UserId,
    pub amount:             f64,
    pub payment_method:     PaymentMethod,
    pub ip_address:         String,
    pub device_fingerprint: Option<String>,
    pub timestamp:          Timestamp,
}

/// A settled or rejected payment in the user's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub user_id:    UserId,
    pub amount:     f64,
    pub status:     PaymentStatus,
    pub ip_address: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Approve,
    ManualReview,
    Reject,
    BlockUser,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve      => "APPROVE",
            Self::ManualReview => "MANUAL_REVIEW",
            Self::Reject       => "REJECT",
            Self::BlockUser    => "BLOCK_USER",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAssessment {
    pub is_fraudulent:      bool,
    pub risk_level:         RiskLevel,
    pub reasons:            Vec<String>,
    pub recommended_action: RecommendedAction,
    /// Raw total clamped to [0, 100].
    pub confidence:         i32,
    /// Raw additive total, may be negative.
    pub risk_score:         i32,
}

impl PaymentAssessment {
    fn manual_review(err: &RiskError) -> Self {
        Self {
            is_fraudulent: false,
            risk_level: RiskLevel::Medium,
            reasons: vec![format!("Risk analysis failed: {err}")],
            recommended_action: RecommendedAction::ManualReview,
            confidence: FALLBACK_CONFIDENCE,
            risk_score: FALLBACK_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentProcessing {
    pub attempt_id:   String,
    pub user_frozen:  bool,
    pub score_change: Option<ScoreChange>,
}

#[derive(Default)]
struct Scorecard {
    total:    i32,
    reasons:  Vec<String>,
    /// Set by signals that justify blocking the account, not just the payment.
    blocking: bool,
}

impl Scorecard {
    fn add(&mut self, points: i32, reason: String) {
        self.total += points;
        self.reasons.push(reason);
    }
}

pub fn validate_attempt(attempt: &PaymentAttempt) -> RiskResult<()> {
    if !attempt.amount.is_finite() || attempt.amount <= 0.0 {
        return Err(RiskError::Validation(format!("invalid payment amount: {}", attempt.amount)));
    }
    Ok(())
}

/// Private, loopback, link-local, CGNAT and configured prefixes.
pub fn is_suspicious_ip(ip: &str, extra_prefixes: &[String]) -> bool {
    if extra_prefixes.iter().any(|p| !p.is_empty() && ip.starts_with(p.as_str())) {
        return true;
    }
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let o = v4.octets();
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || (o[0] == 100 && (o[1] & 0xC0) == 64)
        }
        Ok(IpAddr::V6(v6)) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
        Err(_) => false,
    }
}

// ── Evaluator ────────────────────────────────────────────────────────────────

pub struct PaymentRiskEvaluator<'a, S: RiskStore + ?Sized> {
    store:  &'a S,
    config: &'a PaymentConfig,
    ledger: TrustScoreLedger<'a, S>,
}

impl<'a, S: RiskStore + ?Sized> PaymentRiskEvaluator<'a, S> {
    pub fn new(store: &'a S, config: &'a PaymentConfig, ledger: TrustScoreLedger<'a, S>) -> Self {
        Self { store, config, ledger }
    }

    pub fn evaluate(&self, attempt: &PaymentAttempt) -> RiskResult<PaymentAssessment> {
        validate_attempt(attempt)?;
        let user_id = attempt.user_id.as_str();

        let user = match self.store.get_user(user_id) {
            Ok(Some(u)) => u,
            Ok(None) => return Err(RiskError::user_not_found(user_id)),
            Err(e) => {
                log::warn!("user={user_id} payment screening fell back to review: {e}");
                return Ok(PaymentAssessment::manual_review(&e));
            }
        };

        match self.analyze(attempt, &user) {
            Ok(assessment) => {
                log::debug!(
                    "user={user_id} payment {:.2} scored {} ({})",
                    attempt.amount, assessment.risk_score, assessment.risk_level
                );
                Ok(assessment)
            }
            Err(e) => {
                log::warn!("user={user_id} payment screening fell back to review: {e}");
                Ok(PaymentAssessment::manual_review(&e))
            }
        }
    }

    fn analyze(&self, attempt: &PaymentAttempt, user: &UserRecord) -> RiskResult<PaymentAssessment> {
        let mut card = Scorecard::default();

        self.check_history(attempt, user, &mut card)?;
        self.check_amount(attempt, &mut card);
        self.check_timing(attempt, &mut card)?;
        self.check_network(attempt, &mut card)?;
        self.check_account(attempt, user, &mut card)?;

        let cfg = self.config;
        let risk_level = if card.total >= cfg.high_risk_threshold {
            RiskLevel::High
        } else if card.total >= cfg.medium_risk_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let recommended_action = match risk_level {
            RiskLevel::High if card.blocking => RecommendedAction::BlockUser,
            RiskLevel::High                  => RecommendedAction::Reject,
            RiskLevel::Medium                => RecommendedAction::ManualReview,
            RiskLevel::Low                   => RecommendedAction::Approve,
        };

        Ok(PaymentAssessment {
            is_fraudulent: risk_level == RiskLevel::High,
            risk_level,
            reasons: card.reasons,
            recommended_action,
            confidence: card.total.clamp(0, 100),
            risk_score: card.total,
        })
    }

    fn check_history(
        &self,
        attempt: &PaymentAttempt,
        user: &UserRecord,
        card: &mut Scorecard,
    ) -> RiskResult<()> {
        let cfg = self.config;
        let since = attempt.timestamp - Duration::days(cfg.history_days);
        let history = self.store.recent_payments(&attempt.user_id, since, cfg.history_limit)?;

        if history.is_empty() {
            // A frozen account earns no first-payment credit.
            if !user.is_frozen {
                card.add(-5, "First payment from this user".to_string());
            }
            return Ok(());
        }

        let rejected = history.iter().filter(|p| p.status == PaymentStatus::Rejected).count();
        if rejected > 0 {
            card.add(10 * rejected as i32, format!("{rejected} previous rejected payment(s)"));
        }

        if history.len() >= cfg.max_recent_payments {
            card.add(15, format!(
                "Multiple payments in short period: {} in the last {} days",
                history.len(), cfg.history_days
            ));
        }

        let same_amount = history
            .iter()
            .filter(|p| (p.amount - attempt.amount).abs() < 0.005)
            .count();
        if same_amount >= cfg.max_same_amount {
            card.add(10, format!("Repeated exact amount {:.2} ({same_amount} prior payments)", attempt.amount));
        }
        Ok(())
    }

    fn check_amount(&self, attempt: &PaymentAttempt, card: &mut Scorecard) {
        let cfg = self.config;
        if (attempt.amount - cfg.expected_amount).abs() >= 0.005 {
            card.add(20, format!(
                "Unexpected amount {:.2} (standard price is {:.2})",
                attempt.amount, cfg.expected_amount
            ));
        }
        if attempt.amount >= cfg.round_amount_threshold
            && attempt.amount.fract() == 0.0
            && (attempt.amount as i64) % 100 == 0
        {
            card.add(5, format!("Large round-number amount {:.0}", attempt.amount));
        }
    }

    fn check_timing(&self, attempt: &PaymentAttempt, card: &mut Scorecard) -> RiskResult<()> {
        let cfg = self.config;
        let prior = self
            .store
            .count_payment_attempts(&attempt.user_id, attempt.timestamp - Duration::hours(24))?;
        let attempts_today = prior + 1;
        if attempts_today > cfg.max_attempts_per_day {
            card.add(15, format!("{attempts_today} payment attempts in the last 24 hours"));
        }

        let local = attempt.timestamp + Duration::minutes(cfg.local_utc_offset_minutes as i64);
        let hour = local.hour();
        if hour < cfg.normal_hours_start || hour >= cfg.normal_hours_end {
            card.add(5, format!("Payment attempted outside normal hours ({hour:02}:00)"));
        }
        Ok(())
    }

    fn check_network(&self, attempt: &PaymentAttempt, card: &mut Scorecard) -> RiskResult<()> {
        let cfg = self.config;
        let mut ips = self
            .store
            .distinct_payment_ips(&attempt.user_id, attempt.timestamp - Duration::days(7))?;
        if !ips.iter().any(|ip| ip == &attempt.ip_address) {
            ips.push(attempt.ip_address.clone());
        }
        if ips.len() as i64 > cfg.max_distinct_ips_week {
            card.add(10, format!("{} distinct IP addresses in the last 7 days", ips.len()));
        }

        if is_suspicious_ip(&attempt.ip_address, &cfg.suspicious_ip_prefixes) {
            card.add(15, format!("Suspicious IP address range: {}", attempt.ip_address));
        }
        Ok(())
    }

    fn check_account(
        &self,
        attempt: &PaymentAttempt,
        user: &UserRecord,
        card: &mut Scorecard,
    ) -> RiskResult<()> {
        let cfg = self.config;
        if user.is_frozen {
            card.add(50, "Account is frozen".to_string());
            card.blocking = true;
        }
        if user.trust_score < cfg.low_trust_threshold {
            card.add(20, format!("Low trust score: {}", user.trust_score));
        }

        let from_ip = self
            .store
            .count_ip_payment_attempts(&attempt.ip_address, attempt.timestamp - Duration::hours(1))?
            + 1;
        if from_ip > cfg.max_attempts_per_ip_hour {
            card.add(25, format!(
                "Suspicious bulk activity: {from_ip} attempts from {} in the last hour",
                attempt.ip_address
            ));
            card.blocking = true;
        }
        Ok(())
    }

    /// Persist the attempt and apply the account-level consequences.
    pub fn process_result(
        &self,
        attempt:    &PaymentAttempt,
        assessment: &PaymentAssessment,
    ) -> RiskResult<PaymentProcessing> {
        let user_id = attempt.user_id.as_str();
        let attempt_id = uuid::Uuid::new_v4().to_string();
        self.store.insert_payment_attempt(&attempt_id, attempt, assessment)?;

        let mut user_frozen = false;
        let mut score_change = None;
        let reason = format!("Payment flagged: {}", assessment.reasons.join("; "));
        let metadata = serde_json::json!({
            "attempt_id": attempt_id,
            "risk_score": assessment.risk_score,
            "recommended_action": assessment.recommended_action.as_str(),
        });

        if assessment.recommended_action == RecommendedAction::BlockUser {
            self.ledger.freeze(user_id, &reason, attempt.timestamp)?;
            user_frozen = true;
            score_change = Some(self.ledger.apply_at(
                user_id,
                TrustAction::SuspiciousActivity,
                None,
                &reason,
                Some(metadata),
                attempt.timestamp,
            )?);
        } else if assessment.risk_level == RiskLevel::High {
            score_change = Some(self.ledger.apply_at(
                user_id,
                TrustAction::SuspiciousActivity,
                Some(-self.config.high_risk_penalty),
                &reason,
                Some(metadata),
                attempt.timestamp,
            )?);
        }

        let event = RiskEvent::PaymentScreened {
            attempt_id: attempt_id.clone(),
            amount: attempt.amount,
            risk_level: assessment.risk_level,
            recommended_action: assessment.recommended_action.as_str().to_string(),
            confidence: assessment.confidence,
            reasons: assessment.reasons.clone(),
        };
        self.store
            .append_activity(&ActivityLogEntry::from_event(user_id, &event, attempt.timestamp)?)?;

        Ok(PaymentProcessing { attempt_id, user_frozen, score_change })
    }

    /// Record a settled or rejected payment so later screenings see it.
    pub fn record_payment(&self, record: &PaymentRecord) -> RiskResult<()> {
        if !record.amount.is_finite() || record.amount <= 0.0 {
            return Err(RiskError::Validation(format!("invalid payment amount: {}", record.amount)));
        }
        if self.store.get_user(&record.user_id)?.is_none() {
            return Err(RiskError::user_not_found(&record.user_id));
        }
        self.store.insert_payment(record)
    }
}
