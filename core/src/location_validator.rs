//! Location Risk Evaluator.
//!
//! Scores a new GPS sample against the user's recent window:
//!   1. Cold start: no prior sample in the window is always Low.
//!   2. Travel speed above the general ceiling.
//!   3. Raw distance jump from the previous sample.
//!   4. Declared accuracy too poor, or unrealistically perfect.
//!   5. Window consistency: repeated large jumps, exact-coordinate repetition.
//!   6. Teleportation: instant jumps and speeds beyond commercial aviation.
//!   7. Client-declared mock provider (recorded, never counted toward High).
//!
//! `submit` wraps the pure evaluation with the foreground policy, history
//! persistence, and trust penalties. Any history-fetch failure fails open.

use crate::{
    config::LocationConfig,
    error::{RiskError, RiskResult},
    event::{ActivityLogEntry, RiskEvent},
    geo::{haversine_km, is_valid_coordinate},
    store::RiskStore,
    trust_score::{TrustAction, TrustScoreLedger},
    types::{RiskLevel, Timestamp, UserId},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

// ── Data Structures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationSample {
    pub user_id:            UserId,
    pub latitude:           f64,
    pub longitude:          f64,
    pub accuracy_m:         Option<f64>,
    pub timestamp:          Timestamp,
    pub is_foreground:      bool,
    /// Client-supplied and attacker-controllable.
    pub mock_location_flag: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationSettings {
    pub user_id:         UserId,
    pub foreground_only: bool,
    pub sharing_enabled: bool,
}

impl LocationSettings {
    pub fn defaults_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            foreground_only: false,
            sharing_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestedAction {
    Allow,
    Warn,
    Block,
}

impl From<RiskLevel> for SuggestedAction {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low    => Self::Allow,
            RiskLevel::Medium => Self::Warn,
            RiskLevel::High   => Self::Block,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationAssessment {
    pub is_valid:         bool,
    pub risk_level:       RiskLevel,
    pub reasons:          Vec<String>,
    pub suggested_action: SuggestedAction,
    pub speed_kmh:        Option<f64>,
    pub distance_km:      Option<f64>,
}

impl LocationAssessment {
    fn low(reasons: Vec<String>) -> Self {
        Self {
            is_valid: true,
            risk_level: RiskLevel::Low,
            reasons,
            suggested_action: SuggestedAction::Allow,
            speed_kmh: None,
            distance_km: None,
        }
    }

    fn fail_open(err: &RiskError) -> Self {
        Self::low(vec![format!("Location validation error: {err}")])
    }
}

/// Result of `submit`. A policy denial is not a risk finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LocationOutcome {
    Evaluated {
        assessment: LocationAssessment,
        committed:  bool,
    },
    PolicyDenied {
        reason:          String,
        penalty_applied: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Physical,
    Client,
}

struct Finding {
    reason: String,
    source: Source,
    floor:  RiskLevel,
}

impl Finding {
    fn physical(reason: String) -> Self {
        Self { reason, source: Source::Physical, floor: RiskLevel::Low }
    }

    fn signature(reason: String) -> Self {
        Self { reason, source: Source::Physical, floor: RiskLevel::Medium }
    }

    fn client(reason: String) -> Self {
        Self { reason, source: Source::Client, floor: RiskLevel::Low }
    }
}

fn describe_speed(speed_kmh: f64) -> String {
    if speed_kmh.is_finite() {
        format!("{speed_kmh:.1} km/h")
    } else {
        "unbounded km/h (no elapsed time)".to_string()
    }
}

fn same_coordinates(a: &LocationSample, b: &LocationSample) -> bool {
    a.latitude.to_bits() == b.latitude.to_bits() && a.longitude.to_bits() == b.longitude.to_bits()
}

pub fn validate_sample(sample: &LocationSample) -> RiskResult<()> {
    if !is_valid_coordinate(sample.latitude, sample.longitude) {
        return Err(RiskError::Validation(format!(
            "coordinates out of range: ({}, {})",
            sample.latitude, sample.longitude
        )));
    }
    if let Some(acc) = sample.accuracy_m {
        if !acc.is_finite() || acc < 0.0 {
            return Err(RiskError::Validation(format!("invalid accuracy: {acc}")));
        }
    }
    Ok(())
}

// ── Evaluator ────────────────────────────────────────────────────────────────

pub struct LocationRiskEvaluator<'a, S: RiskStore + ?Sized> {
    store:  &'a S,
    config: &'a LocationConfig,
    ledger: TrustScoreLedger<'a, S>,
}

impl<'a, S: RiskStore + ?Sized> LocationRiskEvaluator<'a, S> {
    pub fn new(store: &'a S, config: &'a LocationConfig, ledger: TrustScoreLedger<'a, S>) -> Self {
        Self { store, config, ledger }
    }

    /// Pure scoring of `sample` against `recent` (any order, any user history).
    /// Fails only on malformed input.
    pub fn evaluate(
        &self,
        sample: &LocationSample,
        recent: &[LocationSample],
    ) -> RiskResult<LocationAssessment> {
        validate_sample(sample)?;
        let cfg = self.config;

        let window_start = sample.timestamp - Duration::minutes(cfg.window_minutes);
        let mut window: Vec<&LocationSample> = recent
            .iter()
            .filter(|s| s.timestamp <= sample.timestamp && s.timestamp >= window_start)
            .collect();
        window.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        window.truncate(cfg.window_samples);

        let Some(last) = window.first().copied() else {
            return Ok(LocationAssessment::low(Vec::new()));
        };

        let mut findings = Vec::new();

        let distance_km = haversine_km(last.latitude, last.longitude, sample.latitude, sample.longitude);
        let elapsed_secs = (sample.timestamp - last.timestamp).num_milliseconds() as f64 / 1000.0;
        // Any displacement with no elapsed time is an unbounded speed.
        let speed_kmh = if elapsed_secs > 0.0 {
            Some(distance_km / (elapsed_secs / 3600.0))
        } else if distance_km > 0.0 {
            Some(f64::INFINITY)
        } else {
            None
        };

        if let Some(speed) = speed_kmh {
            if speed > cfg.max_speed_kmh {
                findings.push(Finding::physical(format!(
                    "Unrealistic travel speed: {} over {:.1} minutes",
                    describe_speed(speed),
                    elapsed_secs / 60.0
                )));
            }
        }

        if distance_km > cfg.max_distance_jump_km {
            findings.push(Finding::physical(format!(
                "Location jumped {distance_km:.1} km from the previous sample (limit {:.0} km)",
                cfg.max_distance_jump_km
            )));
        }

        if let Some(acc) = sample.accuracy_m {
            if acc > cfg.max_accuracy_m {
                findings.push(Finding::physical(format!("Low GPS accuracy: {acc:.0} m")));
            } else if acc < cfg.min_accuracy_m {
                findings.push(Finding::physical(format!(
                    "Unrealistically precise accuracy: {acc:.2} m"
                )));
            }
        }

        let large_jumps = window
            .iter()
            .filter(|s| haversine_km(s.latitude, s.longitude, sample.latitude, sample.longitude) > cfg.large_jump_km)
            .count();
        if large_jumps > cfg.max_large_jumps {
            findings.push(Finding::physical(format!(
                "Multiple large location jumps in the last {} minutes ({large_jumps})",
                cfg.window_minutes
            )));
        }

        let repeats = window.iter().filter(|s| same_coordinates(s, sample)).count();
        if repeats > cfg.max_exact_repeats {
            findings.push(Finding::signature(format!(
                "Suspicious exact coordinate repetition ({repeats} identical samples)"
            )));
        }

        if elapsed_secs < cfg.instant_jump_secs && distance_km * 1000.0 > cfg.instant_jump_m {
            findings.push(Finding::signature(format!(
                "Instant location jump: {:.0} m in {elapsed_secs:.2} s",
                distance_km * 1000.0
            )));
        }

        if let Some(speed) = speed_kmh {
            if speed > cfg.impossible_speed_kmh {
                findings.push(Finding::physical(format!(
                    "Impossible speed detected: {} is faster than commercial aviation",
                    describe_speed(speed)
                )));
            }
        }

        if sample.mock_location_flag == Some(true) {
            findings.push(Finding::client("Client reported a mock location provider".to_string()));
        }

        let risk_level = self.combine(&findings, speed_kmh, distance_km);
        Ok(LocationAssessment {
            is_valid: risk_level != RiskLevel::High,
            risk_level,
            reasons: findings.into_iter().map(|f| f.reason).collect(),
            suggested_action: risk_level.into(),
            speed_kmh,
            distance_km: Some(distance_km),
        })
    }

    fn combine(&self, findings: &[Finding], speed_kmh: Option<f64>, distance_km: f64) -> RiskLevel {
        if findings.is_empty() {
            return RiskLevel::Low;
        }
        let cfg = self.config;
        let speed = speed_kmh.unwrap_or(0.0);
        let physical = findings.iter().filter(|f| f.source == Source::Physical).count();

        let level = if speed > 2.0 * cfg.max_speed_kmh
            || distance_km > cfg.extreme_distance_km
            || physical > 2
        {
            RiskLevel::High
        } else if findings.len() > 1 || speed > cfg.max_speed_kmh {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        findings.iter().map(|f| f.floor).fold(level, RiskLevel::max)
    }

    /// Evaluate and commit a sample with all side effects.
    pub fn submit(&self, sample: &LocationSample) -> RiskResult<LocationOutcome> {
        validate_sample(sample)?;
        let user_id = sample.user_id.as_str();

        match self.store.get_user(user_id) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(RiskError::user_not_found(user_id)),
            Err(e) => log::warn!("user={user_id} lookup failed, evaluating anyway: {e}"),
        }

        let settings = match self.store.location_settings(user_id) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("user={user_id} location settings unavailable, using defaults: {e}");
                LocationSettings::defaults_for(user_id)
            }
        };

        if !settings.sharing_enabled {
            let reason = "Location sharing is disabled".to_string();
            self.record(user_id, &RiskEvent::LocationPolicyDenied { reason: reason.clone() }, sample.timestamp);
            return Ok(LocationOutcome::PolicyDenied { reason, penalty_applied: false });
        }

        if settings.foreground_only && !sample.is_foreground {
            let reason = "Background location update not allowed by privacy settings".to_string();
            let penalty_applied = self.penalize(user_id, &reason, sample.timestamp);
            self.record(user_id, &RiskEvent::LocationPolicyDenied { reason: reason.clone() }, sample.timestamp);
            return Ok(LocationOutcome::PolicyDenied { reason, penalty_applied });
        }

        let since = sample.timestamp - Duration::minutes(self.config.window_minutes);
        let history = self.store.recent_location_samples(
            user_id,
            since,
            sample.timestamp,
            self.config.window_samples,
        );
        let assessment = match history {
            Ok(recent) => self.evaluate(sample, &recent)?,
            Err(e) => {
                log::warn!("user={user_id} location history fetch failed, failing open: {e}");
                self.record(
                    user_id,
                    &RiskEvent::LocationValidationError { error: e.to_string() },
                    sample.timestamp,
                );
                LocationAssessment::fail_open(&e)
            }
        };

        let high = assessment.risk_level == RiskLevel::High;
        let committed = !(high && self.config.withhold_high_risk_samples);
        if committed {
            if let Err(e) = self.commit(sample, assessment.risk_level) {
                log::warn!("user={user_id} failed to persist location sample: {e}");
            }
        }

        if high {
            let reason = format!("Location spoofing suspected: {}", assessment.reasons.join("; "));
            self.penalize(user_id, &reason, sample.timestamp);
            if self.config.freeze_on_high_risk {
                if let Err(e) = self.ledger.freeze(user_id, &reason, sample.timestamp) {
                    log::warn!("user={user_id} failed to freeze after high-risk location: {e}");
                }
            }
            log::warn!("user={user_id} high-risk location: {}", assessment.reasons.join("; "));
        }

        if !assessment.reasons.is_empty() {
            self.record(
                user_id,
                &RiskEvent::LocationFlagged {
                    risk_level: assessment.risk_level,
                    latitude:   sample.latitude,
                    longitude:  sample.longitude,
                    reasons:    assessment.reasons.clone(),
                    committed,
                },
                sample.timestamp,
            );
        }

        Ok(LocationOutcome::Evaluated { assessment, committed })
    }

    pub fn settings(&self, user_id: &str) -> RiskResult<LocationSettings> {
        self.store.location_settings(user_id)
    }

    pub fn update_settings(&self, settings: &LocationSettings) -> RiskResult<()> {
        if self.store.get_user(&settings.user_id)?.is_none() {
            return Err(RiskError::user_not_found(&settings.user_id));
        }
        self.store.save_location_settings(settings)
    }

    fn commit(&self, sample: &LocationSample, risk_level: RiskLevel) -> RiskResult<()> {
        self.store.insert_location_sample(sample, risk_level)?;
        self.store
            .update_user_location(&sample.user_id, sample.latitude, sample.longitude, sample.timestamp)
    }

    fn penalize(&self, user_id: &str, reason: &str, at: Timestamp) -> bool {
        match self.ledger.apply_at(user_id, TrustAction::SuspiciousActivity, None, reason, None, at) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("user={user_id} trust penalty failed: {e}");
                false
            }
        }
    }

    fn record(&self, user_id: &str, event: &RiskEvent, at: Timestamp) {
        let result = ActivityLogEntry::from_event(user_id, event, at)
            .map_err(RiskError::from)
            .and_then(|entry| self.store.append_activity(&entry));
        if let Err(e) = result {
            log::warn!("user={user_id} failed to append location audit entry: {e}");
        }
    }
}
