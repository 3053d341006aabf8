//! Device Trust Tracker.
//!
//! Fingerprints a browser/device from its declared characteristics, tracks
//! devices per user, and feeds new or suspicious devices into the trust
//! ledger. Declared characteristics are client-supplied; a fingerprint
//! recognises a returning device, it does not authenticate one.

use crate::{
    config::DeviceConfig,
    error::{RiskError, RiskResult},
    event::{ActivityLogEntry, RiskEvent},
    store::RiskStore,
    trust_score::{ScoreChange, TrustAction, TrustScoreLedger},
    types::{RiskLevel, Timestamp, UserId},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ── Data Structures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceCharacteristics {
    pub user_agent:         String,
    pub screen_resolution:  String,
    pub timezone:           String,
    pub language:           String,
    pub platform:           String,
    pub cookies_enabled:    bool,
    pub do_not_track:       bool,
    pub touch_support:      bool,
    pub canvas_fingerprint: Option<String>,
    pub webgl_fingerprint:  Option<String>,
    #[serde(default)]
    pub plugins:            Vec<String>,
}

impl DeviceCharacteristics {
    /// Canonical form hashed by `fingerprint`. Every field is length-prefixed,
    /// absent optionals are `-` (distinct from an empty `0:`), plugins are sorted.
    pub fn canonical(&self) -> String {
        let mut plugins: Vec<&str> = self.plugins.iter().map(String::as_str).collect();
        plugins.sort_unstable();

        let mut out = String::new();
        for field in [
            self.user_agent.as_str(),
            self.screen_resolution.as_str(),
            self.timezone.as_str(),
            self.language.as_str(),
            self.platform.as_str(),
            bool_flag(self.cookies_enabled),
            bool_flag(self.do_not_track),
            bool_flag(self.touch_support),
        ] {
            push_field(&mut out, Some(field));
        }
        push_field(&mut out, self.canvas_fingerprint.as_deref());
        push_field(&mut out, self.webgl_fingerprint.as_deref());

        out.push_str(&format!("{}#", plugins.len()));
        for plugin in plugins {
            push_field(&mut out, Some(plugin));
        }
        out
    }
}

fn push_field(out: &mut String, field: Option<&str>) {
    match field {
        Some(value) => {
            out.push_str(&format!("{}:", value.len()));
            out.push_str(value);
        }
        None => out.push('-'),
    }
}

fn bool_flag(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

/// Deterministic SHA-256 hex digest of the canonical characteristics.
pub fn fingerprint(characteristics: &DeviceCharacteristics) -> String {
    hex::encode(Sha256::digest(characteristics.canonical().as_bytes()))
}

/// One observation of a device: what it declared, from where, and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSighting {
    pub characteristics: DeviceCharacteristics,
    pub ip_address:      Option<String>,
    pub seen_at:         Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    pub device_id:       String,
    pub user_id:         UserId,
    pub fingerprint:     String,
    pub characteristics: DeviceCharacteristics,
    pub last_ip:         Option<String>,
    pub first_seen:      Timestamp,
    pub last_seen:       Timestamp,
    pub risk_level:      RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRegistration {
    pub is_new_device: bool,
    pub risk_level:    RiskLevel,
    pub score_change:  Option<ScoreChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuspicionReport {
    pub is_suspicious: bool,
    pub reasons:       Vec<String>,
    pub risk_level:    RiskLevel,
}

fn first_octet(ip: &str) -> Option<&str> {
    ip.split('.').next().filter(|s| !s.is_empty())
}

// ── Tracker ──────────────────────────────────────────────────────────────────

pub struct DeviceTrustTracker<'a, S: RiskStore + ?Sized> {
    store:  &'a S,
    config: &'a DeviceConfig,
    ledger: TrustScoreLedger<'a, S>,
}

impl<'a, S: RiskStore + ?Sized> DeviceTrustTracker<'a, S> {
    pub fn new(store: &'a S, config: &'a DeviceConfig, ledger: TrustScoreLedger<'a, S>) -> Self {
        Self { store, config, ledger }
    }

    pub fn fingerprint(&self, characteristics: &DeviceCharacteristics) -> String {
        fingerprint(characteristics)
    }

    /// Risk tier for a new device given how many the user already has.
    fn new_device_risk(&self, existing: i64) -> RiskLevel {
        if existing >= self.config.max_devices_per_user {
            RiskLevel::High
        } else if existing >= self.config.medium_device_count {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn register_or_touch(
        &self,
        user_id:     &str,
        fingerprint: &str,
        sighting:    &DeviceSighting,
    ) -> RiskResult<DeviceRegistration> {
        if self.store.get_user(user_id)?.is_none() {
            return Err(RiskError::user_not_found(user_id));
        }

        if let Some(device) = self.store.get_device(user_id, fingerprint)? {
            self.store
                .touch_device(user_id, fingerprint, sighting.seen_at, sighting.ip_address.as_deref())?;

            let mut score_change = None;
            if device.risk_level == RiskLevel::Low {
                score_change = self.adjust(
                    user_id,
                    TrustAction::LongTermMember,
                    self.config.returning_device_bonus,
                    "Returning trusted device",
                    serde_json::json!({ "fingerprint": fingerprint }),
                    sighting.seen_at,
                );
            }
            return Ok(DeviceRegistration {
                is_new_device: false,
                risk_level: device.risk_level,
                score_change,
            });
        }

        let existing = self.store.count_devices(user_id)?;
        let risk_level = self.new_device_risk(existing);

        self.store.insert_device(&DeviceRecord {
            device_id:       uuid::Uuid::new_v4().to_string(),
            user_id:         user_id.to_string(),
            fingerprint:     fingerprint.to_string(),
            characteristics: sighting.characteristics.clone(),
            last_ip:         sighting.ip_address.clone(),
            first_seen:      sighting.seen_at,
            last_seen:       sighting.seen_at,
            risk_level,
        })?;

        // Every tier is logged as SUSPICIOUS_ACTIVITY; the tier travels in metadata.
        let (tier, penalty) = match risk_level {
            RiskLevel::Low    => ("new_device", self.config.new_device_penalty),
            RiskLevel::Medium => ("suspicious_device", self.config.suspicious_device_penalty),
            RiskLevel::High   => ("high_risk_device", self.config.high_risk_device_penalty),
        };
        let score_change = self.adjust(
            user_id,
            TrustAction::SuspiciousActivity,
            -penalty,
            &format!("New device registered ({existing} existing)"),
            serde_json::json!({ "fingerprint": fingerprint, "tier": tier }),
            sighting.seen_at,
        );

        self.record(
            user_id,
            &RiskEvent::DeviceRegistered {
                fingerprint: fingerprint.to_string(),
                risk_level,
                existing_devices: existing,
            },
            sighting.seen_at,
        );
        if risk_level != RiskLevel::Low {
            log::warn!("user={user_id} new {tier} ({existing} devices already registered)");
        }

        Ok(DeviceRegistration { is_new_device: true, risk_level, score_change })
    }

    pub fn check_suspicion(
        &self,
        user_id:     &str,
        fingerprint: &str,
        sighting:    &DeviceSighting,
    ) -> RiskResult<SuspicionReport> {
        let Some(device) = self.store.get_device(user_id, fingerprint)? else {
            let report = SuspicionReport {
                is_suspicious: true,
                reasons: vec!["Unknown device".to_string()],
                risk_level: RiskLevel::High,
            };
            self.record_suspicion(user_id, fingerprint, &report, sighting.seen_at);
            return Ok(report);
        };

        let mut reasons = Vec::new();
        let mut level = RiskLevel::Low;

        if let (Some(stored), Some(current)) = (device.last_ip.as_deref(), sighting.ip_address.as_deref()) {
            if first_octet(stored) != first_octet(current) {
                reasons.push(format!("Suspicious IP change: {stored} -> {current}"));
                level = level.max(RiskLevel::Medium);
            }
        }

        if device.characteristics.timezone != sighting.characteristics.timezone {
            reasons.push(format!(
                "Timezone changed: {} -> {}",
                device.characteristics.timezone, sighting.characteristics.timezone
            ));
            level = level.max(RiskLevel::Medium);
        }

        let idle = sighting.seen_at - device.last_seen;
        if idle > Duration::days(self.config.stale_device_days) {
            reasons.push(format!("Device unused for {} days", idle.num_days()));
            level = level.max(RiskLevel::Medium);
        }

        let total = self.store.count_devices(user_id)?;
        if total > self.config.max_devices_per_user {
            reasons.push(format!("Too many devices registered: {total}"));
            level = RiskLevel::High;
        }

        let report = SuspicionReport {
            is_suspicious: level != RiskLevel::Low,
            reasons,
            risk_level: level,
        };
        if report.is_suspicious {
            self.record_suspicion(user_id, fingerprint, &report, sighting.seen_at);
        }
        Ok(report)
    }

    pub fn devices(&self, user_id: &str) -> RiskResult<Vec<DeviceRecord>> {
        self.store.list_devices(user_id)
    }

    /// Remove a device the user no longer recognises. Returns false if unknown.
    pub fn forget_device(&self, user_id: &str, fingerprint: &str) -> RiskResult<bool> {
        self.store.remove_device(user_id, fingerprint)
    }

    fn adjust(
        &self,
        user_id:  &str,
        action:   TrustAction,
        points:   i32,
        reason:   &str,
        metadata: serde_json::Value,
        at:       Timestamp,
    ) -> Option<ScoreChange> {
        match self.ledger.apply_at(user_id, action, Some(points), reason, Some(metadata), at) {
            Ok(change) => Some(change),
            Err(e) => {
                log::warn!("user={user_id} device trust adjustment failed: {e}");
                None
            }
        }
    }

    fn record_suspicion(&self, user_id: &str, fingerprint: &str, report: &SuspicionReport, at: Timestamp) {
        self.record(
            user_id,
            &RiskEvent::DeviceSuspicious {
                fingerprint: fingerprint.to_string(),
                risk_level: report.risk_level,
                reasons: report.reasons.clone(),
            },
            at,
        );
    }

    fn record(&self, user_id: &str, event: &RiskEvent, at: Timestamp) {
        let result = ActivityLogEntry::from_event(user_id, event, at)
            .map_err(RiskError::from)
            .and_then(|entry| self.store.append_activity(&entry));
        if let Err(e) = result {
            log::warn!("user={user_id} failed to append device audit entry: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chrome() -> DeviceCharacteristics {
        DeviceCharacteristics {
            user_agent: "Mozilla/5.0 (Linux; Android 14) Chrome/126.0".into(),
            screen_resolution: "1080x2400".into(),
            timezone: "Asia/Kolkata".into(),
            language: "en-IN".into(),
            platform: "Linux armv8l".into(),
            cookies_enabled: true,
            do_not_track: false,
            touch_support: true,
            canvas_fingerprint: Some("c4nv45".into()),
            webgl_fingerprint: None,
            plugins: vec!["pdf".into(), "cast".into()],
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint(&chrome()), fingerprint(&chrome()));
        assert_eq!(fingerprint(&chrome()).len(), 64);
    }

    #[test]
    fn plugin_order_does_not_matter() {
        let mut reordered = chrome();
        reordered.plugins.reverse();
        assert_eq!(fingerprint(&chrome()), fingerprint(&reordered));
    }

    #[test]
    fn any_single_change_alters_fingerprint() {
        let base = fingerprint(&chrome());
        let variants: [fn(&mut DeviceCharacteristics); 11] = [
            |c| c.user_agent.push('x'),
            |c| c.screen_resolution = "720x1600".into(),
            |c| c.timezone = "Asia/Dubai".into(),
            |c| c.language = "hi-IN".into(),
            |c| c.platform = "iPhone".into(),
            |c| c.cookies_enabled = false,
            |c| c.do_not_track = true,
            |c| c.touch_support = false,
            |c| c.canvas_fingerprint = Some("other".into()),
            |c| c.webgl_fingerprint = Some("angle".into()),
            |c| c.plugins.push("widevine".into()),
        ];
        for (i, mutate) in variants.iter().enumerate() {
            let mut changed = chrome();
            mutate(&mut changed);
            assert_ne!(fingerprint(&changed), base, "variant {i} kept the same fingerprint");
        }
    }

    #[test]
    fn absent_is_not_empty() {
        let mut empty = chrome();
        empty.webgl_fingerprint = Some(String::new());
        assert_ne!(fingerprint(&empty), fingerprint(&chrome()));
    }

    #[test]
    fn separators_inside_fields_do_not_collide() {
        let mut a = chrome();
        a.user_agent = "ua|1080x2400".into();
        a.screen_resolution = "x".into();
        let mut b = chrome();
        b.user_agent = "ua".into();
        b.screen_resolution = "1080x2400|x".into();
        assert_ne!(fingerprint(&a), fingerprint(&b));

        let mut joined = chrome();
        joined.plugins = vec!["pdf,cast".into()];
        assert_ne!(fingerprint(&joined), fingerprint(&chrome()));

        let mut shifted = chrome();
        shifted.canvas_fingerprint = None;
        shifted.webgl_fingerprint = Some("c4nv45".into());
        assert_ne!(fingerprint(&shifted), fingerprint(&chrome()));
    }

    #[test]
    fn first_octet_parsing() {
        assert_eq!(first_octet("49.36.1.2"), Some("49"));
        assert_eq!(first_octet(""), None);
    }
}
