//! Fraud and trust policy constants.
//!
//! Every number that encodes business or fraud policy lives here rather
//! than in the evaluators. `RiskConfig::load` reads `risk_config.json`
//! from the data directory; any section or field missing from the file
//! falls back to the defaults below.

use serde::{Deserialize, Serialize};

// ── Location ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// General travel-speed ceiling in km/h.
    pub max_speed_kmh: f64,
    /// Speed beyond which travel is physically impossible (faster than airliners).
    pub impossible_speed_kmh: f64,
    /// Raw displacement ceiling from the previous sample, regardless of time.
    pub max_distance_jump_km: f64,
    /// Displacement that forces High on its own.
    pub extreme_distance_km: f64,
    /// Declared accuracy above this is a low-quality fix.
    pub max_accuracy_m: f64,
    /// Declared accuracy below this is unrealistically perfect.
    pub min_accuracy_m: f64,
    /// Jump size counted by the window consistency check.
    pub large_jump_km: f64,
    /// More than this many large jumps in the window is flagged.
    pub max_large_jumps: usize,
    /// More than this many byte-identical coordinates in the window is flagged.
    pub max_exact_repeats: usize,
    /// Elapsed time under which any displacement is an instant jump.
    pub instant_jump_secs: f64,
    /// Displacement that counts as a jump inside `instant_jump_secs`.
    pub instant_jump_m: f64,
    pub window_minutes: i64,
    pub window_samples: usize,
    /// Do not commit High-risk samples to history or the visible location.
    pub withhold_high_risk_samples: bool,
    /// Freeze the account outright on a High-risk sample.
    pub freeze_on_high_risk: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 200.0,
            impossible_speed_kmh: 1000.0,
            max_distance_jump_km: 500.0,
            extreme_distance_km: 2000.0,
            max_accuracy_m: 1000.0,
            min_accuracy_m: 1.0,
            large_jump_km: 50.0,
            max_large_jumps: 2,
            max_exact_repeats: 2,
            instant_jump_secs: 1.0,
            instant_jump_m: 100.0,
            window_minutes: 60,
            window_samples: 20,
            withhold_high_risk_samples: true,
            freeze_on_high_risk: false,
        }
    }
}

// ── Payment ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Standard subscription price; anything else is an amount anomaly.
    pub expected_amount: f64,
    /// Round amounts at or above this add a small increment.
    pub round_amount_threshold: f64,
    pub high_risk_threshold: i32,
    pub medium_risk_threshold: i32,
    pub history_days: i64,
    pub history_limit: usize,
    /// Prior payments in the history window that count as "many".
    pub max_recent_payments: usize,
    /// Prior payments with the same amount that count as probing.
    pub max_same_amount: usize,
    pub max_attempts_per_day: i64,
    pub max_attempts_per_ip_hour: i64,
    pub max_distinct_ips_week: i64,
    pub normal_hours_start: u32,
    pub normal_hours_end: u32,
    /// Offset applied to UTC before the normal-hours check.
    pub local_utc_offset_minutes: i32,
    pub low_trust_threshold: i32,
    /// Extra IP prefixes treated as VPN-like on top of private ranges.
    pub suspicious_ip_prefixes: Vec<String>,
    /// Penalty for a High result that does not block the user.
    pub high_risk_penalty: i32,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            expected_amount: 49.0,
            round_amount_threshold: 1000.0,
            high_risk_threshold: 40,
            medium_risk_threshold: 20,
            history_days: 30,
            history_limit: 10,
            max_recent_payments: 3,
            max_same_amount: 2,
            max_attempts_per_day: 3,
            max_attempts_per_ip_hour: 5,
            max_distinct_ips_week: 3,
            normal_hours_start: 6,
            normal_hours_end: 22,
            local_utc_offset_minutes: 0,
            low_trust_threshold: 30,
            suspicious_ip_prefixes: Vec::new(),
            high_risk_penalty: 10,
        }
    }
}

// ── Device ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Devices per user before every new device is High risk.
    pub max_devices_per_user: i64,
    /// Existing-device count at which a new device is Medium risk.
    pub medium_device_count: i64,
    pub stale_device_days: i64,
    pub new_device_penalty: i32,
    pub suspicious_device_penalty: i32,
    pub high_risk_device_penalty: i32,
    pub returning_device_bonus: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_devices_per_user: 5,
            medium_device_count: 3,
            stale_device_days: 90,
            new_device_penalty: 5,
            suspicious_device_penalty: 10,
            high_risk_device_penalty: 25,
            returning_device_bonus: 1,
        }
    }
}

// ── Trust ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub default_score: i32,
    pub trusted_threshold: i32,
    pub neutral_threshold: i32,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            default_score: 50,
            trusted_threshold: 70,
            neutral_threshold: 40,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub location: LocationConfig,
    pub payment:  PaymentConfig,
    pub device:   DeviceConfig,
    pub trust:    TrustConfig,
}

impl RiskConfig {
    /// Load from the data/ directory.
    /// In tests, use RiskConfig::default().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/risk_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: RiskConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.location.max_speed_kmh <= 0.0 {
            anyhow::bail!("location.max_speed_kmh must be positive");
        }
        if self.payment.medium_risk_threshold > self.payment.high_risk_threshold {
            anyhow::bail!("payment.medium_risk_threshold exceeds high_risk_threshold");
        }
        if self.payment.normal_hours_start >= 24 || self.payment.normal_hours_end > 24 {
            anyhow::bail!("payment normal hours must fall within 0..24");
        }
        if self.trust.neutral_threshold > self.trust.trusted_threshold {
            anyhow::bail!("trust.neutral_threshold exceeds trusted_threshold");
        }
        if !(0..=100).contains(&self.trust.default_score) {
            anyhow::bail!("trust.default_score must be within 0..=100");
        }
        Ok(())
    }
}
