//! Persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Evaluators call store methods; they never execute SQL directly.
//!
//! The data-access seams are traits so a caller can back the core with
//! any persistence; `SqliteStore` is the bundled implementation.

use crate::{
    device_fingerprint::DeviceRecord,
    error::RiskResult,
    event::ActivityLogEntry,
    location_validator::{LocationSample, LocationSettings},
    payment_fraud::{PaymentAssessment, PaymentAttempt, PaymentRecord},
    trust_score::{ScoreChange, TrustScoreEvent, UserRecord},
    types::{RiskLevel, Timestamp},
};
use rusqlite::Connection;

mod device;
mod location;
mod payment;
mod user;

/// How `adjust_trust_score` moves the stored score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustAdjustment {
    /// Add, then clamp into [0, 100].
    Delta(i32),
    /// Overwrite with an absolute value (clamped).
    Reset(i32),
}

impl TrustAdjustment {
    pub fn apply(&self, old: i32) -> i32 {
        match self {
            Self::Delta(d) => old.saturating_add(*d),
            Self::Reset(v) => *v,
        }
        .clamp(crate::trust_score::MIN_SCORE, crate::trust_score::MAX_SCORE)
    }
}

pub trait UserStore {
    fn insert_user(&self, user: &UserRecord) -> RiskResult<()>;
    fn get_user(&self, user_id: &str) -> RiskResult<Option<UserRecord>>;

    /// Read, clamp and write the score as one atomic step per user.
    /// Returns `None` when the user does not exist.
    fn adjust_trust_score(
        &self,
        user_id: &str,
        adjustment: TrustAdjustment,
    ) -> RiskResult<Option<ScoreChange>>;

    fn set_frozen(&self, user_id: &str, frozen: bool) -> RiskResult<()>;
    fn update_user_location(&self, user_id: &str, lat: f64, lng: f64, at: Timestamp) -> RiskResult<()>;

    fn insert_trust_event(&self, event: &TrustScoreEvent) -> RiskResult<()>;
    /// Newest first.
    fn trust_events(&self, user_id: &str, limit: usize) -> RiskResult<Vec<TrustScoreEvent>>;

    fn append_activity(&self, entry: &ActivityLogEntry) -> RiskResult<()>;
    /// Entries whose tag starts with `tag_prefix`, newest first.
    fn recent_activity(
        &self,
        user_id: &str,
        tag_prefix: &str,
        since: Timestamp,
        limit: usize,
    ) -> RiskResult<Vec<ActivityLogEntry>>;
}

pub trait LocationStore {
    /// Defaults when the user never saved settings.
    fn location_settings(&self, user_id: &str) -> RiskResult<LocationSettings>;
    fn save_location_settings(&self, settings: &LocationSettings) -> RiskResult<()>;
    fn insert_location_sample(&self, sample: &LocationSample, risk_level: RiskLevel) -> RiskResult<()>;
    /// Samples in `[since, until]`, newest first.
    fn recent_location_samples(
        &self,
        user_id: &str,
        since: Timestamp,
        until: Timestamp,
        limit: usize,
    ) -> RiskResult<Vec<LocationSample>>;
}

pub trait PaymentStore {
    fn insert_payment(&self, record: &PaymentRecord) -> RiskResult<()>;
    /// Payments at or after `since`, newest first.
    fn recent_payments(&self, user_id: &str, since: Timestamp, limit: usize) -> RiskResult<Vec<PaymentRecord>>;
    fn insert_payment_attempt(
        &self,
        attempt_id: &str,
        attempt: &PaymentAttempt,
        assessment: &PaymentAssessment,
    ) -> RiskResult<()>;
    fn count_payment_attempts(&self, user_id: &str, since: Timestamp) -> RiskResult<i64>;
    fn count_ip_payment_attempts(&self, ip_address: &str, since: Timestamp) -> RiskResult<i64>;
    fn distinct_payment_ips(&self, user_id: &str, since: Timestamp) -> RiskResult<Vec<String>>;
}

pub trait DeviceStore {
    fn get_device(&self, user_id: &str, fingerprint: &str) -> RiskResult<Option<DeviceRecord>>;
    fn count_devices(&self, user_id: &str) -> RiskResult<i64>;
    fn insert_device(&self, device: &DeviceRecord) -> RiskResult<()>;
    fn touch_device(
        &self,
        user_id: &str,
        fingerprint: &str,
        seen_at: Timestamp,
        ip_address: Option<&str>,
    ) -> RiskResult<()>;
    fn list_devices(&self, user_id: &str) -> RiskResult<Vec<DeviceRecord>>;
    fn remove_device(&self, user_id: &str, fingerprint: &str) -> RiskResult<bool>;
}

/// Everything the evaluators need from persistence.
pub trait RiskStore: UserStore + LocationStore + PaymentStore + DeviceStore {}

impl<T: UserStore + LocationStore + PaymentStore + DeviceStore + ?Sized> RiskStore for T {}

// ── SQLite ───────────────────────────────────────────────────────────────────

pub struct SqliteStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl SqliteStore {
    pub fn open(path: &str) -> RiskResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RiskResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// A second connection to the same file. In-memory stores get a fresh, empty database.
    pub fn reopen(&self) -> RiskResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RiskResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_location.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_payments.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_devices.sql"))?;
        Ok(())
    }
}
