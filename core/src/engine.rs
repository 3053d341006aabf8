//! The risk engine: one long-lived service object owning store and config.
//!
//! RULES:
//!   - Evaluators are borrowed views; they hold no state of their own.
//!   - Every trust change flows through the one `TrustScoreLedger`.
//!   - Every evaluator reads policy from the engine's `RiskConfig`.

use crate::{
    config::RiskConfig,
    device_fingerprint::DeviceTrustTracker,
    error::RiskResult,
    event::ActivityLogEntry,
    location_validator::LocationRiskEvaluator,
    payment_fraud::PaymentRiskEvaluator,
    store::{RiskStore, SqliteStore},
    trust_score::TrustScoreLedger,
    types::Timestamp,
};

pub struct RiskEngine<S: RiskStore = SqliteStore> {
    pub store:  S,
    pub config: RiskConfig,
}

impl<S: RiskStore> RiskEngine<S> {
    pub fn new(store: S, config: RiskConfig) -> Self {
        Self { store, config }
    }

    pub fn ledger(&self) -> TrustScoreLedger<'_, S> {
        TrustScoreLedger::new(&self.store, &self.config.trust)
    }

    pub fn locations(&self) -> LocationRiskEvaluator<'_, S> {
        LocationRiskEvaluator::new(&self.store, &self.config.location, self.ledger())
    }

    pub fn payments(&self) -> PaymentRiskEvaluator<'_, S> {
        PaymentRiskEvaluator::new(&self.store, &self.config.payment, self.ledger())
    }

    pub fn devices(&self) -> DeviceTrustTracker<'_, S> {
        DeviceTrustTracker::new(&self.store, &self.config.device, self.ledger())
    }

    /// Audit entries whose tag starts with `tag_prefix` (`""` for all), newest first.
    pub fn activity(
        &self,
        user_id:    &str,
        tag_prefix: &str,
        since:      Timestamp,
        limit:      usize,
    ) -> RiskResult<Vec<ActivityLogEntry>> {
        self.store.recent_activity(user_id, tag_prefix, since, limit)
    }
}

impl RiskEngine<SqliteStore> {
    /// Open (and migrate) a database file. `:memory:` gives a private database.
    pub fn open(path: &str, config: RiskConfig) -> RiskResult<Self> {
        let store = if path == ":memory:" {
            SqliteStore::in_memory()?
        } else {
            SqliteStore::open(path)?
        };
        store.migrate()?;
        log::debug!("risk engine opened on {path}");
        Ok(Self::new(store, config))
    }

    /// In-memory, migrated, default policy. Used by tests.
    pub fn build_test() -> RiskResult<Self> {
        Self::open(":memory:", RiskConfig::default())
    }
}
