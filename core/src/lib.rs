//! Trust-score and risk-scoring core.
//!
//! Four evaluators share one persistence layer and one trust ledger:
//!   - `trust_score`:        per-user score ledger, clamped to [0, 100]
//!   - `location_validator`: GPS spoofing and teleportation checks
//!   - `payment_fraud`:      additive payment screening
//!   - `device_fingerprint`: per-user device recognition
//!
//! `engine::RiskEngine` wires them to a store and a `RiskConfig`.

pub mod config;
pub mod device_fingerprint;
pub mod engine;
pub mod error;
pub mod event;
pub mod geo;
pub mod location_validator;
pub mod payment_fraud;
pub mod store;
pub mod trust_score;
pub mod types;
