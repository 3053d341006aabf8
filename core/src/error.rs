use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transient failure reported by a non-SQLite store implementation.
    #[error("Store failure: {0}")]
    Store(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RiskError {
    pub fn user_not_found(id: &str) -> Self {
        Self::NotFound { entity: "user", id: id.to_string() }
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
