use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Level configuration error: {0}")]
    Configuration(String),

    #[error("Invalid promotion for technician '{technician_id}': {reason}")]
    InvalidPromotion { technician_id: String, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Technician '{technician_id}' cannot take the job: {reason}")]
    TechnicianUnavailable { technician_id: String, reason: String },

    #[error("Service '{service_id}' is {status}, expected {expected}")]
    InvalidState {
        service_id: String,
        status:     String,
        expected:   &'static str,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeskError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

pub type DeskResult<T> = Result<T, DeskError>;
