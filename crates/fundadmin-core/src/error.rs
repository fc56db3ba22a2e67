use thiserror::Error;

/// Domain errors surfaced to the route layer.
///
/// Every variant maps to exactly one transport status; the mapping lives in
/// the service crate and never branches on message content.
#[derive(Debug, Error)]
pub enum FundError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl FundError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{entity} '{id}' not found"))
    }

    pub fn missing_field(field: &str) -> Self {
        Self::Validation(format!("required field '{field}' is missing or empty"))
    }
}
