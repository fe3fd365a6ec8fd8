//! Error types for the access gate

use thiserror::Error;

/// Access gate errors
///
/// Evaluation itself never fails; these surface when requirements are
/// declared, when roles are resolved remotely, or when settings are stored.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed requirement or configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote role lookup failed
    #[error("Role resolution failed: {0}")]
    RoleResolution(String),

    /// Settings rejected or could not be stored
    #[error("Settings error: {0}")]
    Settings(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gate operations
pub type Result<T> = std::result::Result<T, AuthzError>;
