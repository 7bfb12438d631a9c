//! Error types for the meshctl control-plane client
//!
//! Collaborator-specific errors (storage, control session, data-plane engine)
//! plus the unifying `MeshError` that every public operation returns.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Preferences storage failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Write of state key {key} failed: {reason}")]
    WriteFailed { key: String, reason: String },
    #[error("Read of state key {key} failed: {reason}")]
    ReadFailed { key: String, reason: String },
    #[error("Stored state under {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Control session failures
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Logout rejected by coordination service: {reason}")]
    LogoutFailed { reason: String },
    #[error("Control session could not be created: {reason}")]
    SessionCreation { reason: String },
    #[error("Control session did not finish {operation} within {timeout_ms} ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },
}

/// Data-plane engine failures
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine reconfiguration failed: {reason}")]
    ReconfigFailed { reason: String },
}

/// Errors raised while parsing identifiers and keys
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the meshctl control-plane client
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Control session error: {0}")]
    Control(#[from] ControlError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Edit attempted to change a field that may not be edited directly
    #[error("Preference field {field} is protected and cannot be edited")]
    ProtectedField { field: &'static str },
    #[error("Invalid preferences: {reason}")]
    InvalidPrefs { reason: String },
    /// Operation needs a control session but none is active (call start first)
    #[error("No active control session")]
    NoSession,
    #[error("Unknown profile: {id}")]
    UnknownProfile { id: String },
    /// Channel communication error between the backend handle and its task
    #[error("Channel error: {message}")]
    Channel { message: String },
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl MeshError {
    /// Whether the error stems from caller misuse rather than a collaborator failure
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MeshError::ProtectedField { .. }
                | MeshError::InvalidPrefs { .. }
                | MeshError::NoSession
                | MeshError::UnknownProfile { .. }
        )
    }
}

/// Result type for meshctl operations
pub type MeshResult<T> = Result<T, MeshError>;
