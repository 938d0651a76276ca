//! SDK Error Types
//!
//! Defines error types for the membank SDK.

use thiserror::Error;

/// SDK Result type alias
pub type SDKResult<T> = Result<T, SDKError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum SDKError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Graph store error
    #[error("graph error: {0}")]
    Graph(#[from] membank_core::Error),

    /// Input rejected before any mutation
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Entry not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Snapshot could not be created
    #[error("snapshot creation failed: {message}")]
    SnapshotFailure { message: String },

    /// Rollback refused because the snapshot failed validation
    #[error("snapshot {snapshot_id} is invalid: {}", issues.join("; "))]
    RollbackValidation {
        snapshot_id: String,
        issues: Vec<String>,
    },

    /// Collaborator output does not satisfy its data contract
    #[error("{contract} does not match its contract: {message}")]
    Schema { contract: String, message: String },

    /// Non-dry-run optimization without explicit confirmation
    #[error("confirmation required: pass confirm=true to apply a plan, or use a dry run")]
    ConfirmationRequired,

    /// Setup-phase failure of a named operation
    #[error("{operation} failed: {source}")]
    Operation {
        operation: String,
        source: Box<SDKError>,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SDKError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a snapshot failure
    pub fn snapshot_failure(message: impl Into<String>) -> Self {
        Self::SnapshotFailure {
            message: message.into(),
        }
    }

    /// Create a contract violation error
    pub fn schema(contract: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            contract: contract.into(),
            message: message.into(),
        }
    }

    /// Wrap a setup-phase failure as `"<operation> failed: <cause>"`.
    ///
    /// Already-wrapped errors are returned unchanged.
    pub fn operation(operation: impl Into<String>, cause: SDKError) -> Self {
        if matches!(cause, Self::Operation { .. }) {
            return cause;
        }
        Self::Operation {
            operation: operation.into(),
            source: Box::new(cause),
        }
    }

    /// The underlying error when this is an operation wrapper.
    pub fn root(&self) -> &SDKError {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Self::NotFound { .. } => true,
            Self::Graph(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Self::Validation { .. })
    }
}
