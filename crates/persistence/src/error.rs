//! Error types for the persistence layer.
//!
//! Errors are grouped by category: missing or conflicting records, structural
//! validation of hierarchies and orders, capability checks, storage backend
//! failures and search index failures.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::search::ReindexStage;

/// The primary error type for all persistence operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Record lookup and uniqueness errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Structural validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Capability check failures
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// Relational backend errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Search index errors
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl StorageError {
    /// Returns true if the error is a validation failure raised before persistence.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }

    /// Returns true if the error means a record was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Resource(ResourceError::NotFound { .. }))
    }
}

/// Errors related to record existence.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested record was not found.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A record with the same natural key already exists.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },
}

impl ResourceError {
    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        ResourceError::NotFound {
            entity,
            key: key.into(),
        }
    }
}

/// Structural validation errors.
///
/// These are raised before any part of the offending batch is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A broader-code chain revisits one of its own codes.
    #[error("cyclic hierarchy detected at code '{code_value}'")]
    CyclicHierarchy { code_value: String },

    /// A broader-code chain is deeper than the configured maximum.
    #[error("hierarchy of code '{code_value}' exceeds the maximum level {max_level}")]
    MaxHierarchyLevelExceeded { code_value: String, max_level: u32 },

    /// A code references a broader code in another scheme.
    #[error("broader code of '{code_value}' belongs to another code scheme")]
    CrossSchemeBroaderCode { code_value: String },

    /// A code references itself as its broader code.
    #[error("code '{code_value}' cannot be its own broader code")]
    SelfReferencingBroaderCode { code_value: String },

    /// The referenced broader code does not exist in the scheme.
    #[error("broader code '{broader}' of code '{code_value}' does not exist")]
    BroaderCodeNotFound { code_value: String, broader: String },

    /// Codes left without a level after level propagation stopped.
    #[error("hierarchy levels could not be resolved for codes: {}", code_values.join(", "))]
    UnresolvedHierarchy { code_values: Vec<String> },

    /// Two items in one scope ended up with the same order.
    #[error("order {order} is assigned to more than one item in {scope}")]
    DuplicateOrder { scope: String, order: i32 },

    /// A requested or minted order falls outside the order space.
    #[error("order {order} is outside the allowed range 1..={max}")]
    OrderOutOfRange { order: i64, max: i32 },

    /// A code value contains characters outside the allowed set.
    #[error("invalid code value: '{code_value}'")]
    InvalidCodeValue { code_value: String },

    /// An identifier in the payload points at a record with another natural key.
    #[error("existing {entity} mismatch: {message}")]
    Mismatch { entity: &'static str, message: String },

    /// A code cannot be deleted.
    #[error("code '{code_value}' cannot be deleted: {reason}")]
    UndeletableCode { code_value: String, reason: String },

    /// Codes of a cumulative previous version are missing from the new version.
    #[error("cumulative code scheme is missing codes of its previous version: {}", code_values.join(", "))]
    MissingCumulativeCodes { code_values: Vec<String> },

    /// The extension payload is inconsistent.
    #[error("invalid extension: {message}")]
    InvalidExtension { message: String },

    /// The member payload is inconsistent.
    #[error("invalid member: {message}")]
    InvalidMember { message: String },

    /// A required field is missing.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },
}

/// Failed capability checks.
#[derive(Error, Debug)]
pub enum PermissionError {
    /// The caller may not modify the target.
    #[error("operation '{operation}' is not permitted")]
    NotPermitted { operation: String },

    /// The status transition is reserved for privileged callers.
    #[error("status change from {from} to {to} is not allowed")]
    StatusChangeNotAllowed { from: String, to: String },
}

/// Errors originating from the relational backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Schema migration error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Errors raised by the search index pipeline.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The search engine could not be reached or rejected a request.
    #[error("search index request to {client} failed: {message}")]
    Request { client: String, message: String },

    /// A reindex stage failed and aborted its run.
    #[error("reindex of '{index}' failed during {stage}: {message}")]
    StageFailed {
        index: String,
        stage: ReindexStage,
        message: String,
    },

    /// The requested entity type cannot be indexed.
    #[error("unknown entity type: {name}")]
    UnknownEntityType { name: String },
}

/// Result type alias for persistence operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}
