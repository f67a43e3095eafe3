//! Error types for the relation engine
//!
//! Executor failures are carried through unchanged; resolution failures
//! (unknown relation, unknown scope, missing models) get their own variants.

use thiserror::Error;

use crate::backends::DatabaseValue;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Database driver or statement error
    #[error("Database error: {0}")]
    Database(String),

    /// Query could not be compiled or executed by the executor
    #[error("Query error: {0}")]
    Query(String),

    /// Connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// `first_or_fail` / `find_or_fail` found fewer models than requested
    #[error("No query results for model [{model}]{}", format_keys(.keys))]
    ModelNotFound {
        model: String,
        keys: Vec<DatabaseValue>,
    },

    /// A relation name has no definition on the model type
    #[error("Call to undefined relationship [{relation}] on model [{model}]")]
    RelationNotFound { model: String, relation: String },

    /// A local scope name has no definition on the model type
    #[error("Call to undefined scope [{scope}] on model [{model}]")]
    ScopeNotFound { model: String, scope: String },

    /// Malformed registration (scopes, accessors)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A key could not be coerced to the declared key type
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Relation used in a way its kind does not support
    #[error("Relationship error: {0}")]
    Relationship(String),

    /// Registry or model definition is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transaction already finished or failed to finish
    #[error("Transaction error: {0}")]
    Transaction(String),
}

fn format_keys(keys: &[DatabaseValue]) -> String {
    if keys.is_empty() {
        return String::new();
    }

    let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
    format!(" {}", keys.join(", "))
}

impl ModelError {
    /// Builds a `ModelNotFound` for the given model and missing keys
    pub fn not_found(model: &str, keys: Vec<DatabaseValue>) -> Self {
        ModelError::ModelNotFound {
            model: model.to_string(),
            keys,
        }
    }

    /// Returns true for "not found" errors raised by the `*_or_fail` helpers
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::ModelNotFound { .. })
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
