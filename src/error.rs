//! Error types for parsing, evaluation, kernel dispatch and catalog access.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AlgebraError>;

/// A malformed expression, reported before any evaluation happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {position} near `{token}`")]
pub struct ParseError {
    pub message: String,
    /// Offending token text (empty at end of input)
    pub token: String,
    /// Byte offset into the expression
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, token: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            token: token.into(),
            position,
        }
    }
}

/// Failures of the metadata catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("SQL error: {0}")]
    Sql(String),

    #[error("{kind} `{id}` not found")]
    NotFound { kind: String, id: String },

    #[error("{kind} `{id}` already exists")]
    AlreadyExists { kind: String, id: String },

    #[error("map `{map}` is already registered in `{stds}`")]
    AlreadyOwned { map: String, stds: String },

    #[error("invalid row in `{table}`: {message}")]
    InvalidRow { table: String, message: String },
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Sql(err.to_string())
    }
}

/// Top-level error of the temporal algebra.
#[derive(Debug, Error)]
pub enum AlgebraError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error in `{context}`: {message}")]
    Evaluation { message: String, context: String },

    #[error("map operator failed for {pair}: {message}")]
    Kernel { pair: String, message: String },

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invalid temporal extent: {0}")]
    InvalidExtent(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("map store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AlgebraError {
    pub(crate) fn evaluation(message: impl Into<String>, context: impl Into<String>) -> Self {
        AlgebraError::Evaluation {
            message: message.into(),
            context: context.into(),
        }
    }

    /// True for errors that abort a run without touching the catalog.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            AlgebraError::Parse(_) | AlgebraError::Evaluation { .. }
        )
    }
}
