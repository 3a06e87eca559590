//! Error types for Quire operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used by
//! every Quire crate. Uses `thiserror` for derive macros.
//!
//! Errors fall into three groups:
//!
//! - record-level schema errors ([`Error::SchemaViolation`],
//!   [`Error::UnknownSourceType`]) which batch operations collect per record;
//! - setup and caller errors ([`Error::InvalidBinding`],
//!   [`Error::UnconfiguredCollection`], [`Error::UnknownBindingField`],
//!   [`Error::UnknownField`]) raised before any remote call is made;
//! - remote failures ([`Error::Remote`], [`Error::Embedding`]) which are
//!   propagated to the caller untouched.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in Quire operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A raw record does not satisfy its record kind.
    #[error("Schema violation in '{kind}': {message}")]
    SchemaViolation {
        /// Record kind name.
        kind: String,
        /// What was wrong.
        message: String,
    },

    /// The `type_source` value is not a member of the enumeration.
    #[error("Unknown source type: '{0}'")]
    UnknownSourceType(String),

    /// A field name that the record kind does not declare.
    #[error("Unknown field '{field}' for record kind '{kind}'")]
    UnknownField {
        /// Record kind name.
        kind: String,
        /// Requested field.
        field: String,
    },

    /// An embedding binding is misconfigured.
    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    /// The collection was never declared to the store.
    #[error("Collection '{0}' is not configured")]
    UnconfiguredCollection(String),

    /// No binding of the collection embeds the requested field.
    #[error("Collection '{collection}' has no binding for field '{field}'")]
    UnknownBindingField {
        /// Collection name.
        collection: String,
        /// Requested source field.
        field: String,
    },

    /// Incremental sync against a collection with no points.
    #[error("Collection '{0}' has no points to sync against")]
    EmptyCollection(String),

    /// The embedding provider failed or returned an unusable vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The vector index service failed.
    #[error("Remote error: {message}")]
    Remote {
        /// Description of the failed call.
        message: String,
        /// Underlying transport or protocol error.
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a schema violation for the given record kind.
    pub fn schema(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an unknown field error.
    pub fn unknown_field(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            kind: kind.into(),
            field: field.into(),
        }
    }

    /// Create an invalid binding error.
    pub fn binding(msg: impl Into<String>) -> Self {
        Self::InvalidBinding(msg.into())
    }

    /// Create an unknown binding field error.
    pub fn unknown_binding_field(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownBindingField {
            collection: collection.into(),
            field: field.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a remote error without an underlying cause.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a remote error wrapping the transport error that caused it.
    pub fn remote_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Remote {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// True for errors that only invalidate a single record.
    pub fn is_schema_violation(&self) -> bool {
        matches!(
            self,
            Self::SchemaViolation { .. } | Self::UnknownSourceType(_)
        )
    }

    /// True for failures of the vector index or the embedding provider.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::Embedding(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Quire's Error type.
pub type Result<T> = std::result::Result<T, Error>;
