//! Error taxonomy shared by every layer of the engine.
use thiserror::Error;

use crate::value::Value;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The type has no discoverable constructor signature (or is unknown).
    /// Callers treat it as "not user-constructible".
    #[error("cannot introspect `{class}`: {reason}")]
    Introspection { class: String, reason: String },

    #[error("`{class}` has no parameter `{param}`")]
    UnknownParameter { class: String, param: String },

    #[error("`{descriptor}` expects {expected} type argument(s), found {found}")]
    AmbiguousArity {
        descriptor: String,
        expected: usize,
        found: usize,
    },

    #[error("expected a value of type `{expected}`, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("column `{column}` not found in row")]
    ColumnNotFound { column: String },

    #[error("cannot convert {value} to `{target}`: {reason}")]
    Typecast {
        value: String,
        target: String,
        reason: String,
    },

    #[error("failed to construct `{class}`: {reason}")]
    Construction { class: String, reason: String },

    #[error("no default value registered for `{location}`")]
    NoDefaultValue { location: String },

    #[error("`{path}` would duplicate another element of its set")]
    DuplicateElement { path: String },

    #[error("path `{path}` does not address a value")]
    InvalidPath { path: String },

    #[error("invalid reference `{input}`: {reason}")]
    ReferenceSyntax { input: String, reason: String },

    #[error("invalid type expression `{input}`: {reason}")]
    TypeSyntax { input: String, reason: String },

    #[error("registry: {0}")]
    Registry(String),

    #[error("at JSON path {path} → {message}")]
    JsonPath { path: String, message: String },

    #[error("jq filter failed: {0}")]
    Jq(String),

    #[error("task was cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn type_mismatch(expected: impl ToString, found: &Value) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            found: found.type_label(),
        }
    }

    pub(crate) fn introspection(class: impl ToString, reason: impl Into<String>) -> Self {
        Error::Introspection {
            class: class.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn construction(class: impl ToString, reason: impl Into<String>) -> Self {
        Error::Construction {
            class: class.to_string(),
            reason: reason.into(),
        }
    }

    /// Import-time problems are tolerated per field; everything else aborts
    /// the operation that raised it.
    pub fn is_field_level(&self) -> bool {
        matches!(self, Error::ColumnNotFound { .. } | Error::Typecast { .. })
    }
}
