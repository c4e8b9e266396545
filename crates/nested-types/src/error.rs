use thiserror::Error;

/// Errors produced by name and kind operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid type path: {name}: {reason}")]
    InvalidPath { name: String, reason: String },

    #[error("unknown attribute kind: {0}")]
    UnknownKind(String),
}
