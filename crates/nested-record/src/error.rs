//! Error types for record operations.

use nested_types::TypeError;
use thiserror::Error;

/// Errors that can occur while declaring, resolving, decoding or mutating
/// nested records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A discriminant does not name a type, or names one outside the
    /// declared hierarchy.
    #[error("invalid type '{type_name}': {reason}")]
    InvalidType { type_name: String, reason: String },

    /// A record of the wrong type was inserted into a collection or
    /// assigned to a single-record association.
    #[error("type mismatch: {found} should be a {expected}")]
    TypeMismatch { expected: String, found: String },

    /// Invalid or contradictory type or association configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Two records in one collection would share an identity key.
    #[error("primary key violation: {class} already holds a record with key {key}")]
    PrimaryKey { class: String, key: String },

    /// The attribute is not declared on the record type.
    #[error("unknown attribute '{attribute}' for {class}")]
    UnknownAttribute { class: String, attribute: String },

    /// The association is not declared on the record type, or has the other
    /// cardinality.
    #[error("unknown association '{name}' for {class}")]
    UnknownAssociation { class: String, name: String },

    /// A raw value has a shape the codec cannot cast.
    #[error("cannot cast {found} into {expected}")]
    Cast { expected: String, found: String },

    /// A malformed type path or attribute kind.
    #[error(transparent)]
    Name(#[from] TypeError),
}

/// Convenience type alias for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;
