//! Foundation types for nested records.
//!
//! This crate provides the value-level building blocks shared by the record
//! runtime: attribute kinds with their casting rules, and the type-path
//! naming conventions used to store and resolve subtype discriminants.
//!
//! # Key Types
//!
//! - [`AttrKind`] — Declared kind of a record attribute and its cast rules
//! - [`names`] — Type-path validation and inflection (`camelize`, `underscore`)
//! - [`TypeError`] — Errors for malformed names and unknown kinds

pub mod error;
pub mod kind;
pub mod names;

pub use error::TypeError;
pub use kind::{is_blank, AttrKind};
pub use names::{camelize, nesting_candidates, singularize, underscore, validate_type_path};
