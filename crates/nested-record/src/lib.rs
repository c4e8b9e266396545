//! Typed polymorphic records embedded in a JSON column.
//!
//! A parent entity keeps a tree of typed sub-records inside one serialized
//! column. This crate gives those sub-records a type system: declared
//! attributes with casting, single inheritance with a stored `type`
//! discriminant, one-to-one and one-to-many associations, and bulk
//! attribute writers that merge payloads into existing collections by
//! primary key.
//!
//! # Key Types
//!
//! - [`Registry`] / [`RegistryBuilder`] — Immutable set of record types, built once from declarations
//! - [`Declare`] — Declaration surface shared by [`ClassBuilder`] and [`Concern`]
//! - [`ClassRef`] — Handle to a record type; constructs, instantiates and resolves subtypes
//! - [`Record`] — An instance with attributes and associations
//! - [`Collection`] / [`CollectionProxy`] — Typed record sequences and their guarded handle
//! - [`PrimaryKeyCheck`] — Identity attributes of a type and the uniqueness guard
//! - [`OneCodec`] / [`ManyCodec`] / [`TextCodec`] — Conversion between association values and JSON
//! - [`RecordError`] — Error type for declaration, resolution and merge failures
//!
//! # Example
//!
//! ```
//! use nested_record::{AttrKind, Declare, Registry, SubtypeOptions};
//! use serde_json::json;
//!
//! let mut builder = Registry::builder();
//! builder
//!     .define("Shape", |c| {
//!         c.attribute("id", AttrKind::Integer)
//!             .primary_key(["id"])
//!             .subtypes(SubtypeOptions::new().underscored());
//!     })
//!     .define_subclass("Circle", "Shape", |c| {
//!         c.attribute("radius", AttrKind::Float);
//!     })
//!     .define("Drawing", |c| {
//!         c.has_many("shapes", |_| {});
//!     });
//! let registry = builder.build()?;
//!
//! let mut drawing = registry.class("Drawing").unwrap().build(json!({}))?;
//! drawing.write_attributes("shapes", &json!([{"type": "circle", "id": "1", "radius": 2}]))?;
//! drawing.write_attributes("shapes", &json!([{"type": "circle", "id": 1, "radius": 3}]))?;
//!
//! let shapes = drawing.many("shapes")?;
//! assert_eq!(shapes.len(), 1);
//! assert_eq!(shapes[0].class().name(), "Circle");
//! assert_eq!(drawing.as_json(), json!({"shapes": [{"id": 1, "type": "circle", "radius": 3.0}]}));
//! # Ok::<(), nested_record::RecordError>(())
//! ```

pub mod association;
pub mod codec;
pub mod collection;
pub mod declare;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod merge;
pub mod record;
pub mod registry;
pub mod resolve;
pub mod validation;

pub use association::{AssociationSetup, Cardinality, ATTRIBUTES_SUFFIX};
pub use codec::{Codec, ManyCodec, OneCodec, TextCodec};
pub use collection::Collection;
pub use declare::{
    AssociationDecl, AttributeDecl, AttributesWriter, ClassBuilder, ClassSource, Concern,
    Declaration, Declare, DefaultValue, Hook, InlineName, RejectIf, SubtypeOptions,
    WriterStrategy,
};
pub use error::{RecordError, Result};
pub use identity::{IdentityKey, PrimaryKeyCheck};
pub use matcher::{Condition, Predicate};
pub use merge::CollectionProxy;
pub use nested_types::{AttrKind, TypeError};
pub use record::{Field, Record};
pub use registry::{
    ClassId, ClassRef, Registry, RegistryBuilder, ResolutionMode, SubtypeSettings, TYPE_ATTRIBUTE,
};
pub use resolve::discriminant;
pub use validation::{ValidationErrors, Validator};
