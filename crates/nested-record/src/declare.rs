//! Declaration surface for record types.
//!
//! Record types are declared against a [`RegistryBuilder`](crate::RegistryBuilder)
//! with closures receiving a [`ClassBuilder`]. Every builder call appends a
//! [`Declaration`]; nothing is resolved until the registry is built, so
//! declarations may refer to types defined later.
//!
//! ```
//! use nested_record::{AttrKind, Declare, Registry};
//!
//! let mut builder = Registry::builder();
//! builder.define("Shape", |c| {
//!     c.attribute("id", AttrKind::Integer).primary_key(["id"]);
//! });
//! builder.define_subclass("Circle", "Shape", |c| {
//!     c.attribute("radius", AttrKind::Float);
//! });
//! let registry = builder.build().unwrap();
//! assert!(registry.class("Circle").is_some());
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nested_types::AttrKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::association::Cardinality;
use crate::error::{RecordError, Result};
use crate::record::Record;
use crate::validation::{ValidationErrors, Validator};

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

type HookFn = dyn Fn(&mut Record) -> Result<()> + Send + Sync;
type RejectFn = dyn Fn(&Map<String, Value>) -> bool + Send + Sync;
type GenerateFn = dyn Fn() -> Value + Send + Sync;

/// Callback run after a record is constructed or instantiated.
#[derive(Clone)]
pub struct Hook(Arc<HookFn>);

impl Hook {
    pub fn new(f: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, record: &mut Record) -> Result<()> {
        (self.0)(record)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

/// Predicate over a raw payload; matching payloads are skipped by the
/// collection attributes writers.
#[derive(Clone)]
pub struct RejectIf(Arc<RejectFn>);

impl RejectIf {
    pub fn new(f: impl Fn(&Map<String, Value>) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn rejects(&self, payload: &Map<String, Value>) -> bool {
        (self.0)(payload)
    }
}

impl fmt::Debug for RejectIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RejectIf(..)")
    }
}

/// Default value of an attribute: a constant, or a generator invoked once
/// per new record.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Generate(Arc<GenerateFn>),
}

impl DefaultValue {
    pub fn generate(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Generate(Arc::new(f))
    }

    pub fn produce(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Generate(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Generate(_) => f.write_str("Generate(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// A declared scalar attribute.
#[derive(Clone, Debug)]
pub struct AttributeDecl {
    pub name: String,
    pub kind: AttrKind,
    pub default: Option<DefaultValue>,
    /// Marks the attribute as the type's single-attribute primary key.
    pub primary: bool,
}

impl AttributeDecl {
    pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            primary: false,
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Value(value));
        self
    }

    pub fn default_with(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::generate(f));
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Initial value for a freshly built record.
    pub(crate) fn initial_value(&self) -> Value {
        self.default
            .as_ref()
            .map_or(Value::Null, |default| self.kind.cast(&default.produce()))
    }
}

// ---------------------------------------------------------------------------
// Subtype options
// ---------------------------------------------------------------------------

/// Options controlling how discriminants of a hierarchy are resolved and
/// written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtypeOptions {
    /// Resolve discriminants as fully-qualified paths. Defaults to `true`
    /// when neither this nor `namespace` is given.
    pub full: Option<bool>,
    /// Resolve discriminants relative to this namespace.
    pub namespace: Option<String>,
    /// Write discriminants in underscored form (`a/bar`).
    pub underscored: bool,
}

impl SubtypeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full(mut self, full: bool) -> Self {
        self.full = Some(full);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn underscored(mut self) -> Self {
        self.underscored = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Associations
// ---------------------------------------------------------------------------

/// Merge strategy of a bulk attributes writer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterStrategy {
    /// Replace the whole association value.
    Rewrite,
    /// Update records matched by identity and append the rest.
    #[default]
    Upsert,
}

impl WriterStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rewrite => "rewrite",
            Self::Upsert => "upsert",
        }
    }
}

impl fmt::Display for WriterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriterStrategy {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rewrite" => Ok(Self::Rewrite),
            "upsert" => Ok(Self::Upsert),
            other => Err(RecordError::Configuration(format!(
                "Unknown strategy {other:?}"
            ))),
        }
    }
}

/// Bulk attributes writer configuration of an association.
#[derive(Clone, Debug)]
pub enum AttributesWriter {
    Disabled,
    Enabled {
        strategy: WriterStrategy,
        reject_if: Option<RejectIf>,
    },
}

impl Default for AttributesWriter {
    fn default() -> Self {
        Self::Enabled {
            strategy: WriterStrategy::default(),
            reject_if: None,
        }
    }
}

/// How the inline record type of an association is named.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InlineName {
    /// Not registered under any path.
    Anonymous,
    /// Registered as `<Owner>::<Association>` (singularized for many).
    Inferred,
    /// Registered as `<Owner>::<Name>`.
    Explicit(String),
}

/// Where the record type of an association comes from.
#[derive(Clone, Debug)]
pub enum ClassSource {
    /// Camelized (and for collections singularized) association name,
    /// looked up from the owner's scope.
    Inferred,
    /// Explicit type path, looked up from the owner's scope.
    Named(String),
    /// A record type declared inline.
    Inline {
        name: InlineName,
        declarations: Vec<Declaration>,
    },
}

/// A declared association.
#[derive(Clone, Debug)]
pub struct AssociationDecl {
    pub name: String,
    pub cardinality: Cardinality,
    pub source: ClassSource,
    pub writer: AttributesWriter,
    /// Association-level identity attributes; overrides the record type's.
    pub primary_key: Option<Vec<String>>,
    /// Raw default, decoded when a record is built.
    pub default: Option<Value>,
    /// Expose the inline type's attributes on the owner.
    pub(crate) delegate_accessors: bool,
}

impl AssociationDecl {
    pub fn new(name: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            cardinality,
            source: ClassSource::Inferred,
            writer: AttributesWriter::default(),
            primary_key: None,
            default: None,
            delegate_accessors: false,
        }
    }

    /// Name the record type. For inline types this names the registered
    /// inline type instead.
    pub fn class_name(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        match &mut self.source {
            ClassSource::Inline { name: inline, .. } => *inline = InlineName::Explicit(name),
            source => *source = ClassSource::Named(name),
        }
        self
    }

    /// Declare the record type inline. The type is anonymous unless
    /// [`class_name`](Self::class_name) or [`named_inline`](Self::named_inline)
    /// is also given.
    pub fn inline(&mut self, f: impl FnOnce(&mut ClassBuilder)) -> &mut Self {
        let mut builder = ClassBuilder::new();
        f(&mut builder);
        let name = match &self.source {
            ClassSource::Named(name) => InlineName::Explicit(name.clone()),
            ClassSource::Inline { name, .. } => name.clone(),
            ClassSource::Inferred => InlineName::Anonymous,
        };
        self.source = ClassSource::Inline {
            name,
            declarations: builder.into_declarations(),
        };
        self
    }

    /// Register the inline type under its inferred name.
    pub fn named_inline(&mut self) -> &mut Self {
        match &mut self.source {
            ClassSource::Inline { name, .. } => *name = InlineName::Inferred,
            source => {
                *source = ClassSource::Inline {
                    name: InlineName::Inferred,
                    declarations: Vec::new(),
                }
            }
        }
        self
    }

    pub fn strategy(&mut self, strategy: WriterStrategy) -> &mut Self {
        self.writer = match &self.writer {
            AttributesWriter::Enabled { reject_if, .. } => AttributesWriter::Enabled {
                strategy,
                reject_if: reject_if.clone(),
            },
            AttributesWriter::Disabled => AttributesWriter::Enabled {
                strategy,
                reject_if: None,
            },
        };
        self
    }

    pub fn without_attributes_writer(&mut self) -> &mut Self {
        self.writer = AttributesWriter::Disabled;
        self
    }

    pub fn reject_if(
        &mut self,
        f: impl Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        let strategy = match &self.writer {
            AttributesWriter::Enabled { strategy, .. } => *strategy,
            AttributesWriter::Disabled => WriterStrategy::default(),
        };
        self.writer = AttributesWriter::Enabled {
            strategy,
            reject_if: Some(RejectIf::new(f)),
        };
        self
    }

    pub fn primary_key<I, S>(&mut self, attributes: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(&mut self, value: Value) -> &mut Self {
        self.default = Some(value);
        self
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// One item of a type declaration.
#[derive(Clone, Debug)]
pub enum Declaration {
    Attribute(AttributeDecl),
    /// Transient attribute: assignable and readable, never serialized.
    Transient(String),
    PrimaryKey(Vec<String>),
    Subtypes(SubtypeOptions),
    /// Local subtype, visible only from within its declaring hierarchy.
    Subtype {
        name: String,
        declarations: Vec<Declaration>,
    },
    Association(AssociationDecl),
    Validate(Validator),
    AfterInitialize(Hook),
    Include(Concern),
}

/// Receiver of type declarations.
///
/// Implemented by [`ClassBuilder`] for type bodies and by [`Concern`] for
/// reusable declaration bundles.
pub trait Declare {
    /// Append a raw declaration.
    fn declare(&mut self, declaration: Declaration);

    fn attribute(&mut self, name: &str, kind: AttrKind) -> &mut Self
    where
        Self: Sized,
    {
        self.attribute_with(AttributeDecl::new(name, kind))
    }

    fn attribute_with(&mut self, attribute: AttributeDecl) -> &mut Self
    where
        Self: Sized,
    {
        self.declare(Declaration::Attribute(attribute));
        self
    }

    fn transient(&mut self, name: &str) -> &mut Self
    where
        Self: Sized,
    {
        self.declare(Declaration::Transient(name.to_string()));
        self
    }

    fn primary_key<I, S>(&mut self, attributes: I) -> &mut Self
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let attributes = attributes.into_iter().map(Into::into).collect();
        self.declare(Declaration::PrimaryKey(attributes));
        self
    }

    /// String primary key defaulting to a fresh time-ordered UUID.
    fn primary_uuid(&mut self, name: &str) -> &mut Self
    where
        Self: Sized,
    {
        self.attribute_with(
            AttributeDecl::new(name, AttrKind::String)
                .default_with(|| Value::String(uuid::Uuid::now_v7().to_string()))
                .primary(),
        )
    }

    fn subtypes(&mut self, options: SubtypeOptions) -> &mut Self
    where
        Self: Sized,
    {
        self.declare(Declaration::Subtypes(options));
        self
    }

    fn subtype(&mut self, name: &str, f: impl FnOnce(&mut ClassBuilder)) -> &mut Self
    where
        Self: Sized,
    {
        let mut builder = ClassBuilder::new();
        f(&mut builder);
        self.declare(Declaration::Subtype {
            name: name.to_string(),
            declarations: builder.into_declarations(),
        });
        self
    }

    fn has_one(&mut self, name: &str, f: impl FnOnce(&mut AssociationDecl)) -> &mut Self
    where
        Self: Sized,
    {
        let mut association = AssociationDecl::new(name, Cardinality::One);
        f(&mut association);
        self.declare(Declaration::Association(association));
        self
    }

    fn has_many(&mut self, name: &str, f: impl FnOnce(&mut AssociationDecl)) -> &mut Self
    where
        Self: Sized,
    {
        let mut association = AssociationDecl::new(name, Cardinality::Many);
        f(&mut association);
        self.declare(Declaration::Association(association));
        self
    }

    /// Store the attributes declared in `f` inside the JSON attribute
    /// `from`, while reading and writing them as if they were declared here.
    fn nested_accessors(&mut self, from: &str, f: impl FnOnce(&mut ClassBuilder)) -> &mut Self
    where
        Self: Sized,
    {
        let mut builder = ClassBuilder::new();
        f(&mut builder);
        let mut association = AssociationDecl::new(from, Cardinality::One);
        association.source = ClassSource::Inline {
            name: InlineName::Anonymous,
            declarations: builder.into_declarations(),
        };
        association
            .strategy(WriterStrategy::Rewrite)
            .default_value(Value::Object(Map::new()));
        association.delegate_accessors = true;
        self.declare(Declaration::Association(association));
        self
    }

    fn validate(
        &mut self,
        f: impl Fn(&Record, &mut ValidationErrors) + Send + Sync + 'static,
    ) -> &mut Self
    where
        Self: Sized,
    {
        self.declare(Declaration::Validate(Validator::new(f)));
        self
    }

    fn validates_presence(&mut self, attribute: &str) -> &mut Self
    where
        Self: Sized,
    {
        self.declare(Declaration::Validate(Validator::presence(attribute)));
        self
    }

    fn validates_inclusion(&mut self, attribute: &str, allowed: Vec<Value>) -> &mut Self
    where
        Self: Sized,
    {
        self.declare(Declaration::Validate(Validator::inclusion(attribute, allowed)));
        self
    }

    fn after_initialize(
        &mut self,
        f: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> &mut Self
    where
        Self: Sized,
    {
        self.declare(Declaration::AfterInitialize(Hook::new(f)));
        self
    }

    fn include(&mut self, concern: &Concern) -> &mut Self
    where
        Self: Sized,
    {
        self.declare(Declaration::Include(concern.clone()));
        self
    }
}

/// Collects the declarations of one record type body.
#[derive(Clone, Debug, Default)]
pub struct ClassBuilder {
    declarations: Vec<Declaration>,
}

impl ClassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn into_declarations(self) -> Vec<Declaration> {
        self.declarations
    }
}

impl Declare for ClassBuilder {
    fn declare(&mut self, declaration: Declaration) {
        self.declarations.push(declaration);
    }
}

/// A reusable bundle of declarations, applied to a type with
/// [`Declare::include`].
#[derive(Clone, Debug, Default)]
pub struct Concern {
    declarations: Vec<Declaration>,
}

impl Concern {
    pub fn new(f: impl FnOnce(&mut Concern)) -> Self {
        let mut concern = Self::default();
        f(&mut concern);
        concern
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }
}

impl Declare for Concern {
    fn declare(&mut self, declaration: Declaration) {
        self.declarations.push(declaration);
    }
}

/// Expand included concerns in place, preserving declaration order.
pub(crate) fn flatten(declarations: Vec<Declaration>) -> Vec<Declaration> {
    let mut out = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        match declaration {
            Declaration::Include(concern) => out.extend(flatten(concern.declarations)),
            other => out.push(other),
        }
    }
    out
}
