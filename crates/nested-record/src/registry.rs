//! The type registry.
//!
//! A [`Registry`] is built once from declarations and is immutable
//! afterwards. It owns every record type: the globally named ones, inline
//! association types and local subtypes. Types are referenced by
//! [`ClassRef`] handles, which keep the registry alive.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nested_types::names::{namespace_prefixes, strip_absolute};
use nested_types::{camelize, singularize, underscore, validate_type_path, AttrKind};
use tracing::debug;

use crate::association::{AssociationSetup, Cardinality, ATTRIBUTES_SUFFIX};
use crate::declare::{
    flatten, AssociationDecl, AttributeDecl, AttributesWriter, ClassBuilder, ClassSource,
    Declaration, Hook, InlineName, SubtypeOptions,
};
use crate::error::{RecordError, Result};
use crate::validation::Validator;

/// Name of the discriminant attribute.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Namespace segment under which local subtypes are named.
const LOCAL_TYPES: &str = "LocalTypes";

// ---------------------------------------------------------------------------
// Class metadata
// ---------------------------------------------------------------------------

/// Index of a type within its registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

/// How discriminants of a hierarchy are looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionMode {
    /// As fully-qualified paths.
    Full,
    /// Under this fully-qualified namespace first, then as-is.
    Namespace(String),
    /// From the base type's lexical scope outward.
    Nearest,
}

/// Effective subtype settings, computed once per hierarchy root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubtypeSettings {
    pub mode: ResolutionMode,
    pub underscored: bool,
}

#[derive(Clone, Debug)]
pub(crate) enum Slot {
    Attribute(AttributeDecl),
    Association(Arc<AssociationSetup>),
}

#[derive(Clone, Debug)]
pub(crate) struct FieldDef {
    pub(crate) name: String,
    pub(crate) slot: Slot,
}

#[derive(Debug)]
pub(crate) struct ClassDef {
    pub(crate) name: String,
    pub(crate) registered: bool,
    pub(crate) parent: Option<ClassId>,
    pub(crate) local: bool,
    pub(crate) type_const: String,
    pub(crate) instance_type: String,
    pub(crate) settings: SubtypeSettings,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) field_index: HashMap<String, usize>,
    pub(crate) transient: Vec<String>,
    pub(crate) primary_key: Option<Vec<String>>,
    pub(crate) local_subtypes: BTreeMap<String, ClassId>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) hooks: Vec<Hook>,
    /// Accessor name -> association holding the value.
    pub(crate) delegations: HashMap<String, String>,
}

impl ClassDef {
    pub(crate) fn field(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.field_index
            .get(name)
            .map(|&idx| (idx, &self.fields[idx]))
    }

    pub(crate) fn association(&self, name: &str) -> Option<&Arc<AssociationSetup>> {
        match self.field(name) {
            Some((_, FieldDef { slot: Slot::Association(setup), .. })) => Some(setup),
            _ => None,
        }
    }

    pub(crate) fn is_transient(&self, name: &str) -> bool {
        self.transient.iter().any(|t| t == name)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Result of looking a path up in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Constant {
    Class(ClassId),
    Namespace,
}

/// Immutable set of record types.
#[derive(Debug)]
pub struct Registry {
    classes: Vec<ClassDef>,
    by_name: HashMap<String, ClassId>,
    namespaces: HashSet<String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a globally named type.
    pub fn class(self: &Arc<Self>, name: &str) -> Option<ClassRef> {
        self.by_name
            .get(strip_absolute(name))
            .map(|&id| ClassRef {
                registry: Arc::clone(self),
                id,
            })
    }

    /// Number of types, including inline types and local subtypes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Globally registered type names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn def(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.0]
    }

    /// Exact lookup of a fully-qualified path.
    pub(crate) fn constantize(&self, path: &str) -> Option<Constant> {
        let path = strip_absolute(path);
        if let Some(&id) = self.by_name.get(path) {
            Some(Constant::Class(id))
        } else if self.namespaces.contains(path) {
            Some(Constant::Namespace)
        } else {
            None
        }
    }

    /// Lexical lookup of `name` from inside `owner`, innermost scope first.
    /// Returns the matching path with what it names.
    pub(crate) fn lookup_const(&self, owner: &str, name: &str) -> Option<(String, Constant)> {
        nested_types::nesting_candidates(owner, name)
            .into_iter()
            .find_map(|candidate| {
                self.constantize(&candidate)
                    .map(|constant| (candidate, constant))
            })
    }
}

/// Handle to a record type.
#[derive(Clone)]
pub struct ClassRef {
    registry: Arc<Registry>,
    id: ClassId,
}

impl ClassRef {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Full path of the type. Inline anonymous types and local subtypes get
    /// a synthetic path under their owner.
    pub fn name(&self) -> &str {
        &self.def().name
    }

    /// Whether the type can be found by path.
    pub fn is_registered(&self) -> bool {
        self.def().registered
    }

    pub fn parent(&self) -> Option<ClassRef> {
        self.def().parent.map(|id| self.with_id(id))
    }

    /// The topmost ancestor.
    pub fn root(&self) -> ClassRef {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether the type derives from another record type.
    pub fn is_deep_inherited(&self) -> bool {
        self.def().parent.is_some()
    }

    pub fn is_local_subtype(&self) -> bool {
        self.def().local
    }

    /// Reflexive subtype test.
    pub fn is_subclass_of(&self, other: &ClassRef) -> bool {
        if !Arc::ptr_eq(&self.registry, &other.registry) {
            return false;
        }
        let mut current = Some(self.id);
        while let Some(id) = current {
            if id == other.id {
                return true;
            }
            current = self.registry.def(id).parent;
        }
        false
    }

    pub fn subtype_settings(&self) -> &SubtypeSettings {
        &self.def().settings
    }

    /// Name of the type as written into documents, before underscoring.
    pub fn type_const(&self) -> &str {
        &self.def().type_const
    }

    /// Discriminant written into documents for this type.
    pub fn instance_type(&self) -> &str {
        &self.def().instance_type
    }

    /// Identity attributes declared on this type itself.
    pub fn primary_key(&self) -> Option<&[String]> {
        self.def().primary_key.as_deref()
    }

    /// Identity attributes declared on this type or its nearest ancestor
    /// declaring any.
    pub fn inherited_primary_key(&self) -> Option<&[String]> {
        let mut current = Some(self.id);
        while let Some(id) = current {
            let def = self.registry.def(id);
            if let Some(pk) = &def.primary_key {
                return Some(pk);
            }
            current = def.parent;
        }
        None
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        matches!(self.def().field(name), Some((_, FieldDef { slot: Slot::Attribute(_), .. })))
    }

    /// Declared kind of a scalar attribute.
    pub fn attribute_kind(&self, name: &str) -> Option<AttrKind> {
        match self.def().field(name) {
            Some((_, FieldDef { slot: Slot::Attribute(attr), .. })) => Some(attr.kind),
            _ => None,
        }
    }

    /// Names of every stored attribute and association, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.def().fields.iter().map(|f| f.name.as_str())
    }

    pub fn association(&self, name: &str) -> Option<&Arc<AssociationSetup>> {
        self.def().association(name)
    }

    pub fn associations(&self) -> impl Iterator<Item = &Arc<AssociationSetup>> {
        self.def().fields.iter().filter_map(|f| match &f.slot {
            Slot::Association(setup) => Some(setup),
            Slot::Attribute(_) => None,
        })
    }

    /// Local subtype declared directly on this type, by camelized name.
    pub fn local_subtype(&self, name: &str) -> Option<ClassRef> {
        self.def()
            .local_subtypes
            .get(name)
            .map(|&id| self.with_id(id))
    }

    pub(crate) fn def(&self) -> &ClassDef {
        self.registry.def(self.id)
    }

    pub(crate) fn with_id(&self, id: ClassId) -> ClassRef {
        ClassRef {
            registry: Arc::clone(&self.registry),
            id,
        }
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry) && self.id == other.id
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.registry) as usize).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.name())
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct ClassEntry {
    name: String,
    parent: Option<String>,
    declarations: Vec<Declaration>,
}

enum PendingParent {
    None,
    Named(String),
    Id(ClassId),
}

struct Pending {
    name: String,
    registered: bool,
    parent: PendingParent,
    local_name: Option<String>,
    declarations: Vec<Declaration>,
    local_subtypes: BTreeMap<String, ClassId>,
    inline: HashMap<String, ClassId>,
}

impl Pending {
    fn new(name: String, registered: bool, parent: PendingParent, declarations: Vec<Declaration>) -> Self {
        Self {
            name,
            registered,
            parent,
            local_name: None,
            declarations: flatten(declarations),
            local_subtypes: BTreeMap::new(),
            inline: HashMap::new(),
        }
    }
}

/// Collects type declarations and builds a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<ClassEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a base record type.
    pub fn define(&mut self, name: &str, f: impl FnOnce(&mut ClassBuilder)) -> &mut Self {
        self.push(name, None, f)
    }

    /// Declare a record type deriving from `parent`.
    pub fn define_subclass(
        &mut self,
        name: &str,
        parent: &str,
        f: impl FnOnce(&mut ClassBuilder),
    ) -> &mut Self {
        self.push(name, Some(parent.to_string()), f)
    }

    fn push(
        &mut self,
        name: &str,
        parent: Option<String>,
        f: impl FnOnce(&mut ClassBuilder),
    ) -> &mut Self {
        let mut builder = ClassBuilder::new();
        f(&mut builder);
        self.entries.push(ClassEntry {
            name: name.to_string(),
            parent,
            declarations: builder.into_declarations(),
        });
        self
    }

    /// Resolve every declaration and freeze the registry.
    ///
    /// Fails with [`RecordError::Configuration`] for contradictory subtype
    /// options, unknown parents or association types, and malformed
    /// declarations.
    pub fn build(self) -> Result<Arc<Registry>> {
        let mut pending = Vec::with_capacity(self.entries.len());
        let mut by_name = HashMap::new();

        for entry in self.entries {
            validate_type_path(&entry.name)?;
            let name = strip_absolute(&entry.name).to_string();
            let id = ClassId(pending.len());
            if by_name.insert(name.clone(), id).is_some() {
                return Err(RecordError::Configuration(format!(
                    "type {name} is already defined"
                )));
            }
            let parent = entry.parent.map_or(PendingParent::None, PendingParent::Named);
            pending.push(Pending::new(name, true, parent, entry.declarations));
        }

        expand_nested(&mut pending, &mut by_name)?;

        let mut namespaces = HashSet::new();
        for name in by_name.keys() {
            namespaces.extend(namespace_prefixes(name));
        }
        let mut registry = Registry {
            classes: Vec::with_capacity(pending.len()),
            by_name,
            namespaces,
        };

        let parents = resolve_parents(&pending, &registry)?;
        let mut order = Vec::with_capacity(pending.len());
        for idx in 0..pending.len() {
            order.push((depth(&parents, idx, &pending)?, idx));
        }
        order.sort_unstable();

        let mut defs: Vec<Option<ClassDef>> = (0..pending.len()).map(|_| None).collect();
        for (_, idx) in order {
            let def = build_class(ClassId(idx), &pending, &parents, &defs, &registry)?;
            defs[idx] = Some(def);
        }

        registry.classes = defs
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| RecordError::Configuration("incomplete type registry".into()))?;

        debug!(
            classes = registry.classes.len(),
            registered = registry.by_name.len(),
            "type registry built"
        );
        Ok(Arc::new(registry))
    }
}

/// Class name inferred from an association name.
fn inferred_class_name(association: &AssociationDecl) -> String {
    match association.cardinality {
        Cardinality::One => camelize(&association.name),
        Cardinality::Many => camelize(&singularize(&association.name)),
    }
}

/// Allocate local subtypes and inline association types, breadth first.
fn expand_nested(pending: &mut Vec<Pending>, by_name: &mut HashMap<String, ClassId>) -> Result<()> {
    let mut cursor = 0;
    while cursor < pending.len() {
        let owner = ClassId(cursor);
        let owner_name = pending[cursor].name.clone();
        let owner_is_local = pending[cursor].local_name.is_some();
        let declarations = pending[cursor].declarations.clone();

        for declaration in declarations {
            match declaration {
                Declaration::Subtype { name, declarations } => {
                    if owner_is_local {
                        return Err(RecordError::Configuration(format!(
                            "subtyping from local subtype {owner_name} is not supported"
                        )));
                    }
                    let const_name = camelize(&name);
                    validate_type_path(&const_name)?;
                    if pending[cursor].local_subtypes.contains_key(&const_name) {
                        return Err(RecordError::Configuration(format!(
                            "local subtype {const_name} is already defined on {owner_name}"
                        )));
                    }
                    let id = ClassId(pending.len());
                    let mut local = Pending::new(
                        format!("{owner_name}::{LOCAL_TYPES}::{const_name}"),
                        false,
                        PendingParent::Id(owner),
                        declarations,
                    );
                    local.local_name = Some(const_name.clone());
                    pending.push(local);
                    pending[cursor].local_subtypes.insert(const_name, id);
                }
                Declaration::Association(association) => {
                    let ClassSource::Inline { name, declarations } = &association.source else {
                        continue;
                    };
                    let const_name = match name {
                        InlineName::Anonymous | InlineName::Inferred => {
                            inferred_class_name(&association)
                        }
                        InlineName::Explicit(explicit) => {
                            if explicit.contains("::") || validate_type_path(explicit).is_err() {
                                return Err(RecordError::Configuration(format!(
                                    "Bad :class_name option {explicit:?}"
                                )));
                            }
                            explicit.clone()
                        }
                    };
                    let registered = *name != InlineName::Anonymous;
                    let full_name = format!("{owner_name}::{const_name}");
                    let id = ClassId(pending.len());
                    if registered && by_name.insert(full_name.clone(), id).is_some() {
                        return Err(RecordError::Configuration(format!(
                            "type {full_name} is already defined"
                        )));
                    }
                    pending.push(Pending::new(
                        full_name,
                        registered,
                        PendingParent::None,
                        declarations.clone(),
                    ));
                    pending[cursor].inline.insert(association.name.clone(), id);
                }
                _ => {}
            }
        }
        cursor += 1;
    }
    Ok(())
}

fn resolve_parents(pending: &[Pending], registry: &Registry) -> Result<Vec<Option<ClassId>>> {
    pending
        .iter()
        .map(|p| match &p.parent {
            PendingParent::None => Ok(None),
            PendingParent::Id(id) => Ok(Some(*id)),
            PendingParent::Named(parent) => match registry.constantize(parent) {
                Some(Constant::Class(id)) => Ok(Some(id)),
                _ => Err(RecordError::Configuration(format!(
                    "unknown parent type '{parent}' for '{}'",
                    p.name
                ))),
            },
        })
        .collect()
}

fn depth(parents: &[Option<ClassId>], idx: usize, pending: &[Pending]) -> Result<usize> {
    let mut steps = 0;
    let mut current = parents[idx];
    while let Some(parent) = current {
        steps += 1;
        if steps > parents.len() {
            return Err(RecordError::Configuration(format!(
                "inheritance cycle involving '{}'",
                pending[idx].name
            )));
        }
        current = parents[parent.0];
    }
    Ok(steps)
}

fn settings_for_root(
    registry: &Registry,
    owner: &str,
    options: Option<SubtypeOptions>,
) -> Result<SubtypeSettings> {
    let options = options.unwrap_or_default();
    let mode = match &options.namespace {
        Some(namespace) => match registry.lookup_const(owner, namespace) {
            Some((path, _)) => ResolutionMode::Namespace(path),
            None => {
                return Err(RecordError::Configuration(format!(
                    "failed to locate subtypes namespace '{namespace}' from '{owner}'"
                )))
            }
        },
        None if options.full.unwrap_or(true) => ResolutionMode::Full,
        None => ResolutionMode::Nearest,
    };
    Ok(SubtypeSettings {
        mode,
        underscored: options.underscored,
    })
}

fn upsert_field(fields: &mut Vec<FieldDef>, index: &mut HashMap<String, usize>, field: FieldDef) {
    match index.get(&field.name) {
        Some(&idx) => fields[idx] = field,
        None => {
            index.insert(field.name.clone(), fields.len());
            fields.push(field);
        }
    }
}

/// Attribute and association names an inline type exposes to its owner.
fn accessor_names(declarations: &[Declaration]) -> Vec<String> {
    let mut names = Vec::new();
    for declaration in declarations {
        match declaration {
            Declaration::Attribute(attr) => names.push(attr.name.clone()),
            Declaration::Association(association) => {
                names.push(association.name.clone());
                if let Some(writer) = association_writer_name(association) {
                    names.push(writer);
                }
            }
            _ => {}
        }
    }
    names
}

fn association_writer_name(association: &AssociationDecl) -> Option<String> {
    match association.writer {
        AttributesWriter::Enabled { .. } => Some(format!("{}{ATTRIBUTES_SUFFIX}", association.name)),
        AttributesWriter::Disabled => None,
    }
}

fn build_class(
    id: ClassId,
    pending: &[Pending],
    parents: &[Option<ClassId>],
    defs: &[Option<ClassDef>],
    registry: &Registry,
) -> Result<ClassDef> {
    let entry = &pending[id.0];
    let parent = parents[id.0];
    let parent_def = match parent {
        Some(pid) => Some(defs[pid.0].as_ref().ok_or_else(|| {
            RecordError::Configuration(format!("parent of '{}' is not built", entry.name))
        })?),
        None => None,
    };

    let mut fields = parent_def.map(|d| d.fields.clone()).unwrap_or_default();
    let mut index = parent_def.map(|d| d.field_index.clone()).unwrap_or_default();
    let mut transient = parent_def.map(|d| d.transient.clone()).unwrap_or_default();
    let mut validators = parent_def.map(|d| d.validators.clone()).unwrap_or_default();
    let mut hooks = parent_def.map(|d| d.hooks.clone()).unwrap_or_default();
    let mut delegations = parent_def.map(|d| d.delegations.clone()).unwrap_or_default();

    if parent.is_some() && !index.contains_key(TYPE_ATTRIBUTE) {
        upsert_field(
            &mut fields,
            &mut index,
            FieldDef {
                name: TYPE_ATTRIBUTE.into(),
                slot: Slot::Attribute(AttributeDecl::new(TYPE_ATTRIBUTE, AttrKind::String)),
            },
        );
    }

    let mut primary_key = None;
    let mut subtype_options: Option<SubtypeOptions> = None;

    for declaration in &entry.declarations {
        match declaration {
            Declaration::Attribute(attr) => {
                if attr.primary {
                    primary_key = Some(vec![attr.name.clone()]);
                }
                upsert_field(
                    &mut fields,
                    &mut index,
                    FieldDef {
                        name: attr.name.clone(),
                        slot: Slot::Attribute(attr.clone()),
                    },
                );
            }
            Declaration::Transient(name) => {
                if !transient.contains(name) {
                    transient.push(name.clone());
                }
            }
            Declaration::PrimaryKey(attributes) => {
                if attributes.is_empty() {
                    return Err(RecordError::Configuration(format!(
                        "primary_key of '{}' cannot be an empty array",
                        entry.name
                    )));
                }
                primary_key = Some(attributes.clone());
            }
            Declaration::Subtypes(options) => {
                if parent.is_some() {
                    return Err(RecordError::Configuration(format!(
                        ".subtypes is supported only for base classes, not '{}'",
                        entry.name
                    )));
                }
                if subtype_options.is_some() {
                    return Err(RecordError::Configuration(format!(
                        ".subtypes is declared twice on '{}'",
                        entry.name
                    )));
                }
                if options.full == Some(true) && options.namespace.is_some() {
                    return Err(RecordError::Configuration(
                        ":full and :namespace options cannot be used together".into(),
                    ));
                }
                subtype_options = Some(options.clone());
            }
            Declaration::Association(association) => {
                let setup = build_association(id, entry, association, pending, registry)?;
                if association.delegate_accessors {
                    if let Some(&inline) = entry.inline.get(&association.name) {
                        for accessor in accessor_names(&pending[inline.0].declarations) {
                            delegations.insert(accessor, association.name.clone());
                        }
                    }
                }
                upsert_field(
                    &mut fields,
                    &mut index,
                    FieldDef {
                        name: association.name.clone(),
                        slot: Slot::Association(Arc::new(setup)),
                    },
                );
            }
            Declaration::Validate(validator) => validators.push(validator.clone()),
            Declaration::AfterInitialize(hook) => hooks.push(hook.clone()),
            Declaration::Subtype { .. } | Declaration::Include(_) => {}
        }
    }

    let settings = match parent_def {
        Some(parent_def) => parent_def.settings.clone(),
        None => settings_for_root(registry, &entry.name, subtype_options)?,
    };

    let type_const = match (&entry.local_name, &settings.mode) {
        (Some(local), _) => local.clone(),
        (None, ResolutionMode::Namespace(namespace)) => entry
            .name
            .strip_prefix(&format!("{namespace}::"))
            .unwrap_or(&entry.name)
            .to_string(),
        (None, _) => entry.name.clone(),
    };
    let instance_type = if settings.underscored {
        underscore(&type_const)
    } else {
        type_const.clone()
    };

    Ok(ClassDef {
        name: entry.name.clone(),
        registered: entry.registered,
        parent,
        local: entry.local_name.is_some(),
        type_const,
        instance_type,
        settings,
        fields,
        field_index: index,
        transient,
        primary_key,
        local_subtypes: entry.local_subtypes.clone(),
        validators,
        hooks,
        delegations,
    })
}

fn build_association(
    owner: ClassId,
    entry: &Pending,
    association: &AssociationDecl,
    pending: &[Pending],
    registry: &Registry,
) -> Result<AssociationSetup> {
    let record_class = match &association.source {
        ClassSource::Inline { .. } => entry.inline.get(&association.name).copied().ok_or_else(|| {
            RecordError::Configuration(format!(
                "inline type of '{}' on '{}' was not allocated",
                association.name, entry.name
            ))
        })?,
        ClassSource::Named(class_name) => {
            if validate_type_path(class_name).is_err() {
                return Err(RecordError::Configuration(format!(
                    "Bad :class_name option {class_name:?}"
                )));
            }
            locate_record_class(registry, entry, association, class_name)?
        }
        ClassSource::Inferred => {
            locate_record_class(registry, entry, association, &inferred_class_name(association))?
        }
    };

    if pending[record_class.0].local_name.is_some() {
        return Err(RecordError::Configuration(format!(
            "association '{}' cannot use local subtype as its record type",
            association.name
        )));
    }
    if association.primary_key.as_ref().is_some_and(Vec::is_empty) {
        return Err(RecordError::Configuration(format!(
            "primary_key of association '{}' cannot be an empty array",
            association.name
        )));
    }

    Ok(AssociationSetup {
        name: association.name.clone(),
        owner,
        cardinality: association.cardinality,
        record_class,
        writer: association.writer.clone(),
        primary_key: association.primary_key.clone(),
        default: association.default.clone(),
    })
}

fn locate_record_class(
    registry: &Registry,
    entry: &Pending,
    association: &AssociationDecl,
    class_name: &str,
) -> Result<ClassId> {
    match registry.lookup_const(&entry.name, class_name) {
        Some((_, Constant::Class(id))) => Ok(id),
        _ => Err(RecordError::Configuration(format!(
            "failed to locate record type '{class_name}' for association '{}' of '{}'",
            association.name, entry.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::Declare;

    fn shapes() -> Arc<Registry> {
        let mut builder = Registry::builder();
        builder
            .define("Shapes::Shape", |c| {
                c.attribute("id", AttrKind::Integer).primary_key(["id"]);
            })
            .define_subclass("Shapes::Circle", "Shapes::Shape", |c| {
                c.attribute("radius", AttrKind::Float);
            })
            .define_subclass("Shapes::Ring", "Shapes::Circle", |c| {
                c.attribute("inner", AttrKind::Float);
            });
        builder.build().unwrap()
    }

    #[test]
    fn flattened_fields_follow_ancestry() {
        let registry = shapes();
        let ring = registry.class("Shapes::Ring").unwrap();
        let names: Vec<&str> = ring.field_names().collect();
        assert_eq!(names, ["id", "type", "radius", "inner"]);
        assert!(ring.is_deep_inherited());
        assert!(!registry.class("Shapes::Shape").unwrap().is_deep_inherited());
    }

    #[test]
    fn subclass_relation_is_reflexive_and_directed() {
        let registry = shapes();
        let shape = registry.class("Shapes::Shape").unwrap();
        let ring = registry.class("::Shapes::Ring").unwrap();
        assert!(ring.is_subclass_of(&shape));
        assert!(shape.is_subclass_of(&shape));
        assert!(!shape.is_subclass_of(&ring));
        assert_eq!(ring.root(), shape);
    }

    #[test]
    fn primary_key_is_inherited() {
        let registry = shapes();
        let circle = registry.class("Shapes::Circle").unwrap();
        assert_eq!(circle.primary_key(), None);
        assert_eq!(circle.inherited_primary_key(), Some(&["id".to_string()][..]));
    }

    #[test]
    fn namespaces_are_constants() {
        let registry = shapes();
        assert_eq!(registry.constantize("Shapes"), Some(Constant::Namespace));
        assert!(matches!(registry.constantize("::Shapes::Circle"), Some(Constant::Class(_))));
        assert_eq!(registry.constantize("Circle"), None);
        assert!(matches!(
            registry.lookup_const("Shapes::Shape", "Circle"),
            Some((path, Constant::Class(_))) if path == "Shapes::Circle"
        ));
    }

    #[test]
    fn full_and_namespace_conflict() {
        let mut builder = Registry::builder();
        builder.define("Shapes::Shape", |c| {
            c.subtypes(SubtypeOptions::new().full(true).namespace("Shapes"));
        });
        assert!(matches!(builder.build(), Err(RecordError::Configuration(_))));
    }

    #[test]
    fn subtypes_only_on_base_classes() {
        let mut builder = Registry::builder();
        builder
            .define("Shape", |_| {})
            .define_subclass("Circle", "Shape", |c| {
                c.subtypes(SubtypeOptions::new().underscored());
            });
        assert!(matches!(builder.build(), Err(RecordError::Configuration(_))));
    }

    #[test]
    fn empty_primary_key_rejected() {
        let mut builder = Registry::builder();
        builder.define("Shape", |c| {
            c.primary_key(Vec::<String>::new());
        });
        assert!(matches!(builder.build(), Err(RecordError::Configuration(_))));
    }

    #[test]
    fn unknown_association_type_rejected() {
        let mut builder = Registry::builder();
        builder.define("Foo", |c| {
            c.has_many("bars", |_| {});
        });
        let err = builder.build().unwrap_err();
        assert!(matches!(err, RecordError::Configuration(msg) if msg.contains("Bar")));
    }

    #[test]
    fn association_type_found_from_owner_scope() {
        let mut builder = Registry::builder();
        builder
            .define("A::Foo", |c| {
                c.has_many("bars", |_| {}).has_one("baz", |a| {
                    a.class_name("Bar");
                });
            })
            .define("A::Bar", |_| {});
        let registry = builder.build().unwrap();
        let foo = registry.class("A::Foo").unwrap();
        let bars = foo.association("bars").unwrap();
        assert_eq!(bars.record_class(&foo).name(), "A::Bar");
        assert_eq!(foo.association("baz").unwrap().record_class(&foo).name(), "A::Bar");
    }

    #[test]
    fn bad_class_name_rejected() {
        let mut builder = Registry::builder();
        builder.define("Foo", |c| {
            c.has_one("bar", |a| {
                a.class_name("not a path");
            });
        });
        assert!(matches!(builder.build(), Err(RecordError::Configuration(_))));
    }

    #[test]
    fn unknown_parent_rejected() {
        let mut builder = Registry::builder();
        builder.define_subclass("Circle", "Shape", |_| {});
        assert!(matches!(builder.build(), Err(RecordError::Configuration(_))));
    }

    #[test]
    fn inline_types_are_named_under_owner() {
        let mut builder = Registry::builder();
        builder.define("Foo", |c| {
            c.has_many("points", |a| {
                a.named_inline().inline(|c| {
                    c.attribute("x", AttrKind::Integer);
                });
            })
            .has_one("meta", |a| {
                a.inline(|c| {
                    c.attribute("tag", AttrKind::String);
                });
            });
        });
        let registry = builder.build().unwrap();
        assert!(registry.class("Foo::Point").is_some());
        assert!(registry.class("Foo::Meta").is_none());
        let foo = registry.class("Foo").unwrap();
        let meta = foo.association("meta").unwrap().record_class(&foo);
        assert!(!meta.is_registered());
        assert!(meta.has_attribute("tag"));
    }

    #[test]
    fn local_subtypes_cannot_be_subtyped() {
        let mut builder = Registry::builder();
        builder.define("Foo", |c| {
            c.subtype("bar", |c| {
                c.subtype("baz", |_| {});
            });
        });
        assert!(matches!(builder.build(), Err(RecordError::Configuration(_))));
    }

    #[test]
    fn duplicate_definitions_rejected() {
        let mut builder = Registry::builder();
        builder.define("Foo", |_| {}).define("::Foo", |_| {});
        assert!(matches!(builder.build(), Err(RecordError::Configuration(_))));
    }

    #[test]
    fn namespace_discriminants_strip_prefix() {
        let mut builder = Registry::builder();
        builder
            .define("A::Shape", |c| {
                c.subtypes(SubtypeOptions::new().namespace("Kinds").underscored());
            })
            .define_subclass("A::Kinds::BigCircle", "A::Shape", |_| {});
        let registry = builder.build().unwrap();
        let circle = registry.class("A::Kinds::BigCircle").unwrap();
        assert_eq!(
            circle.subtype_settings().mode,
            ResolutionMode::Namespace("A::Kinds".into())
        );
        assert_eq!(circle.type_const(), "BigCircle");
        assert_eq!(circle.instance_type(), "big_circle");
    }
}
