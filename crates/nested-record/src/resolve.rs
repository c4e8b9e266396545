//! Subtype resolution.
//!
//! Maps a discriminant stored in a document to a concrete type within the
//! hierarchy of a base type. Lookup order:
//!
//! 1. local subtypes declared on the base type,
//! 2. absolute paths (`::A::Foo`) and hierarchies in full mode: exact path,
//! 3. namespace mode: `<namespace>::<name>`, then the name as-is,
//! 4. nearest mode: from the base type's scope outward.
//!
//! The result must be the base type or one of its descendants.

use nested_types::camelize;
use nested_types::names::is_absolute;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{RecordError, Result};
use crate::registry::{ClassRef, Constant, ResolutionMode, TYPE_ATTRIBUTE};

/// The discriminant of a raw payload, if any. Non-string values are
/// rendered as text.
pub fn discriminant(attributes: &Map<String, Value>) -> Option<String> {
    match attributes.get(TYPE_ATTRIBUTE)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl ClassRef {
    /// Resolve `type_name` to a concrete type of this hierarchy.
    ///
    /// An absent or blank name resolves to `self`.
    pub fn find_subtype(&self, type_name: Option<&str>) -> Result<ClassRef> {
        let Some(raw) = type_name.filter(|name| !name.trim().is_empty()) else {
            return Ok(self.clone());
        };
        let normalized = camelize(raw);

        if let Some(local) = self.local_subtype(&normalized) {
            trace!(base = self.name(), resolved = local.name(), "resolved local subtype");
            return Ok(local);
        }

        let registry = self.registry();
        let found = if is_absolute(&normalized) {
            registry.constantize(&normalized)
        } else {
            match &self.subtype_settings().mode {
                ResolutionMode::Full => registry.constantize(&normalized),
                ResolutionMode::Namespace(namespace) => registry
                    .constantize(&format!("{namespace}::{normalized}"))
                    .or_else(|| registry.constantize(&normalized)),
                ResolutionMode::Nearest => registry
                    .lookup_const(self.name(), &normalized)
                    .map(|(_, constant)| constant),
            }
        };

        let id = match found {
            Some(Constant::Class(id)) => id,
            Some(Constant::Namespace) => {
                return Err(RecordError::InvalidType {
                    type_name: normalized,
                    reason: "should be a class".into(),
                })
            }
            None => {
                return Err(RecordError::InvalidType {
                    type_name: normalized,
                    reason: "failed to locate type".into(),
                })
            }
        };

        let candidate = self.with_id(id);
        if !candidate.is_subclass_of(self) {
            return Err(RecordError::InvalidType {
                type_name: normalized,
                reason: format!("should be a subclass of {}", self.name()),
            });
        }
        trace!(base = self.name(), resolved = candidate.name(), "resolved subtype");
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::declare::{Declare, SubtypeOptions};
    use crate::registry::Registry;
    use nested_types::AttrKind;
    use proptest::prelude::*;
    use serde_json::json;

    fn registry_with(options: SubtypeOptions) -> Arc<Registry> {
        let mut builder = Registry::builder();
        builder
            .define("A::Foo", move |c| {
                c.attribute("x", AttrKind::Integer).subtypes(options);
            })
            .define_subclass("A::Foo::Bar", "A::Foo", |_| {})
            .define_subclass("A::Bar", "A::Foo", |_| {})
            .define_subclass("A::Bars::Baz", "A::Foo", |_| {})
            .define_subclass("Bar", "A::Foo", |_| {})
            .define("Other", |_| {});
        builder.build().unwrap()
    }

    fn resolve(registry: &Arc<Registry>, name: &str) -> Result<String> {
        let base = registry.class("A::Foo").unwrap();
        base.find_subtype(Some(name)).map(|c| c.name().to_string())
    }

    #[test]
    fn absent_or_blank_names_resolve_to_base() {
        let registry = registry_with(SubtypeOptions::new());
        let base = registry.class("A::Foo").unwrap();
        assert_eq!(base.find_subtype(None).unwrap(), base);
        assert_eq!(base.find_subtype(Some("  ")).unwrap(), base);
    }

    #[test]
    fn full_mode_requires_exact_paths() {
        let registry = registry_with(SubtypeOptions::new());
        assert_eq!(resolve(&registry, "A::Bar").unwrap(), "A::Bar");
        assert_eq!(resolve(&registry, "a/bar").unwrap(), "A::Bar");
        assert_eq!(resolve(&registry, "Bar").unwrap(), "Bar");
    }

    #[test]
    fn nearest_mode_prefers_inner_scopes() {
        let registry = registry_with(SubtypeOptions::new().full(false));
        assert_eq!(resolve(&registry, "Bar").unwrap(), "A::Foo::Bar");
        assert_eq!(resolve(&registry, "::Bar").unwrap(), "Bar");
        assert_eq!(resolve(&registry, "bars/baz").unwrap(), "A::Bars::Baz");
    }

    #[test]
    fn namespace_mode_falls_back_to_plain_path() {
        let registry = registry_with(SubtypeOptions::new().namespace("Bars"));
        assert_eq!(resolve(&registry, "Baz").unwrap(), "A::Bars::Baz");
        assert_eq!(resolve(&registry, "A::Bar").unwrap(), "A::Bar");
        assert!(matches!(
            resolve(&registry, "Missing"),
            Err(RecordError::InvalidType { .. })
        ));
    }

    #[test]
    fn namespaces_are_not_types() {
        let registry = registry_with(SubtypeOptions::new());
        let err = resolve(&registry, "A::Bars").unwrap_err();
        assert!(matches!(err, RecordError::InvalidType { reason, .. } if reason == "should be a class"));
    }

    #[test]
    fn unrelated_types_rejected() {
        let registry = registry_with(SubtypeOptions::new());
        let err = resolve(&registry, "Other").unwrap_err();
        assert!(
            matches!(err, RecordError::InvalidType { reason, .. } if reason.contains("subclass"))
        );
        let bar = registry.class("A::Bar").unwrap();
        assert!(bar.find_subtype(Some("A::Foo")).is_err());
    }

    #[test]
    fn local_subtypes_resolve_first() {
        let mut builder = Registry::builder();
        builder
            .define("Baz", |c| {
                c.subtype("foo", |c| {
                    c.attribute("x", AttrKind::Integer);
                });
            })
            .define_subclass("Foo", "Baz", |_| {});
        let registry = builder.build().unwrap();
        let baz = registry.class("Baz").unwrap();
        let local = baz.find_subtype(Some("foo")).unwrap();
        assert!(local.is_local_subtype());
        assert!(local.is_subclass_of(&baz));
        assert_eq!(local.instance_type(), "Foo");
        assert!(registry.class("Baz::LocalTypes::Foo").is_none());
    }

    #[test]
    fn discriminant_reads_type_key() {
        let payload = json!({"type": "Bar", "x": 1});
        assert_eq!(discriminant(payload.as_object().unwrap()).as_deref(), Some("Bar"));
        let payload = json!({"type": null});
        assert_eq!(discriminant(payload.as_object().unwrap()), None);
    }

    proptest! {
        #[test]
        fn instance_type_resolves_back(underscored in any::<bool>(), pick in 0usize..4) {
            let options = if underscored {
                SubtypeOptions::new().underscored()
            } else {
                SubtypeOptions::new()
            };
            let registry = registry_with(options);
            let base = registry.class("A::Foo").unwrap();
            let names = ["A::Foo", "A::Foo::Bar", "A::Bar", "A::Bars::Baz"];
            let class = registry.class(names[pick]).unwrap();
            let resolved = base.find_subtype(Some(class.instance_type())).unwrap();
            prop_assert_eq!(resolved, class);
        }
    }
}
