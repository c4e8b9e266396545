//! Type-path names and inflection.
//!
//! Record types are registered under `::`-separated paths such as
//! `Shapes::Circle`. Valid paths:
//! - May start with `::` (absolute marker)
//! - Consist of non-empty segments separated by `::`
//! - Each segment starts with an ASCII uppercase letter
//! - Each segment contains only ASCII alphanumerics and `_`
//!
//! Discriminants stored in documents are either such paths or their
//! underscored form (`shapes/circle`); [`camelize`] and [`underscore`]
//! convert between the two.

use heck::ToSnakeCase;

use crate::error::TypeError;

/// Separator between type-path segments.
pub const SEPARATOR: &str = "::";

/// Plural forms that do not follow the suffix rules.
const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
];

/// Validate a type path, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use nested_types::names::validate_type_path;
///
/// assert!(validate_type_path("Shape").is_ok());
/// assert!(validate_type_path("::Shapes::Circle").is_ok());
/// assert!(validate_type_path("shapes").is_err());
/// assert!(validate_type_path("A::::B").is_err());
/// ```
pub fn validate_type_path(name: &str) -> Result<(), TypeError> {
    let path = strip_absolute(name);
    if path.is_empty() {
        return Err(TypeError::InvalidPath {
            name: name.to_string(),
            reason: "type path must not be empty".into(),
        });
    }

    for segment in path.split(SEPARATOR) {
        let mut chars = segment.chars();
        match chars.next() {
            None => {
                return Err(TypeError::InvalidPath {
                    name: name.to_string(),
                    reason: "path segments must not be empty".into(),
                });
            }
            Some(first) if !first.is_ascii_uppercase() => {
                return Err(TypeError::InvalidPath {
                    name: name.to_string(),
                    reason: format!("segment must start with an uppercase letter: {segment:?}"),
                });
            }
            Some(_) => {}
        }
        if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            return Err(TypeError::InvalidPath {
                name: name.to_string(),
                reason: format!("contains forbidden character: {bad:?}"),
            });
        }
    }

    Ok(())
}

/// Returns `true` if `name` carries the leading `::` absolute marker.
pub fn is_absolute(name: &str) -> bool {
    name.starts_with(SEPARATOR)
}

/// `name` without its absolute marker.
pub fn strip_absolute(name: &str) -> &str {
    name.strip_prefix(SEPARATOR).unwrap_or(name)
}

/// The enclosing namespace of a path (`A::B::C` -> `A::B`).
pub fn parent_namespace(path: &str) -> Option<&str> {
    strip_absolute(path)
        .rsplit_once(SEPARATOR)
        .map(|(parent, _)| parent)
}

/// The last segment of a path (`A::B::C` -> `C`).
pub fn demodulize(path: &str) -> &str {
    path.rsplit_once(SEPARATOR).map_or(path, |(_, last)| last)
}

/// Every proper namespace prefix of a path, outermost first
/// (`A::B::C` -> `A`, `A::B`).
pub fn namespace_prefixes(path: &str) -> Vec<String> {
    let segments: Vec<&str> = strip_absolute(path).split(SEPARATOR).collect();
    (1..segments.len())
        .map(|n| segments[..n].join(SEPARATOR))
        .collect()
}

/// Candidate absolute paths for `name` looked up from inside `owner`.
///
/// Candidates run from the innermost scope (`owner` itself) outward and end
/// with the bare name. An absolute `name` yields only itself.
///
/// ```
/// use nested_types::names::nesting_candidates;
///
/// assert_eq!(
///     nesting_candidates("A::Foo", "Bar"),
///     vec!["A::Foo::Bar", "A::Bar", "Bar"],
/// );
/// ```
pub fn nesting_candidates(owner: &str, name: &str) -> Vec<String> {
    if is_absolute(name) {
        return vec![strip_absolute(name).to_string()];
    }
    let segments: Vec<&str> = strip_absolute(owner)
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect();
    let mut candidates: Vec<String> = (1..=segments.len())
        .rev()
        .map(|n| format!("{}{SEPARATOR}{name}", segments[..n].join(SEPARATOR)))
        .collect();
    candidates.push(name.to_string());
    candidates
}

/// Convert a stored discriminant into a type path.
///
/// A leading run of lowercase letters and digits is capitalized, `_` joins
/// words (`foo_bar` -> `FooBar`), and `/` becomes the `::` separator
/// (`shapes/circle` -> `Shapes::Circle`). Segments already in type-path form
/// are left untouched.
pub fn camelize(term: &str) -> String {
    let chars: Vec<char> = term.chars().collect();
    let mut out = String::with_capacity(term.len() + 4);

    let lead = chars
        .iter()
        .position(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .unwrap_or(chars.len());
    push_capitalized(&mut out, &chars[..lead]);

    let mut i = lead;
    while i < chars.len() {
        let c = chars[i];
        if c == '_' || c == '/' {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|c| !c.is_ascii_alphanumeric())
                .map_or(chars.len(), |p| start + p);
            if c == '/' {
                out.push_str(SEPARATOR);
            }
            push_capitalized(&mut out, &chars[start..end]);
            i = end;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn push_capitalized(out: &mut String, word: &[char]) {
    if let Some((first, rest)) = word.split_first() {
        out.push(first.to_ascii_uppercase());
        out.extend(rest.iter().map(|c| c.to_ascii_lowercase()));
    }
}

/// Convert a type path into its underscored discriminant
/// (`Shapes::BigCircle` -> `shapes/big_circle`).
///
/// Acronyms are not preserved: `HTMLBlock` underscores to `html_block`,
/// which camelizes back to `HtmlBlock`. Types of an underscored hierarchy
/// should spell acronyms as words (`HtmlBlock`) so their discriminants
/// resolve back to them.
pub fn underscore(path: &str) -> String {
    if !path.contains(SEPARATOR) && !path.chars().any(|c| c.is_ascii_uppercase() || c == '-') {
        return path.to_string();
    }
    strip_absolute(path)
        .split(SEPARATOR)
        .map(|segment| segment.to_snake_case())
        .collect::<Vec<_>>()
        .join("/")
}

/// Best-effort singular form of an English plural (`bars` -> `bar`).
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if let Some((_, singular)) = IRREGULAR_PLURALS.iter().find(|(plural, _)| *plural == lower) {
        return singular.to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        if stem.chars().last().is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{stem}y");
        }
    }
    if word.ends_with("ouses") {
        return word[..word.len() - 1].to_string();
    }
    for suffix in ["sses", "xes", "ches", "shes", "zzes", "uses"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") {
        return word.to_string();
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_paths() {
        assert!(validate_type_path("Foo").is_ok());
        assert!(validate_type_path("A::B::Foo").is_ok());
        assert!(validate_type_path("::A::Foo_Bar2").is_ok());
    }

    #[test]
    fn reject_invalid_paths() {
        assert!(validate_type_path("").is_err());
        assert!(validate_type_path("::").is_err());
        assert!(validate_type_path("foo").is_err());
        assert!(validate_type_path("A::").is_err());
        assert!(validate_type_path("A::b").is_err());
        assert!(validate_type_path("A B").is_err());
        assert!(validate_type_path("A/B").is_err());
    }

    #[test]
    fn nesting_candidates_run_innermost_first() {
        assert_eq!(
            nesting_candidates("A::B::Foo", "Bar"),
            vec!["A::B::Foo::Bar", "A::B::Bar", "A::Bar", "Bar"]
        );
        assert_eq!(nesting_candidates("Foo", "Bar"), vec!["Foo::Bar", "Bar"]);
    }

    #[test]
    fn nesting_candidates_absolute_name() {
        assert_eq!(nesting_candidates("A::Foo", "::Bar"), vec!["Bar"]);
    }

    #[test]
    fn namespace_helpers() {
        assert_eq!(parent_namespace("A::B::C"), Some("A::B"));
        assert_eq!(parent_namespace("C"), None);
        assert_eq!(demodulize("A::B::C"), "C");
        assert_eq!(namespace_prefixes("A::B::C"), vec!["A", "A::B"]);
        assert!(namespace_prefixes("C").is_empty());
    }

    #[test]
    fn camelize_words_and_paths() {
        assert_eq!(camelize("circle"), "Circle");
        assert_eq!(camelize("big_circle"), "BigCircle");
        assert_eq!(camelize("bar/foo"), "Bar::Foo");
        assert_eq!(camelize("a/bar/foo"), "A::Bar::Foo");
        assert_eq!(camelize("A::Foo"), "A::Foo");
        assert_eq!(camelize("::Foo"), "::Foo");
        assert_eq!(camelize("HTMLBlock"), "HTMLBlock");
    }

    #[test]
    fn underscore_paths() {
        assert_eq!(underscore("A::Bar::Foo"), "a/bar/foo");
        assert_eq!(underscore("BigCircle"), "big_circle");
        assert_eq!(underscore("foo"), "foo");
    }

    #[test]
    fn acronyms_do_not_survive_underscoring() {
        assert_eq!(underscore("HTMLBlock"), "html_block");
        assert_eq!(camelize(&underscore("HTMLBlock")), "HtmlBlock");
        assert_eq!(camelize(&underscore("HtmlBlock")), "HtmlBlock");
    }

    #[test]
    fn singularize_common_plurals() {
        assert_eq!(singularize("bars"), "bar");
        assert_eq!(singularize("points"), "point");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("statuses"), "status");
        assert_eq!(singularize("address"), "address");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("days"), "day");
        assert_eq!(singularize("houses"), "house");
    }

    proptest! {
        #[test]
        fn underscore_then_camelize_restores_simple_paths(
            segments in proptest::collection::vec("[A-Z][a-z]{1,6}([A-Z][a-z]{1,6})?", 1..4)
        ) {
            let path = segments.join(SEPARATOR);
            prop_assert_eq!(camelize(&underscore(&path)), path);
        }
    }
}
