//! Static introspection of a generated file map.
//!
//! The artifact is loaded the way an importer would see it, without
//! executing anything: class declarations become entities, route
//! decorators become endpoints, and entries in the `VALIDATIONS` registry
//! become validation rules.

use devmatrix_core::model::compliance::RuleTriple;
use devmatrix_core::model::endpoint::HttpMethod;
use devmatrix_core::model::file_map::FileMap;
use devmatrix_core::model::validation::RuleKind;
use devmatrix_core::{Error, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// What the generated application exposes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactSurface {
    /// Declared entity class names
    pub entities: Vec<String>,
    /// Declared (method, path) routes
    pub endpoints: Vec<(HttpMethod, String)>,
    /// Registered validation rule triples
    pub validations: Vec<RuleTriple>,
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"(?m)^class\s+([A-Z][A-Za-z0-9_]*)\s*[(:]").unwrap())
}

fn route_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| {
        Regex::new(r#"@(?:app|router)\.(get|post|put|delete|patch)\(\s*"([^"]+)""#).unwrap()
    })
}

fn validation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| {
        Regex::new(r#"\(\s*"([A-Za-z0-9_]+)"\s*,\s*"([A-Za-z0-9_]*)"\s*,\s*"([a-z_]+)"\s*\)"#)
            .unwrap()
    })
}

/// Whether a path holds entity declarations by convention.
fn is_entity_source(path: &str) -> bool {
    path == "entities.py" || path.starts_with("models/")
}

/// Whether a path holds route declarations by convention.
fn is_route_source(path: &str) -> bool {
    path.starts_with("routes/") || path == "main.py" || path == "app.py"
}

/// Introspect the artifact.
///
/// Fails (the static analogue of an import failure) when the file map is
/// empty or a Python source is not readable as text.
pub fn introspect(files: &FileMap) -> Result<ArtifactSurface> {
    if files.is_empty() {
        return Err(Error::External("artifact file map is empty".into()));
    }

    let mut surface = ArtifactSurface::default();
    let mut seen_entities = BTreeSet::new();
    let mut seen_endpoints = BTreeSet::new();
    let mut seen_validations = BTreeSet::new();

    for (path, contents) in files.iter() {
        if !path.ends_with(".py") {
            continue;
        }
        let Some(text) = contents.as_text() else {
            return Err(Error::External(format!(
                "source file '{path}' is not readable as text"
            )));
        };

        if is_entity_source(path) {
            for capture in class_re().captures_iter(text) {
                let name = capture[1].to_string();
                if seen_entities.insert(name.clone()) {
                    surface.entities.push(name);
                }
            }
        }

        if is_route_source(path) {
            for capture in route_re().captures_iter(text) {
                #[allow(clippy::unwrap_used)]
                let method: HttpMethod = capture[1].parse().unwrap();
                let route = (method, capture[2].to_string());
                if seen_endpoints.insert(route.clone()) {
                    surface.endpoints.push(route);
                }
            }
        }

        if text.contains("VALIDATIONS") {
            for capture in validation_re().captures_iter(text) {
                let Ok(kind) = serde_json::from_value::<RuleKind>(serde_json::Value::String(
                    capture[3].to_string(),
                )) else {
                    continue;
                };
                let triple = RuleTriple::new(&capture[1], &capture[2], kind);
                if seen_validations.insert((
                    triple.entity.clone(),
                    triple.attribute.clone(),
                    kind,
                )) {
                    surface.validations.push(triple);
                }
            }
        }
    }

    Ok(surface)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> FileMap {
        let mut map = FileMap::new();
        for (path, contents) in entries {
            map.insert(*path, *contents).unwrap();
        }
        map
    }

    #[test]
    fn classes_in_entity_sources_are_entities() {
        let map = files(&[
            (
                "entities.py",
                "class User(Base):\n    pass\n\nclass Order(Base):\n    pass\n",
            ),
            ("services/users.py", "class NotAnEntity:\n    pass\n"),
        ]);
        let surface = introspect(&map).unwrap();
        assert_eq!(surface.entities, vec!["User", "Order"]);
    }

    #[test]
    fn route_decorators_become_endpoints() {
        let map = files(&[
            (
                "routes/users.py",
                "@router.get(\"/users\")\ndef list_users(): ...\n@router.post(\"/users\")\ndef create_user(): ...\n",
            ),
            ("entities.py", "class User:\n    pass\n"),
        ]);
        let surface = introspect(&map).unwrap();
        assert_eq!(surface.endpoints.len(), 2);
        assert!(surface
            .endpoints
            .contains(&(HttpMethod::Post, "/users".to_string())));
    }

    #[test]
    fn validation_registry_entries_are_parsed() {
        let map = files(&[(
            "schemas.py",
            r#"VALIDATIONS = [
    ("User", "email", "uniqueness"),
    ("User", "email", "presence"),
    ("User", "name", "not_a_kind"),
]
"#,
        )]);
        let surface = introspect(&map).unwrap();
        assert_eq!(surface.validations.len(), 2);
        assert_eq!(surface.validations[0].kind, RuleKind::Uniqueness);
    }

    #[test]
    fn empty_file_map_fails_like_an_import_error() {
        assert!(introspect(&FileMap::new()).is_err());
    }

    #[test]
    fn binary_python_source_fails() {
        let mut map = FileMap::new();
        map.insert(
            "entities.py",
            devmatrix_core::model::file_map::FileContents::Binary(vec![0, 159, 146, 150]),
        )
        .unwrap();
        assert!(introspect(&map).is_err());
    }

    #[test]
    fn duplicates_are_reported_once() {
        let map = files(&[
            ("entities.py", "class User(Base): ...\n"),
            ("models/user.py", "class User(Base): ...\n"),
        ]);
        let surface = introspect(&map).unwrap();
        assert_eq!(surface.entities, vec!["User"]);
    }
}
