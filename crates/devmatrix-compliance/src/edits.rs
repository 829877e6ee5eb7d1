//! Structure-aware edits over the generated file map.
//!
//! Repairs insert declarations at their conventional locations (entities in
//! `entities.py`, endpoints in `routes/<resource>.py`, validations in
//! `schemas.py`) instead of rewriting files. An edit returns `Ok(false)`
//! when it cannot be applied, which sends the repair to the inference
//! engine fallback. Edits only add or toggle; existing symbols are never
//! deleted.

use devmatrix_core::model::endpoint::HttpMethod;
use devmatrix_core::model::file_map::FileMap;
use devmatrix_core::model::validation::RuleKind;
use devmatrix_core::Result;

/// Insert an entity class declaration into `entities.py`.
pub fn add_entity(files: &mut FileMap, name: &str) -> Result<bool> {
    let existing = match files.get("entities.py") {
        Some(contents) => match contents.as_text() {
            Some(text) => text.to_string(),
            None => return Ok(false),
        },
        None => "from sqlalchemy import Column, Integer, String, Uuid\nfrom sqlalchemy.orm import declarative_base\n\nBase = declarative_base()\n".to_string(),
    };

    if existing.contains(&format!("class {name}(")) || existing.contains(&format!("class {name}:"))
    {
        return Ok(true);
    }

    let updated = format!(
        "{existing}\n\nclass {name}(Base):\n    __tablename__ = \"{table}\"\n\n    id = Column(Uuid, primary_key=True)\n",
        table = format!("{}s", name.to_lowercase()),
    );
    files.insert("entities.py", updated)?;
    Ok(true)
}

/// Insert a route handler into `routes/<resource>.py`.
pub fn add_endpoint(files: &mut FileMap, method: HttpMethod, path: &str) -> Result<bool> {
    let resource = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or("root")
        .to_string();
    let resource = if resource.is_empty() {
        "root".to_string()
    } else {
        resource
    };
    let file_path = format!("routes/{resource}.py");

    let existing = match files.get(&file_path) {
        Some(contents) => match contents.as_text() {
            Some(text) => text.to_string(),
            None => return Ok(false),
        },
        None => "from fastapi import APIRouter\n\nrouter = APIRouter()\n".to_string(),
    };

    let decorator = format!(
        "@router.{}(\"{}\")",
        method.to_string().to_lowercase(),
        path
    );
    if existing.contains(&decorator) {
        return Ok(true);
    }

    let handler = format!(
        "{}_{}",
        method.to_string().to_lowercase(),
        path.trim_matches('/')
            .replace(['/', '{', '}'], "_")
            .trim_matches('_')
    );
    let updated = format!(
        "{existing}\n\n{decorator}\ndef {handler}():\n    raise NotImplementedError\n"
    );
    files.insert(&file_path, updated)?;
    Ok(true)
}

/// Register a validation triple in the `VALIDATIONS` block of `schemas.py`.
pub fn add_validation(
    files: &mut FileMap,
    entity: &str,
    attribute: &str,
    kind: RuleKind,
) -> Result<bool> {
    let existing = match files.get("schemas.py") {
        Some(contents) => match contents.as_text() {
            Some(text) => text.to_string(),
            None => return Ok(false),
        },
        None => "VALIDATIONS = [\n]\n".to_string(),
    };

    let entry = format!("    (\"{entity}\", \"{attribute}\", \"{kind}\"),");
    if existing.contains(entry.trim_start()) {
        return Ok(true);
    }

    let Some(block_start) = existing.find("VALIDATIONS") else {
        // No registry block to extend; append one.
        let updated = format!("{existing}\n\nVALIDATIONS = [\n{entry}\n]\n");
        files.insert("schemas.py", updated)?;
        return Ok(true);
    };

    // Insert before the closing bracket of the registry block.
    let Some(close_offset) = existing[block_start..].find(']') else {
        return Ok(false);
    };
    let close = block_start + close_offset;
    let updated = format!(
        "{}{entry}\n{}",
        &existing[..close],
        &existing[close..]
    );
    files.insert("schemas.py", updated)?;
    Ok(true)
}

/// Attach a JSON datetime encoder in `schemas.py`.
pub fn fix_serialization(files: &mut FileMap) -> Result<bool> {
    let existing = match files.get("schemas.py") {
        Some(contents) => match contents.as_text() {
            Some(text) => text.to_string(),
            None => return Ok(false),
        },
        None => String::new(),
    };

    if existing.contains("json_encoders") {
        return Ok(true);
    }

    let updated = format!(
        "{existing}\nfrom datetime import datetime\n\njson_encoders = {{datetime: lambda value: value.isoformat()}}\n"
    );
    files.insert("schemas.py", updated)?;
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::introspect::introspect;
    use devmatrix_core::model::file_map::FileContents;

    #[test]
    fn add_entity_creates_and_extends() {
        let mut files = FileMap::new();
        assert!(add_entity(&mut files, "User").unwrap());
        assert!(add_entity(&mut files, "Order").unwrap());

        let surface = introspect(&files).unwrap();
        assert_eq!(surface.entities, vec!["User", "Order"]);
    }

    #[test]
    fn add_entity_is_idempotent() {
        let mut files = FileMap::new();
        add_entity(&mut files, "User").unwrap();
        let before = files.get_text("entities.py").unwrap().to_string();
        add_entity(&mut files, "User").unwrap();
        assert_eq!(files.get_text("entities.py").unwrap(), before);
    }

    #[test]
    fn add_endpoint_targets_resource_file() {
        let mut files = FileMap::new();
        assert!(add_endpoint(&mut files, HttpMethod::Post, "/users").unwrap());
        assert!(files.contains("routes/users.py"));

        let surface = introspect(&files).unwrap();
        assert_eq!(surface.endpoints.len(), 1);
        assert_eq!(surface.endpoints[0].1, "/users");
    }

    #[test]
    fn add_validation_extends_the_registry_block() {
        let mut files = FileMap::new();
        files
            .insert(
                "schemas.py",
                "VALIDATIONS = [\n    (\"User\", \"id\", \"presence\"),\n]\n",
            )
            .unwrap();
        assert!(add_validation(&mut files, "User", "email", RuleKind::Uniqueness).unwrap());

        let surface = introspect(&files).unwrap();
        assert_eq!(surface.validations.len(), 2);
        // The pre-existing entry was not deleted.
        assert!(files
            .get_text("schemas.py")
            .unwrap()
            .contains("(\"User\", \"id\", \"presence\")"));
    }

    #[test]
    fn binary_target_cannot_be_edited() {
        let mut files = FileMap::new();
        files
            .insert("entities.py", FileContents::Binary(vec![1, 2, 3]))
            .unwrap();
        assert!(!add_entity(&mut files, "User").unwrap());
    }

    #[test]
    fn fix_serialization_attaches_encoder_once() {
        let mut files = FileMap::new();
        assert!(fix_serialization(&mut files).unwrap());
        let before = files.get_text("schemas.py").unwrap().to_string();
        assert!(before.contains("json_encoders"));
        assert!(fix_serialization(&mut files).unwrap());
        assert_eq!(files.get_text("schemas.py").unwrap(), before);
    }
}
