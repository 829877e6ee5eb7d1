//! Spec parsing: prose heuristics plus embedded structured schemas.

use devmatrix_core::model::endpoint::{Endpoint, HttpMethod};
use devmatrix_core::model::entity::{Entity, FieldConstraints, FieldDef, FieldType};
use devmatrix_core::model::requirement::Requirement;
use devmatrix_core::model::spec::SpecDocument;
use devmatrix_core::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Everything the parser recovers from a specification.
#[derive(Debug, Clone, Default)]
pub struct ParsedSpec {
    /// Extracted entities, in first-appearance order
    pub entities: Vec<Entity>,
    /// Extracted endpoints
    pub endpoints: Vec<Endpoint>,
    /// Extracted requirements
    pub requirements: Vec<Requirement>,
    /// Business-logic rule sentences for the cross-entity extractor
    pub business_rules: Vec<String>,
    /// Non-fatal parse warnings (unknown types, skipped blocks)
    pub warnings: Vec<String>,
}

impl ParsedSpec {
    /// Look up an entity by name.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }
}

fn entity_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"([A-Z][A-Za-z0-9_]*)\s*\{([^{}]*)\}").unwrap())
}

fn endpoint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| {
        Regex::new(r"\b(GET|POST|PUT|DELETE|PATCH)\s+(/[A-Za-z0-9_/{}\-]*)").unwrap()
    })
}

fn requirement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"\b(must|should|shall|needs to)\b").unwrap())
}

fn business_rule_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| {
        Regex::new(r"\b(cannot|must not|only if|at most|at least|never|exceed)\b").unwrap()
    })
}

/// Parses spec text into structured entities, endpoints, and requirements.
///
/// Idempotent: the extraction is regex- and schema-driven with no hidden
/// state, so the same input yields the same output.
#[derive(Debug, Clone, Default)]
pub struct SpecParser;

impl SpecParser {
    /// Create a parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse a document. Fails with `SpecMalformed` when no entities are
    /// extractable; every other oddity degrades to a warning.
    pub fn parse(&self, spec: &SpecDocument) -> Result<ParsedSpec> {
        let mut parsed = ParsedSpec::default();

        // Prose first; fenced schemas afterwards so schema data wins on
        // conflict.
        let prose = strip_fenced_blocks(spec.raw());
        let mut entities: BTreeMap<String, Entity> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();

        for capture in entity_block_re().captures_iter(&prose) {
            let name = capture[1].to_string();
            let body = capture[2].to_string();
            let entity = parse_entity_body(&name, &body, &mut parsed.warnings);
            if !entities.contains_key(&name) {
                order.push(name.clone());
            }
            entities.insert(name, entity);
        }

        for block in fenced_json_blocks(spec.raw()) {
            match serde_json::from_str::<serde_json::Value>(&block) {
                Ok(value) => {
                    apply_schema_block(&value, &mut entities, &mut order, &mut parsed)?;
                }
                Err(e) => {
                    parsed
                        .warnings
                        .push(format!("skipped malformed schema block: {e}"));
                }
            }
        }

        parsed.entities = order
            .iter()
            .filter_map(|name| entities.get(name).cloned())
            .collect();

        for capture in endpoint_re().captures_iter(&prose) {
            #[allow(clippy::unwrap_used)]
            let method: HttpMethod = capture[1].parse().unwrap();
            let path = capture[2].trim_end_matches('/').to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            if !parsed
                .endpoints
                .iter()
                .any(|e| e.method == method && e.path == path)
            {
                parsed.endpoints.push(Endpoint::new(method, path));
            }
        }

        let mut req_counter = 0usize;
        for sentence in sentences(&prose) {
            if requirement_re().is_match(&sentence.to_lowercase()) {
                req_counter += 1;
                parsed
                    .requirements
                    .push(Requirement::new(format!("REQ-{req_counter:03}"), sentence.clone()));
            }
            if business_rule_re().is_match(&sentence.to_lowercase()) {
                parsed.business_rules.push(sentence);
            }
        }

        if parsed.entities.is_empty() {
            return Err(Error::SpecMalformed(
                "no entities extractable from specification".into(),
            ));
        }

        Ok(parsed)
    }
}

/// Split prose into rough sentences, keeping list items whole.
fn sentences(text: &str) -> Vec<String> {
    text.split(['\n', '.'])
        .map(str::trim)
        .filter(|s| s.len() > 8)
        .map(|s| s.trim_start_matches(['-', '*', ' ']).to_string())
        .collect()
}

/// Remove fenced blocks so prose heuristics do not fire inside schemas.
fn strip_fenced_blocks(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_fence = false;
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Collect the contents of ```json fenced blocks.
fn fenced_json_blocks(raw: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for line in raw.lines() {
        let trimmed = line.trim_start();
        match &mut current {
            None if trimmed.starts_with("```json") => current = Some(String::new()),
            None if trimmed.starts_with("```") => {}
            None => {}
            Some(buf) => {
                if trimmed.starts_with("```") {
                    blocks.push(std::mem::take(buf));
                    current = None;
                } else {
                    buf.push_str(line);
                    buf.push('\n');
                }
            }
        }
    }
    blocks
}

/// Parse the inline `Name{field: Type attr ...}` body form.
fn parse_entity_body(name: &str, body: &str, warnings: &mut Vec<String>) -> Entity {
    let mut entity = Entity::new(name);
    for chunk in body.split(',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let flattened = chunk.replace(':', " ");
        let tokens: Vec<&str> = flattened.split_whitespace().collect();
        let Some((field_name, rest)) = tokens.split_first() else {
            continue;
        };

        let mut field = FieldDef::new(*field_name, FieldType::Text);
        let mut type_set = false;
        let mut constraints = FieldConstraints::default();
        let mut iter = rest.iter().peekable();

        while let Some(token) = iter.next() {
            let lower = token.to_lowercase();
            match lower.as_str() {
                "required" => field.required = true,
                "optional" => field.required = false,
                "unique" => field.unique = true,
                "fk" => {
                    if let Some(target) = iter.next() {
                        constraints.references = Some((*target).to_string());
                        if !type_set {
                            field.field_type = FieldType::Uuid;
                            type_set = true;
                        }
                    }
                }
                _ if lower.starts_with("format=") => {
                    constraints.format = Some(lower["format=".len()..].to_string());
                }
                _ if lower.starts_with("minlength=") => {
                    constraints.min_length = lower["minlength=".len()..].parse().ok();
                }
                _ if lower.starts_with("maxlength=") => {
                    constraints.max_length = lower["maxlength=".len()..].parse().ok();
                }
                _ if lower.starts_with("min=") => {
                    constraints.minimum = lower["min=".len()..].parse().ok();
                }
                _ if lower.starts_with("max=") => {
                    constraints.maximum = lower["max=".len()..].parse().ok();
                }
                _ if lower.starts_with("enum=") => {
                    constraints.one_of = lower["enum=".len()..]
                        .split('|')
                        .map(str::to_string)
                        .collect();
                }
                _ => {
                    if let Some(ft) = FieldType::parse_tag(token) {
                        if !type_set {
                            field.field_type = ft;
                            type_set = true;
                        }
                    } else if !type_set && token.chars().next().is_some_and(char::is_uppercase) {
                        warnings.push(format!(
                            "unknown field type '{token}' on {name}.{field_name}, using text"
                        ));
                        field.field_type = FieldType::Text;
                        type_set = true;
                    }
                }
            }
        }

        field.constraints = constraints;
        entity.fields.push(field);
    }
    entity
}

/// Merge a fenced schema block in. Schema data wins over prose.
fn apply_schema_block(
    value: &serde_json::Value,
    entities: &mut BTreeMap<String, Entity>,
    order: &mut Vec<String>,
    parsed: &mut ParsedSpec,
) -> Result<()> {
    if let Some(schema_entities) = value.get("entities").and_then(|v| v.as_array()) {
        for entity_value in schema_entities {
            if let Some(entity) = parse_schema_entity(entity_value, &mut parsed.warnings) {
                if !entities.contains_key(&entity.name) {
                    order.push(entity.name.clone());
                }
                entities.insert(entity.name.clone(), entity);
            }
        }
    }
    if let Some(schema_endpoints) = value.get("endpoints").and_then(|v| v.as_array()) {
        for endpoint_value in schema_endpoints {
            if let Some(endpoint) = parse_schema_endpoint(endpoint_value, &mut parsed.warnings) {
                parsed
                    .endpoints
                    .retain(|e| !(e.method == endpoint.method && e.path == endpoint.path));
                parsed.endpoints.push(endpoint);
            }
        }
    }
    Ok(())
}

fn parse_schema_entity(value: &serde_json::Value, warnings: &mut Vec<String>) -> Option<Entity> {
    let name = value.get("name")?.as_str()?;
    let mut entity = Entity::new(name);
    for field_value in value.get("fields")?.as_array()? {
        let Some(field_name) = field_value.get("name").and_then(|v| v.as_str()) else {
            warnings.push(format!("schema field without name on entity {name}"));
            continue;
        };
        let type_tag = field_value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("text");
        let field_type = FieldType::parse_tag(type_tag).unwrap_or_else(|| {
            warnings.push(format!(
                "unknown field type '{type_tag}' on {name}.{field_name}, using text"
            ));
            FieldType::Text
        });

        let get_u64 = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| field_value.get(*k))
                .and_then(|v| v.as_u64())
        };
        let get_f64 = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| field_value.get(*k))
                .and_then(|v| v.as_f64())
        };

        let constraints = FieldConstraints {
            format: field_value
                .get("format")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            min_length: get_u64(&["min_length", "minLength"]),
            max_length: get_u64(&["max_length", "maxLength"]),
            minimum: get_f64(&["minimum", "min"]),
            maximum: get_f64(&["maximum", "max"]),
            one_of: field_value
                .get("enum")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            references: field_value
                .get("references")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        };

        let mut field = FieldDef::new(field_name, field_type).with_constraints(constraints);
        field.required = field_value
            .get("required")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        field.unique = field_value
            .get("unique")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        entity.fields.push(field);
    }
    Some(entity)
}

fn parse_schema_endpoint(
    value: &serde_json::Value,
    warnings: &mut Vec<String>,
) -> Option<Endpoint> {
    let method_str = value.get("method")?.as_str()?;
    let Ok(method) = method_str.parse::<HttpMethod>() else {
        warnings.push(format!("unsupported endpoint method '{method_str}'"));
        return None;
    };
    let path = value.get("path")?.as_str()?;
    let mut endpoint = Endpoint::new(method, path);
    if let Some(op) = value.get("operation_id").and_then(|v| v.as_str()) {
        endpoint.operation_id = op.to_string();
    }
    if let Some(request) = value.get("request").and_then(|v| v.as_str()) {
        endpoint.request_schema = Some(request.to_string());
    }
    if let Some(responses) = value.get("responses").and_then(|v| v.as_object()) {
        for (status, schema) in responses {
            if let (Ok(code), Some(schema)) = (status.parse::<u16>(), schema.as_str()) {
                endpoint.responses.insert(code, schema.to_string());
            }
        }
    }
    Some(endpoint)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn doc(text: &str) -> SpecDocument {
        SpecDocument::from_text(text).unwrap()
    }

    #[test]
    fn parses_inline_entity_blocks() {
        let parsed = SpecParser::new()
            .parse(&doc(
                "# Entities\nUser{id: UUID unique required, email: String format=email unique required, name: String minLength=2 maxLength=100 required}\n",
            ))
            .unwrap();

        assert_eq!(parsed.entities.len(), 1);
        let user = parsed.entity("User").unwrap();
        assert_eq!(user.fields.len(), 3);

        let id = user.field("id").unwrap();
        assert_eq!(id.field_type, FieldType::Uuid);
        assert!(id.unique && id.required);

        let email = user.field("email").unwrap();
        assert_eq!(email.constraints.format.as_deref(), Some("email"));

        let name = user.field("name").unwrap();
        assert_eq!(name.constraints.min_length, Some(2));
        assert_eq!(name.constraints.max_length, Some(100));
    }

    #[test]
    fn parses_foreign_keys_without_explicit_type() {
        let parsed = SpecParser::new()
            .parse(&doc(
                "Order{customer_id: UUID fk Customer}\nOrderItem{order_id fk Order, product_id fk Product, quantity Integer}\nProduct{stock Integer}\n",
            ))
            .unwrap();

        let item = parsed.entity("OrderItem").unwrap();
        let order_id = item.field("order_id").unwrap();
        assert_eq!(order_id.field_type, FieldType::Uuid);
        assert_eq!(order_id.constraints.references.as_deref(), Some("Order"));
        assert_eq!(item.field("quantity").unwrap().field_type, FieldType::Integer);
        assert_eq!(item.foreign_keys().len(), 2);
    }

    #[test]
    fn schema_blocks_win_over_prose() {
        let text = r#"
User{id: UUID required, email: String}

```json
{"entities": [{"name": "User", "fields": [
  {"name": "id", "type": "UUID", "required": true, "unique": true},
  {"name": "email", "type": "String", "required": true, "format": "email"}
]}]}
```
"#;
        let parsed = SpecParser::new().parse(&doc(text)).unwrap();
        let user = parsed.entity("User").unwrap();
        assert!(user.field("id").unwrap().unique, "schema unique flag wins");
        assert_eq!(
            user.field("email").unwrap().constraints.format.as_deref(),
            Some("email")
        );
    }

    #[test]
    fn extracts_endpoints_from_prose_and_schema() {
        let text = r#"
User{id: UUID required}
The API exposes GET /users and POST /users.

```json
{"endpoints": [{"method": "POST", "path": "/users", "request": "UserCreate",
                "responses": {"201": "User", "409": "Error"}}]}
```
"#;
        let parsed = SpecParser::new().parse(&doc(text)).unwrap();
        assert_eq!(parsed.endpoints.len(), 2);
        let post = parsed
            .endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Post)
            .unwrap();
        assert!(post.has_status(409), "schema replaces the prose endpoint");
        assert_eq!(post.request_schema.as_deref(), Some("UserCreate"));
    }

    #[test]
    fn unknown_types_degrade_with_warning() {
        let parsed = SpecParser::new()
            .parse(&doc("User{avatar: Blob required}"))
            .unwrap();
        let avatar = parsed.entity("User").unwrap().field("avatar").unwrap();
        assert_eq!(avatar.field_type, FieldType::Text);
        assert!(parsed.warnings.iter().any(|w| w.contains("Blob")));
    }

    #[test]
    fn no_entities_is_malformed() {
        let err = SpecParser::new()
            .parse(&doc("just prose, nothing structured"))
            .unwrap_err();
        assert!(matches!(err, Error::SpecMalformed(_)));
    }

    #[test]
    fn requirements_and_business_rules_are_collected() {
        let text = "User{id: UUID required}\nThe system must send a welcome email. \
                    Stock cannot exceed the warehouse capacity.\n";
        let parsed = SpecParser::new().parse(&doc(text)).unwrap();
        assert_eq!(parsed.requirements.len(), 1);
        assert!(parsed.requirements[0].id.starts_with("REQ-"));
        assert_eq!(parsed.business_rules.len(), 1);
        assert!(parsed.business_rules[0].contains("cannot exceed"));
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "User{id: UUID unique required, email: String format=email}\nGET /users\nThe system must list users.";
        let d = doc(text);
        let parser = SpecParser::new();
        let first = parser.parse(&d).unwrap();
        let second = parser.parse(&d).unwrap();
        assert_eq!(first.entities, second.entities);
        assert_eq!(first.endpoints, second.endpoints);
        assert_eq!(
            first.requirements.iter().map(|r| &r.text).collect::<Vec<_>>(),
            second.requirements.iter().map(|r| &r.text).collect::<Vec<_>>()
        );
    }
}
