//! Entities and their fields as extracted from the specification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of field type tags.
///
/// Unknown types degrade to [`FieldType::Text`] at parse time; the parser
/// records a warning rather than aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// RFC 4122 identifier
    Uuid,
    /// Bounded string
    String,
    /// Signed integer
    Integer,
    /// Floating point number
    Float,
    /// True/false
    Boolean,
    /// ISO-8601 timestamp
    DateTime,
    /// Fixed-point decimal (money and the like)
    Decimal,
    /// Free-form string fallback for unknown type tags
    Text,
}

impl FieldType {
    /// Map a schema/prose type tag to a field type, if recognized.
    #[must_use]
    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "uuid" | "guid" => Some(Self::Uuid),
            "string" | "str" | "varchar" => Some(Self::String),
            "integer" | "int" | "bigint" | "i64" | "i32" => Some(Self::Integer),
            "float" | "number" | "double" | "f64" | "f32" => Some(Self::Float),
            "boolean" | "bool" => Some(Self::Boolean),
            "datetime" | "timestamp" | "date-time" | "date" => Some(Self::DateTime),
            "decimal" | "numeric" | "money" => Some(Self::Decimal),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Canonical lowercase tag, stable across runs.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Decimal => "decimal",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Declared constraints on a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    /// Named format (email, uuid, iso8601, url, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Minimum string length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Maximum string length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Inclusive numeric lower bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive numeric upper bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Enumeration of allowed values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<String>,
    /// Foreign-key target entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl FieldConstraints {
    /// Whether any constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.format.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.minimum.is_none()
            && self.maximum.is_none()
            && self.one_of.is_empty()
            && self.references.is_none()
    }
}

/// A named field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Type tag
    pub field_type: FieldType,
    /// Whether the field must be present
    pub required: bool,
    /// Whether values must be unique across records
    pub unique: bool,
    /// Additional constraints
    #[serde(default)]
    pub constraints: FieldConstraints,
}

impl FieldDef {
    /// A plain optional field with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            constraints: FieldConstraints::default(),
        }
    }

    /// Mark the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Attach constraints.
    #[must_use]
    pub fn with_constraints(mut self, constraints: FieldConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Whether this field references another entity.
    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        self.constraints.references.is_some()
    }
}

/// A named record with fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name (capitalized singular by convention)
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
}

impl Entity {
    /// Create an entity with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All foreign-key fields with their target entity names.
    #[must_use]
    pub fn foreign_keys(&self) -> Vec<(&FieldDef, &str)> {
        self.fields
            .iter()
            .filter_map(|f| {
                f.constraints
                    .references
                    .as_deref()
                    .map(|target| (f, target))
            })
            .collect()
    }
}
