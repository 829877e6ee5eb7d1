//! HTTP endpoints extracted from the specification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported HTTP methods.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Read
    Get,
    /// Create
    Post,
    /// Replace
    Put,
    /// Remove
    Delete,
    /// Partial update
    Patch,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        };
        f.write_str(s)
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// One HTTP operation of the generated application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// HTTP method
    pub method: HttpMethod,
    /// Route path, e.g. `/users/{id}`
    pub path: String,
    /// Stable operation id
    pub operation_id: String,
    /// Request body schema reference, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<String>,
    /// Response schema references keyed by status code
    #[serde(default)]
    pub responses: BTreeMap<u16, String>,
}

impl Endpoint {
    /// Create an endpoint with an operation id derived from method + path.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let path = path.into();
        let operation_id = format!(
            "{}_{}",
            method.to_string().to_lowercase(),
            path.trim_matches('/')
                .replace(['/', '{', '}'], "_")
                .trim_matches('_')
        );
        Self {
            method,
            path,
            operation_id,
            request_schema: None,
            responses: BTreeMap::new(),
        }
    }

    /// The (method, path) identity used for coverage comparison.
    #[must_use]
    pub fn key(&self) -> (HttpMethod, String) {
        (self.method, self.path.clone())
    }

    /// Whether any declared response carries the given status.
    #[must_use]
    pub fn has_status(&self, status: u16) -> bool {
        self.responses.contains_key(&status)
    }
}
