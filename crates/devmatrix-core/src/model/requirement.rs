//! User-facing requirements and their classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Business domain of a requirement or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Create/read/update/delete over entities
    Crud,
    /// Identity, sessions, authorization
    Authentication,
    /// Payment and billing flows
    Payment,
    /// Multi-step stateful processes
    Workflow,
    /// Querying and filtering
    Search,
    /// Outbound messages (email, push)
    Notification,
    /// Aggregation and exports
    Reporting,
    /// Third-party system calls
    Integration,
    /// Anything else
    General,
}

impl Domain {
    /// Stable lowercase tag used in payload filters and storage paths.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Crud => "crud",
            Self::Authentication => "authentication",
            Self::Payment => "payment",
            Self::Workflow => "workflow",
            Self::Search => "search",
            Self::Notification => "notification",
            Self::Reporting => "reporting",
            Self::Integration => "integration",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Functional vs non-functional classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// Observable behavior the application must provide
    Functional,
    /// Quality attributes (performance, security posture, limits)
    NonFunctional,
}

/// An atomic user-facing demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    /// Stable id, e.g. `REQ-004`
    pub id: String,
    /// The requirement sentence
    pub text: String,
    /// Business domain
    pub domain: Domain,
    /// Functional or non-functional
    pub kind: RequirementKind,
    /// Ids of requirements this one depends on
    #[serde(default)]
    pub predecessors: Vec<String>,
}

impl Requirement {
    /// Create a functional requirement in the general domain.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            domain: Domain::General,
            kind: RequirementKind::Functional,
            predecessors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_tags_are_stable() {
        assert_eq!(Domain::Crud.tag(), "crud");
        assert_eq!(Domain::Authentication.to_string(), "authentication");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Domain::Payment).unwrap_or_default();
        assert_eq!(json, "\"payment\"");
        let kind = serde_json::to_string(&RequirementKind::NonFunctional).unwrap_or_default();
        assert_eq!(kind, "\"non_functional\"");
    }
}
