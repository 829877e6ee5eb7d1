//! Atomic synthesis tasks.

use crate::model::requirement::Domain;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Security sensitivity of a task's output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityTier {
    /// No sensitive data or privileged operations
    #[default]
    Low,
    /// Touches user data
    Medium,
    /// Touches credentials, money, or authorization decisions
    High,
}

/// Performance sensitivity of a task's output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    /// Cold paths
    #[default]
    Low,
    /// Request-path code
    Medium,
    /// Hot loops and bulk operations
    High,
}

/// Line budget for the narrowest atomic units.
pub const NARROW_TASK_LINE_BUDGET: u32 = 10;

/// Line budget for cohesive module tasks (the pattern size).
pub const MODULE_TASK_LINE_BUDGET: u32 = 64;

/// The smallest unit of synthesis.
///
/// Input and output maps use `BTreeMap` so the canonical projection (and
/// therefore the semantic hash) is independent of declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicTask {
    /// Stable task id within the plan
    pub id: String,
    /// Verb-object purpose phrase
    pub purpose: String,
    /// Input name to canonical type tag
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// Output name to canonical type tag
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Constraints the artifact must honor
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Business domain
    pub domain: Domain,
    /// Security tier
    #[serde(default)]
    pub security: SecurityTier,
    /// Performance tier
    #[serde(default)]
    pub performance: PerformanceTier,
    /// Whether re-execution is safe
    #[serde(default)]
    pub idempotent: bool,
    /// Ids of tasks that must complete first
    #[serde(default)]
    pub predecessors: Vec<String>,
    /// Output line budget for the implementation role
    pub line_budget: u32,
}

impl AtomicTask {
    /// Create a narrow task with defaults.
    #[must_use]
    pub fn new(id: impl Into<String>, purpose: impl Into<String>, domain: Domain) -> Self {
        Self {
            id: id.into(),
            purpose: purpose.into(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            constraints: Vec::new(),
            domain,
            security: SecurityTier::default(),
            performance: PerformanceTier::default(),
            idempotent: false,
            predecessors: Vec::new(),
            line_budget: NARROW_TASK_LINE_BUDGET,
        }
    }

    /// Add an input.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), type_tag.into());
        self
    }

    /// Add an output.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), type_tag.into());
        self
    }

    /// Declare predecessors.
    #[must_use]
    pub fn with_predecessors(mut self, ids: Vec<String>) -> Self {
        self.predecessors = ids;
        self
    }

    /// Canonical projection of the hash-relevant fields.
    ///
    /// Only (purpose, inputs, outputs, security, performance) participate;
    /// predecessors and constraints are plan-local and excluded so the hash
    /// stays stable across plan refinements.
    #[must_use]
    pub fn canonical_projection(&self) -> String {
        let inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|(name, tag)| format!("{name}:{tag}"))
            .collect();
        let outputs: Vec<String> = self
            .outputs
            .iter()
            .map(|(name, tag)| format!("{name}:{tag}"))
            .collect();
        format!(
            "purpose={}|in={}|out={}|sec={:?}|perf={:?}",
            self.purpose.trim().to_lowercase(),
            inputs.join(","),
            outputs.join(","),
            self.security,
            self.performance,
        )
    }

    /// Stable 64-bit semantic digest over the canonical projection.
    #[must_use]
    pub fn semantic_hash(&self) -> u64 {
        let digest = Sha256::digest(self.canonical_projection().as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(raw)
    }

    /// The semantic hash as a fixed-width hex string.
    #[must_use]
    pub fn semantic_hash_hex(&self) -> String {
        format!("{:016x}", self.semantic_hash())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> AtomicTask {
        AtomicTask::new("t1", "Create user record", Domain::Crud)
            .with_input("email", "string")
            .with_input("name", "string")
            .with_output("user", "User")
    }

    #[test]
    fn hash_is_stable_across_clones() {
        let a = sample();
        let b = a.clone();
        assert_eq!(a.semantic_hash(), b.semantic_hash());
    }

    #[test]
    fn hash_ignores_input_declaration_order() {
        let a = AtomicTask::new("t1", "create user", Domain::Crud)
            .with_input("a", "string")
            .with_input("b", "integer");
        let b = AtomicTask::new("t9", "create user", Domain::Crud)
            .with_input("b", "integer")
            .with_input("a", "string");
        assert_eq!(a.semantic_hash(), b.semantic_hash());
    }

    #[test]
    fn hash_ignores_predecessors() {
        let a = sample();
        let b = sample().with_predecessors(vec!["t0".into()]);
        assert_eq!(a.semantic_hash(), b.semantic_hash());
    }

    #[test]
    fn hash_changes_with_purpose_and_tiers() {
        let a = sample();
        let mut b = sample();
        b.purpose = "Delete user record".into();
        assert_ne!(a.semantic_hash(), b.semantic_hash());

        let mut c = sample();
        c.security = SecurityTier::High;
        assert_ne!(a.semantic_hash(), c.semantic_hash());
    }

    #[test]
    fn hash_hex_is_sixteen_chars() {
        assert_eq!(sample().semantic_hash_hex().len(), 16);
    }
}
