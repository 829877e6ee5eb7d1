//! Masterplan structures produced by the six refinement passes.

use devmatrix_core::model::task::AtomicTask;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pass 1 output: one normalized requirement with tagged ambiguities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRequirement {
    /// Requirement id
    pub id: String,
    /// Normalized restatement
    pub text: String,
    /// Ambiguities the planner flagged for later passes
    #[serde(default)]
    pub ambiguities: Vec<String>,
}

/// Pass 1 output: requirements analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementsAnalysis {
    /// Normalized requirements
    #[serde(default)]
    pub requirements: Vec<NormalizedRequirement>,
}

/// One module in the architecture skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Module name (core, models, services, routes, middleware, ...)
    pub name: String,
    /// One-line purpose
    #[serde(default)]
    pub purpose: String,
}

/// Pass 2 output: the module skeleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureDesign {
    /// Chosen modules
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

impl ArchitectureDesign {
    /// Whether a module of this name was chosen.
    #[must_use]
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }
}

/// One method in a module's public interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Method name
    pub name: String,
    /// Input name to type tag
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// Output name to type tag
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Pass 3 output: one module's fixed public interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleContract {
    /// Owning module
    pub module: String,
    /// Public types the module exposes
    #[serde(default)]
    pub types: Vec<String>,
    /// Public methods
    #[serde(default)]
    pub methods: Vec<MethodSignature>,
}

/// Pass 4 output: one resolved inter-module dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationPoint {
    /// Consuming module
    pub from_module: String,
    /// Providing module
    pub to_module: String,
    /// Entities shared across the boundary
    #[serde(default)]
    pub shared_entities: Vec<String>,
}

/// The masterplan after all six passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterPlan {
    /// Pass 1: normalized requirements
    pub analysis: RequirementsAnalysis,
    /// Pass 2: module skeleton
    pub architecture: ArchitectureDesign,
    /// Pass 3: module contracts
    #[serde(default)]
    pub contracts: Vec<ModuleContract>,
    /// Pass 4: integration points
    #[serde(default)]
    pub integrations: Vec<IntegrationPoint>,
    /// Passes 5-6: validated atomic tasks
    #[serde(default)]
    pub tasks: Vec<AtomicTask>,
}

impl MasterPlan {
    /// Look up a task by id.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&AtomicTask> {
        self.tasks.iter().find(|t| t.id == id)
    }
}
