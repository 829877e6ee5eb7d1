//! # DevMatrix Planning
//!
//! The middle of the cognitive pipeline:
//!
//! - **Multi-pass planner**: six sequential LLM refinements from normalized
//!   requirements to validated atomic tasks, with invariant-violation
//!   reissue and `PlanningFailed` on non-convergence
//! - **Atomizer**: semantic signatures (normalized purpose, canonical I/O,
//!   deterministic embedding, stable 64-bit digest) for every atomic task
//! - **DAG builder**: topological layer materialization with cycle
//!   detection

pub mod atomizer;
pub mod dag;
pub mod passes;
pub mod plan;

pub use atomizer::Atomizer;
pub use dag::TaskDag;
pub use passes::MultiPassPlanner;
pub use plan::{
    ArchitectureDesign, IntegrationPoint, MasterPlan, MethodSignature, ModuleContract,
    ModuleSpec, NormalizedRequirement, RequirementsAnalysis,
};
