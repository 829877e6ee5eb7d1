//! # DevMatrix Spec Ingestion
//!
//! The front of the cognitive pipeline:
//!
//! - **Parser**: turns a [`SpecDocument`](devmatrix_core::SpecDocument) into
//!   entities, endpoints, requirements, and business-logic rules. Embedded
//!   schemas win over prose; unknown field types degrade to free-form text
//!   with a warning.
//! - **Validation extraction**: three stages (direct, pattern catalog, LLM)
//!   unioned and deduplicated into a [`ValidationRuleSet`]
//!   (devmatrix_core::ValidationRuleSet).
//! - **Requirements classification**: domain and functional/non-functional
//!   tagging plus an acyclic requirement dependency graph.

pub mod catalog;
pub mod classify;
pub mod extract;
pub mod parser;

pub use catalog::{HeuristicCatalog, CATALOG_VERSION};
pub use classify::{ClassificationOutcome, ClassifierMetrics, RequirementsClassifier};
pub use extract::{ExtractionOutcome, StageId, ValidationExtractor};
pub use parser::{ParsedSpec, SpecParser};
