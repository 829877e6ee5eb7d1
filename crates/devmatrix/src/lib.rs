//! # DevMatrix Cognitive Generation Core
//!
//! Generates complete backend applications from natural-language
//! specifications. The core is a phase-sequential pipeline:
//!
//! 1. Spec ingestion and parsing
//! 2. Validation extraction (direct + pattern + LLM, deduplicated)
//! 3. Requirements classification and dependency graph
//! 4. Six-pass masterplan planning
//! 5. Atomization into line-budgeted tasks with semantic signatures
//! 6. DAG materialization with topological layers
//! 7. Pattern-guided co-reasoning synthesis (layer-parallel)
//! 8. Compliance validation against ground truth
//! 9. Targeted repair with plateau detection
//! 10. Learning: candidate registration and pattern promotion
//!
//! ```rust,ignore
//! use devmatrix::CognitiveCore;
//! use devmatrix_core::{RunContext, SpecDocument, StackDescriptor};
//!
//! let core = CognitiveCore::builder(model).build();
//! core.open().await?;
//! let ctx = RunContext::new(SpecDocument::from_text(spec_text)?, StackDescriptor::default());
//! let output = core.run(ctx).await;
//! println!("status: {:?}", output.report.status);
//! core.close().await?;
//! ```

pub mod learning;
pub mod persist;
pub mod pipeline;

pub use pipeline::{CognitiveCore, CognitiveCoreBuilder, RunOutput};

pub use devmatrix_core::{
    CancellationToken, RunBudgets, RunContext, RunReport, RunStatus, SpecDocument,
    StackDescriptor,
};
