//! # DevMatrix Synthesis Engine
//!
//! Pattern-guided, LLM co-reasoned code synthesis:
//!
//! - **Inference engine**: strategy role (adapt a similar pattern or design
//!   from scratch) and implementation role (realize under the stack
//!   descriptor and line budget) as two named invocations of one completion
//!   capability, followed by a refinement check. Results are cached by
//!   `(signature hash, stack descriptor)`.
//! - **Layer executor**: runs each topological layer's tasks in parallel on
//!   a cooperative pool bounded by `max_concurrency`, with strict layer
//!   barriers and cooperative cancellation.

pub mod executor;
pub mod inference;

pub use executor::{FailedTask, LayerExecutor, SynthesisReport};
pub use inference::{InferenceEngine, TaskArtifact};
