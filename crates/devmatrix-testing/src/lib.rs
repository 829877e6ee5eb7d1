// Allow unwrap in testing utilities - test code should panic on errors
#![allow(clippy::unwrap_used)]

//! # DevMatrix Testing Utilities
//!
//! Doubles for the collaborators the pipeline consumes, so phases and
//! property tests run without live LLM calls:
//!
//! - **ScriptedCompletionModel**: prompt-keyed canned responses with failure
//!   injection and call recording
//! - **HashEmbeddings / InMemoryVectorStore**: re-exported from core for
//!   convenience
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use devmatrix_testing::ScriptedCompletionModel;
//!
//! let model = ScriptedCompletionModel::new()
//!     .with_response("[]")
//!     .on_prompt_containing("field-level validation", r#"[{"attribute": "email"}]"#);
//! ```

mod scripted;

pub use scripted::ScriptedCompletionModel;

// Re-export useful doubles from core
pub use devmatrix_core::embeddings::HashEmbeddings;
pub use devmatrix_core::vector_store::InMemoryVectorStore;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{HashEmbeddings, InMemoryVectorStore, ScriptedCompletionModel};
}

#[cfg(test)]
mod tests {
    use super::*;
    use devmatrix_core::completion::{CompletionModel, CompletionParams};

    #[tokio::test]
    async fn prelude_exports_resolve() {
        use crate::prelude::*;
        let model = ScriptedCompletionModel::new().with_response("ok");
        let out = model
            .complete("anything", &CompletionParams::deterministic("m"))
            .await
            .unwrap();
        assert_eq!(out.text, "ok");
        let _ = HashEmbeddings::new(64);
        let _ = InMemoryVectorStore::new(64);
    }
}
