//! The input specification document.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ingestion size cap: 256 KiB of UTF-8 text.
pub const SPEC_SIZE_LIMIT: usize = 256 * 1024;

/// One titled section of the specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecSection {
    /// Heading text, empty for the preamble
    pub title: String,
    /// Prose body, including any fenced schema blocks
    pub body: String,
}

/// The specification document: an ordered sequence of sections of
/// natural-language prose plus optional fenced JSON schema blocks.
///
/// Immutable after ingestion; construction is the only place the size cap
/// is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecDocument {
    raw: String,
    sections: Vec<SpecSection>,
}

impl SpecDocument {
    /// Ingest a specification from UTF-8 text.
    ///
    /// Splits on Markdown headings; text before the first heading becomes an
    /// untitled preamble section. Fails with `SpecTooLarge` past the cap.
    pub fn from_text(text: impl Into<String>) -> Result<Self> {
        let raw = text.into();
        if raw.len() > SPEC_SIZE_LIMIT {
            return Err(Error::SpecTooLarge {
                size: raw.len(),
                limit: SPEC_SIZE_LIMIT,
            });
        }

        let mut sections = Vec::new();
        let mut title = String::new();
        let mut body = String::new();
        let mut in_fence = false;

        for line in raw.lines() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }
            if !in_fence && line.starts_with('#') {
                if !body.trim().is_empty() || !title.is_empty() {
                    sections.push(SpecSection {
                        title: std::mem::take(&mut title),
                        body: std::mem::take(&mut body),
                    });
                }
                title = line.trim_start_matches('#').trim().to_string();
            } else {
                body.push_str(line);
                body.push('\n');
            }
        }
        if !body.trim().is_empty() || !title.is_empty() {
            sections.push(SpecSection { title, body });
        }

        Ok(Self { raw, sections })
    }

    /// The full document text.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The parsed sections, in document order.
    #[must_use]
    pub fn sections(&self) -> &[SpecSection] {
        &self.sections
    }

    /// Document size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.raw.len()
    }
}
