//! Source course outlines

use crate::SlideId;
use serde::{Deserialize, Serialize};

/// One heading proposed by the outline-extraction capability for a text window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Section title
    pub title: String,

    /// Nesting level (0 = top level)
    #[serde(default)]
    pub level: u32,

    /// Page on which the section starts, used as the deduplication key
    #[serde(default)]
    pub start_page: Option<u32>,
}

impl OutlineEntry {
    /// Create a new outline entry
    pub fn new(title: impl Into<String>, level: u32, start_page: Option<u32>) -> Self {
        Self {
            title: title.into(),
            level,
            start_page,
        }
    }
}

/// A concept term with its aggregated weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedConcept {
    /// Concept term (raw or canonical)
    pub term: String,

    /// Salience-weighted frequency across the covered slides
    pub weight: f64,
}

impl WeightedConcept {
    /// Create a new weighted concept
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self {
            term: term.into(),
            weight,
        }
    }
}

/// A section of one source course, summarized by its concepts
///
/// Built by aggregation/extraction and read-only input to the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionOutlineNode {
    /// Section identifier, unique within the course
    pub id: String,

    /// Section title
    pub title: String,

    /// Nesting level (0 = top level)
    pub level: u32,

    /// Parent section, derived from levels
    pub parent_id: Option<String>,

    /// Ranked concepts, heaviest first
    pub concepts: Vec<WeightedConcept>,

    /// Course the section belongs to
    pub source_course_id: String,

    /// Page on which the section starts
    pub start_page: Option<u32>,

    /// Slides directly under this section
    #[serde(default)]
    pub slide_ids: Vec<SlideId>,
}

impl SectionOutlineNode {
    /// Top `limit` concept terms, in rank order
    pub fn top_terms(&self, limit: usize) -> Vec<String> {
        self.concepts
            .iter()
            .take(limit)
            .map(|c| c.term.clone())
            .collect()
    }

    /// Whether this section is a top-level section
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
