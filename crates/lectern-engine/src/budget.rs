//! Context budget planning
//!
//! Maps a model context size to the capacity of each call site. Every capability
//! call reserves a fixed overhead for instructions and output; the rest of the
//! window is spent on payload.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Approximate characters per token for English technical text
pub const CHARS_PER_TOKEN: usize = 3;

/// Estimated tokens per concept term in a clustering prompt
const TOKENS_PER_TERM: usize = 15;

/// Estimated tokens per concept in a merge prompt
const TOKENS_PER_MERGE_CONCEPT: usize = 150;

/// Call site whose payload is sized from the context budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSite {
    /// Concept clustering batches
    ConceptClustering,
    /// Pairwise outline merges
    OutlineMerge,
    /// Outline extraction windows
    WindowExtraction,
}

impl CallSite {
    /// Tokens reserved for instructions and output
    pub fn overhead(&self) -> usize {
        match self {
            CallSite::ConceptClustering => 3000,
            CallSite::OutlineMerge => 6000,
            CallSite::WindowExtraction => 4000,
        }
    }

    /// Every call site, in planning order
    pub fn all() -> [CallSite; 3] {
        [
            CallSite::ConceptClustering,
            CallSite::OutlineMerge,
            CallSite::WindowExtraction,
        ]
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallSite::ConceptClustering => "concept clustering",
            CallSite::OutlineMerge => "outline merge",
            CallSite::WindowExtraction => "window extraction",
        };
        f.write_str(name)
    }
}

/// Capacity of one call site for a context size
///
/// - concept clustering: terms per batch, at least 1
/// - outline merge: combined concepts per merge call, at least 2
/// - window extraction: characters per window, at least 1000
///
/// # Errors
///
/// Returns `EngineError::Configuration` when `context_size` does not exceed the
/// call site's overhead.
///
/// # Examples
///
/// ```
/// use lectern_engine::{capacity, CallSite};
///
/// assert_eq!(capacity(CallSite::ConceptClustering, 8192).unwrap(), 346);
/// assert!(capacity(CallSite::OutlineMerge, 6000).is_err());
/// ```
pub fn capacity(call_site: CallSite, context_size: usize) -> Result<usize, EngineError> {
    let overhead = call_site.overhead();
    if context_size <= overhead {
        return Err(EngineError::Configuration(format!(
            "context size {} does not exceed the {} overhead of {} tokens",
            context_size, call_site, overhead
        )));
    }

    let available = context_size - overhead;
    Ok(match call_site {
        CallSite::ConceptClustering => (available / TOKENS_PER_TERM).max(1),
        CallSite::OutlineMerge => (available / TOKENS_PER_MERGE_CONCEPT).max(2),
        CallSite::WindowExtraction => (available * CHARS_PER_TOKEN).max(1000),
    })
}

/// Batch and chunk sizes for every call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPlan {
    /// Context size the plan was derived from
    pub context_size: usize,
    /// Terms per clustering batch
    pub concept_batch_size: usize,
    /// Combined concepts allowed in one merge call
    pub max_sections_per_merge: usize,
    /// Characters per extraction window
    pub chunk_chars: usize,
    /// Characters of trailing context repeated in the next window
    pub chunk_overlap: usize,
}

impl BudgetPlan {
    /// Plan every call site for `context_size`
    ///
    /// Fails if any call site would be left without room.
    pub fn plan(context_size: usize) -> Result<Self, EngineError> {
        let concept_batch_size = capacity(CallSite::ConceptClustering, context_size)?;
        let max_sections_per_merge = capacity(CallSite::OutlineMerge, context_size)?;
        let chunk_chars = capacity(CallSite::WindowExtraction, context_size)?;
        let chunk_overlap = (chunk_chars as f64 * 0.10).round() as usize;

        Ok(Self {
            context_size,
            concept_batch_size,
            max_sections_per_merge,
            chunk_chars,
            chunk_overlap,
        })
    }
}
