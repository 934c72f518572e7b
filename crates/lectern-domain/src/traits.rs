//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the engine and its collaborators.
//! Every call may be slow; callers run them on a blocking pool under a timeout.
//! Infrastructure implementations live in other crates.

use crate::{
    ConceptAnnotation, ConceptCluster, MergeSection, OutlineEntry, ScoredSlide, SlideId,
};
use std::collections::BTreeSet;
use std::fmt::Display;

/// Trait for LLM provider operations
///
/// Implemented by the infrastructure layer (lectern-llm)
pub trait LlmProvider {
    /// Error type for LLM operations
    type Error: Display;

    /// Generate text completion
    fn generate(&self, prompt: &str) -> Result<String, Self::Error>;
}

/// Proposes outline headings for one window of a document's text
pub trait OutlineWindowExtractor {
    /// Error type for extraction calls
    type Error: Display;

    /// Extract the headings found in `text_chunk`
    fn extract_outline_window(&self, text_chunk: &str) -> Result<Vec<OutlineEntry>, Self::Error>;
}

/// Groups a batch of concept terms into synonym clusters
pub trait ConceptClusterer {
    /// Error type for clustering calls
    type Error: Display;

    /// Cluster `term_batch` into canonical concepts
    fn cluster_concepts(&self, term_batch: &[String]) -> Result<Vec<ConceptCluster>, Self::Error>;
}

/// Combines two outlines into one consolidated outline
pub trait OutlinePairMerger {
    /// Error type for merge calls
    type Error: Display;

    /// Merge `outline_a` and `outline_b`; `budget` is the concept budget of the call
    fn merge_outline_pair(
        &self,
        outline_a: &[MergeSection],
        outline_b: &[MergeSection],
        budget: usize,
    ) -> Result<Vec<MergeSection>, Self::Error>;
}

/// Semantic similarity search over slides
///
/// Implemented by the vector index (lectern-store offers an in-memory one)
pub trait VectorSearch {
    /// Error type for search calls
    type Error: Display;

    /// Find up to `top_n` slides among `filter_ids` matching `query_concepts`
    fn vector_search(
        &self,
        query_concepts: &[String],
        filter_ids: &BTreeSet<SlideId>,
        top_n: usize,
    ) -> Result<Vec<ScoredSlide>, Self::Error>;
}

/// Read access to slide concept annotations in the graph store
pub trait AnnotationSource {
    /// Error type for store reads
    type Error: Display;

    /// All concept annotations of one slide
    fn get_concept_annotations(
        &self,
        slide_id: &SlideId,
    ) -> Result<Vec<ConceptAnnotation>, Self::Error>;
}
