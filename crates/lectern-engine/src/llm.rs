//! Capabilities backed by a text-generation model
//!
//! Each adapter builds a prompt, calls `LlmProvider::generate`, and parses the
//! response. They are synchronous like the provider; the pipeline runs them on the
//! blocking pool.

use crate::error::EngineError;
use crate::parser::{parse_clusters, parse_merge_sections, parse_outline_entries};
use crate::prompt::PromptBuilder;
use lectern_domain::traits::{
    ConceptClusterer, LlmProvider, OutlinePairMerger, OutlineWindowExtractor,
};
use lectern_domain::{ConceptCluster, MergeSection, OutlineEntry};
use std::sync::Arc;
use tracing::debug;

fn generate<L: LlmProvider>(llm: &L, prompt: &str) -> Result<String, EngineError> {
    debug!("Prompt length: {} chars", prompt.len());
    let response = llm
        .generate(prompt)
        .map_err(|e| EngineError::Capability(format!("LLM error: {}", e)))?;
    debug!("LLM response length: {} chars", response.len());
    Ok(response)
}

/// Outline extraction over one text window
pub struct LlmOutlineExtractor<L> {
    llm: Arc<L>,
}

impl<L: LlmProvider> LlmOutlineExtractor<L> {
    /// Create an extractor sharing `llm`
    pub fn new(llm: Arc<L>) -> Self {
        Self { llm }
    }
}

impl<L: LlmProvider> OutlineWindowExtractor for LlmOutlineExtractor<L> {
    type Error = EngineError;

    fn extract_outline_window(&self, text_chunk: &str) -> Result<Vec<OutlineEntry>, Self::Error> {
        let response = generate(self.llm.as_ref(), &PromptBuilder::outline_window(text_chunk))?;
        parse_outline_entries(&response)
    }
}

/// Synonym clustering of a term batch
pub struct LlmConceptClusterer<L> {
    llm: Arc<L>,
}

impl<L: LlmProvider> LlmConceptClusterer<L> {
    /// Create a clusterer sharing `llm`
    pub fn new(llm: Arc<L>) -> Self {
        Self { llm }
    }
}

impl<L: LlmProvider> ConceptClusterer for LlmConceptClusterer<L> {
    type Error = EngineError;

    fn cluster_concepts(&self, term_batch: &[String]) -> Result<Vec<ConceptCluster>, Self::Error> {
        if term_batch.is_empty() {
            return Ok(Vec::new());
        }
        let response = generate(self.llm.as_ref(), &PromptBuilder::cluster_concepts(term_batch))?;
        parse_clusters(&response)
    }
}

/// Merge of two outlines into the standard course template
pub struct LlmOutlineMerger<L> {
    llm: Arc<L>,
}

impl<L: LlmProvider> LlmOutlineMerger<L> {
    /// Create a merger sharing `llm`
    pub fn new(llm: Arc<L>) -> Self {
        Self { llm }
    }
}

impl<L: LlmProvider> OutlinePairMerger for LlmOutlineMerger<L> {
    type Error = EngineError;

    fn merge_outline_pair(
        &self,
        outline_a: &[MergeSection],
        outline_b: &[MergeSection],
        budget: usize,
    ) -> Result<Vec<MergeSection>, Self::Error> {
        let prompt = PromptBuilder::merge_outlines(outline_a, outline_b, budget);
        let response = generate(self.llm.as_ref(), &prompt)?;
        parse_merge_sections(&response)
    }
}
