//! Suggest source slides for target sections
//!
//! Every selected slide ends up either suggested for at least one section or in the
//! reserved review section, never both and never neither.

use crate::config::EngineConfig;
use crate::error::{AbortReason, EngineError};
use crate::invoke::{call_blocking, dispatch_all};
use crate::parser::NO_SOURCE_DATA;
use crate::report::{GenerationWarning, InvocationStats, Stage};
use lectern_domain::traits::VectorSearch;
use lectern_domain::{
    ScoredSlide, SectionAssignment, SectionKind, SlideAssignment, SlideId, TargetSection,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Title of the reserved section holding unmatched slides
pub const REVIEW_SECTION_TITLE: &str = "Unassigned Source Material";

/// Target outline with slide suggestions filled in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOutline {
    /// Sections in order, review section last when present
    pub sections: Vec<TargetSection>,
    /// Slides per section plus the unassigned bucket
    pub assignment: SlideAssignment,
    /// Failed searches
    pub warnings: Vec<GenerationWarning>,
    /// Search calls
    pub stats: InvocationStats,
}

/// Keep the usable part of one search response
///
/// Drops slides outside `selected` and below `threshold`, keeps the best score of a
/// repeated slide, orders by score then slide id, and keeps `top_n`.
pub fn reconcile(
    results: Vec<ScoredSlide>,
    selected: &BTreeSet<SlideId>,
    threshold: f64,
    top_n: usize,
) -> Vec<SlideId> {
    let mut best: HashMap<SlideId, f64> = HashMap::new();
    for result in results {
        if !selected.contains(&result.slide_id) || !(result.score >= threshold) {
            continue;
        }
        let score = best.entry(result.slide_id).or_insert(result.score);
        *score = score.max(result.score);
    }

    let mut ranked: Vec<(SlideId, f64)> = best.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    ranked.into_iter().map(|(id, _)| id).collect()
}

/// Whether `section` is a review section this resolver added on an earlier run
///
/// Only a top-level, childless section with the reserved kind and title counts.
fn is_generated_review(section: &TargetSection, sections: &[TargetSection]) -> bool {
    section.is_review()
        && section.title == REVIEW_SECTION_TITLE
        && section.parent_id.is_none()
        && !sections
            .iter()
            .any(|s| s.parent_id.as_deref() == Some(section.id.as_str()))
}

/// Order and id for a new last section, clear of every existing id
fn next_slot(sections: &[TargetSection]) -> (u32, String) {
    let taken: HashSet<&str> = sections.iter().map(|s| s.id.as_str()).collect();
    let mut order = sections.iter().map(|s| s.order + 1).max().unwrap_or(0);
    while taken.contains(format!("t-{}", order).as_str()) {
        order += 1;
    }
    (order, format!("t-{}", order))
}

/// Mark sections with no suggestion in themselves or any descendant
///
/// Sections must be in pre-order so that every child follows its parent.
fn mark_placeholders(sections: &mut [TargetSection]) {
    let mut has_material: HashMap<String, bool> = sections
        .iter()
        .map(|s| (s.id.clone(), !s.suggested_source_ids.is_empty()))
        .collect();

    for section in sections.iter().rev() {
        if has_material.get(&section.id).copied().unwrap_or(false) {
            if let Some(parent) = &section.parent_id {
                has_material.insert(parent.clone(), true);
            }
        }
    }

    for section in sections.iter_mut() {
        let covered = has_material.get(&section.id).copied().unwrap_or(false);
        section.is_placeholder = !covered || section.rationale.trim() == NO_SOURCE_DATA;
    }
}

/// Similarity-search based slide assignment
pub struct SlideAssignmentResolver<V> {
    search: Arc<V>,
    top_n: usize,
    threshold: f64,
    call_timeout: Duration,
    max_concurrent: usize,
    synonyms: HashMap<String, Vec<String>>,
}

impl<V> SlideAssignmentResolver<V>
where
    V: VectorSearch + Send + Sync + 'static,
{
    /// Create a resolver over `search`
    pub fn new(search: Arc<V>, config: &EngineConfig) -> Self {
        Self {
            search,
            top_n: config.top_n,
            threshold: config.similarity_threshold,
            call_timeout: config.call_timeout(),
            max_concurrent: config.max_concurrent_calls,
            synonyms: HashMap::new(),
        }
    }

    /// Also query the raw terms behind each canonical concept
    pub fn with_query_expansion(mut self, synonyms: HashMap<String, Vec<String>>) -> Self {
        self.synonyms = synonyms;
        self
    }

    fn query_for(&self, key_concepts: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        key_concepts
            .iter()
            .flat_map(|concept| {
                std::iter::once(concept).chain(self.synonyms.get(concept).into_iter().flatten())
            })
            .filter(|term| seen.insert(term.as_str()))
            .cloned()
            .collect()
    }

    /// Fill `suggested_source_ids` and build the assignment
    ///
    /// The input is not modified. A review section added by an earlier run is
    /// replaced; every other section is kept. Sections marked as having no source
    /// data are not searched.
    #[instrument(skip_all, fields(sections = sections.len(), selected = selected.len()))]
    pub async fn resolve(
        &self,
        sections: &[TargetSection],
        selected: &[SlideId],
        cancel: &CancellationToken,
    ) -> Result<ResolvedOutline, EngineError> {
        let mut sections: Vec<TargetSection> = sections
            .iter()
            .filter(|s| !is_generated_review(s, sections))
            .cloned()
            .collect();
        let filter: Arc<BTreeSet<SlideId>> = Arc::new(selected.iter().cloned().collect());

        let queries: Vec<(usize, Vec<String>)> = sections
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                !s.key_concepts.is_empty() && s.rationale.trim() != NO_SOURCE_DATA
            })
            .map(|(index, s)| (index, self.query_for(&s.key_concepts)))
            .collect();
        debug!(queries = queries.len(), "Searching slides for sections");

        let responses = dispatch_all(queries, self.max_concurrent, cancel, |(index, query)| {
            let search = Arc::clone(&self.search);
            let filter = Arc::clone(&filter);
            let top_n = self.top_n;
            let call_timeout = self.call_timeout;
            async move {
                let outcome = call_blocking(search, call_timeout, move |v: &V| {
                    v.vector_search(&query, &filter, top_n)
                        .map_err(|e| e.to_string())
                })
                .await;
                (index, outcome)
            }
        })
        .await?;

        let mut stats = InvocationStats::default();
        let mut warnings = Vec::new();
        for section in sections.iter_mut() {
            section.suggested_source_ids.clear();
        }
        for (index, outcome) in responses {
            stats.record(outcome.is_ok());
            match outcome {
                Ok(results) => {
                    sections[index].suggested_source_ids =
                        reconcile(results, &filter, self.threshold, self.top_n);
                }
                Err(e) => {
                    let section = &sections[index];
                    warn!(section = %section.id, "Slide search failed: {}", e);
                    warnings.push(GenerationWarning::partial(
                        Stage::SlideSearch,
                        format!("section {}", section.id),
                        e,
                    ));
                }
            }
        }

        if stats.all_failed() {
            return Err(EngineError::Aborted(AbortReason::StageFailed {
                stage: Stage::SlideSearch,
                attempted: stats.attempted,
            }));
        }

        mark_placeholders(&mut sections);

        let buckets: Vec<SectionAssignment> = sections
            .iter()
            .map(|s| SectionAssignment {
                section_id: s.id.clone(),
                slide_ids: s.suggested_source_ids.clone(),
            })
            .collect();
        let mut assignment = SlideAssignment {
            buckets,
            unassigned: Vec::new(),
        };
        let assigned = assignment.assigned_slides();
        let mut seen = HashSet::new();
        assignment.unassigned = selected
            .iter()
            .filter(|id| !assigned.contains(*id) && seen.insert(*id))
            .cloned()
            .collect();

        if !assignment.unassigned.is_empty() {
            let (order, id) = next_slot(&sections);
            sections.push(TargetSection {
                id,
                title: REVIEW_SECTION_TITLE.to_string(),
                rationale: "Selected source slides that matched no section".to_string(),
                key_concepts: Vec::new(),
                level: 0,
                order,
                parent_id: None,
                kind: SectionKind::Review,
                is_placeholder: false,
                suggested_source_ids: assignment.unassigned.clone(),
            });
        }

        info!(
            assigned = assigned.len(),
            unassigned = assignment.unassigned.len(),
            "Slide assignment complete"
        );

        Ok(ResolvedOutline {
            sections,
            assignment,
            warnings,
            stats,
        })
    }
}
