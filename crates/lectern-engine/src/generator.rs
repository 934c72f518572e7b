//! End-to-end curriculum generation
//!
//! One request runs as a strict pipeline: budget plan, course outlines, annotation
//! fetch, aggregation, harmonization, merge and slide assignment. Cancellation is
//! checked before every stage and the overall failure ratio after every stage that
//! calls a capability.

use crate::aggregator::{ConceptAggregator, ConceptSummary};
use crate::budget::BudgetPlan;
use crate::config::EngineConfig;
use crate::error::{AbortReason, EngineError};
use crate::harmonizer::ConceptHarmonizer;
use crate::invoke::{call_blocking, dispatch_all};
use crate::merger::PairwiseOutlineMerger;
use crate::outline::{build_nodes, place_slides, SlidingWindowOutlineExtractor};
use crate::report::{GenerationSummary, GenerationWarning, InvocationStats, Stage};
use crate::resolver::SlideAssignmentResolver;
use crate::types::{CourseOutline, CourseSource, GenerationOutcome, GenerationRequest, OutlineSource};
use lectern_domain::traits::{
    AnnotationSource, ConceptClusterer, OutlinePairMerger, OutlineWindowExtractor, VectorSearch,
};
use lectern_domain::{ConceptAnnotation, RunId, SectionOutlineNode, SlideId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Warnings and call counts accumulated across stages
#[derive(Debug, Default)]
struct RunLog {
    warnings: Vec<GenerationWarning>,
    stats: InvocationStats,
}

impl RunLog {
    fn absorb(&mut self, warnings: Vec<GenerationWarning>, stats: InvocationStats) {
        self.warnings.extend(warnings);
        self.stats.absorb(stats);
    }
}

fn ensure_active(cancel: &CancellationToken, stage: Stage) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        info!(stage = %stage, "Generation cancelled");
        return Err(EngineError::cancelled());
    }
    Ok(())
}

/// Consolidates selected courses into one curriculum outline
pub struct CurriculumGenerator<E, C, M, V, A> {
    extractor: Arc<E>,
    clusterer: Arc<C>,
    merger: Arc<M>,
    search: Arc<V>,
    annotations: Arc<A>,
    config: EngineConfig,
}

impl<E, C, M, V, A> CurriculumGenerator<E, C, M, V, A>
where
    E: OutlineWindowExtractor + Send + Sync + 'static,
    C: ConceptClusterer + Send + Sync + 'static,
    M: OutlinePairMerger + Send + Sync + 'static,
    V: VectorSearch + Send + Sync + 'static,
    A: AnnotationSource + Send + Sync + 'static,
{
    /// Create a generator over its capabilities
    pub fn new(
        extractor: Arc<E>,
        clusterer: Arc<C>,
        merger: Arc<M>,
        search: Arc<V>,
        annotations: Arc<A>,
        config: EngineConfig,
    ) -> Self {
        Self {
            extractor,
            clusterer,
            merger,
            search,
            annotations,
            config,
        }
    }

    /// Configuration used for every request
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generate a consolidated outline for `request`
    ///
    /// Returns a complete outline with its warnings, or an error and no outline.
    #[instrument(skip_all, fields(courses = request.courses.len()))]
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, EngineError> {
        self.config.validate().map_err(EngineError::Configuration)?;
        let plan = BudgetPlan::plan(self.config.context_size)?;
        request.validate()?;

        let run_id = RunId::new();
        info!(
            run = %run_id,
            context_size = plan.context_size,
            batch = plan.concept_batch_size,
            merge_budget = plan.max_sections_per_merge,
            "Starting generation"
        );

        let selected = request.selected_slides();
        let mut log = RunLog::default();
        let mut summary = GenerationSummary::new(run_id);
        summary.courses = request.courses.len();
        summary.slides_selected = selected.len();

        ensure_active(cancel, Stage::OutlineExtraction)?;
        let mut outlines = Vec::with_capacity(request.courses.len());
        for course in &request.courses {
            outlines.push(self.course_outline(course, &plan, &mut log, cancel).await?);
        }
        self.check_failures(&log)?;

        ensure_active(cancel, Stage::AnnotationFetch)?;
        let annotations = self.fetch_annotations(&selected, &mut log, cancel).await?;
        self.check_failures(&log)?;

        let aggregator = ConceptAggregator::new(annotations);
        for outline in outlines.iter_mut() {
            aggregator.summarize_outline(&mut outline.nodes);
        }

        ensure_active(cancel, Stage::ConceptClustering)?;
        let terms: Vec<String> = outlines
            .iter()
            .flat_map(|o| o.nodes.iter())
            .flat_map(|n| n.concepts.iter().map(|c| c.term.clone()))
            .collect();
        let harmonizer = ConceptHarmonizer::new(Arc::clone(&self.clusterer), &plan, &self.config);
        let harmonized = harmonizer.harmonize(&terms, cancel).await?;
        log.absorb(harmonized.warnings.clone(), harmonized.stats);
        self.check_failures(&log)?;

        for outline in outlines.iter_mut() {
            for node in outline.nodes.iter_mut() {
                node.concepts = ConceptSummary::from_concepts(&node.concepts)
                    .canonicalize(&harmonized.mapping)
                    .into_concepts();
            }
        }
        summary.raw_concepts = harmonized.mapping.len();
        summary.canonical_concepts = harmonized.concepts.len();
        summary.harmonization_rounds = harmonized.rounds;
        summary.harmonization_converged = harmonized.converged;

        ensure_active(cancel, Stage::OutlineMerge)?;
        let merger = PairwiseOutlineMerger::new(Arc::clone(&self.merger), &plan, &self.config);
        let merged = merger.merge(&outlines, cancel).await?;
        log.absorb(merged.warnings, merged.stats);
        self.check_failures(&log)?;
        summary.merge_calls = merged.merge_calls;
        summary.deferred_pairs = merged.deferred_pairs;
        summary.unmerged_sets = merged.unmerged_sets;

        ensure_active(cancel, Stage::SlideSearch)?;
        let resolver = SlideAssignmentResolver::new(Arc::clone(&self.search), &self.config)
            .with_query_expansion(harmonized.synonyms());
        let resolved = resolver.resolve(&merged.sections, &selected, cancel).await?;
        log.absorb(resolved.warnings, resolved.stats);
        self.check_failures(&log)?;

        summary.sections_produced = resolved.sections.len();
        summary.placeholder_sections = resolved.sections.iter().filter(|s| s.is_placeholder).count();
        summary.slides_assigned = resolved.assignment.assigned_slides().len();
        summary.slides_unassigned = resolved.assignment.unassigned.len();
        summary.invocations = log.stats;
        summary.warnings = log.warnings;

        info!(
            sections = summary.sections_produced,
            unassigned = summary.slides_unassigned,
            warnings = summary.warnings.len(),
            "Generation complete"
        );

        Ok(GenerationOutcome {
            sections: resolved.sections,
            assignment: resolved.assignment,
            concepts: harmonized.concepts,
            summary,
        })
    }

    /// Outline of one course with its slides placed under sections
    ///
    /// A course with no sections gets a single section titled after the course so
    /// that its material still reaches the merge.
    async fn course_outline(
        &self,
        course: &CourseSource,
        plan: &BudgetPlan,
        log: &mut RunLog,
        cancel: &CancellationToken,
    ) -> Result<CourseOutline, EngineError> {
        let mut nodes = match &course.outline {
            OutlineSource::Sections { sections } => build_nodes(&course.course_id, sections),
            OutlineSource::Document { text } => {
                let extractor = SlidingWindowOutlineExtractor::new(Arc::clone(&self.extractor), plan, &self.config);
                let extracted = extractor.extract(&course.course_id, text, cancel).await?;
                log.absorb(extracted.warnings, extracted.stats);
                extracted.nodes
            }
        };

        let mut loose_slides = place_slides(&mut nodes, &course.slides);
        if nodes.is_empty() && !loose_slides.is_empty() {
            debug!(course = %course.course_id, "No outline; using the course as one section");
            nodes.push(SectionOutlineNode {
                id: format!("{}-s0", course.course_id),
                title: course.title.clone(),
                level: 0,
                parent_id: None,
                concepts: Vec::new(),
                source_course_id: course.course_id.clone(),
                start_page: None,
                slide_ids: std::mem::take(&mut loose_slides),
            });
        }

        debug!(
            course = %course.course_id,
            sections = nodes.len(),
            loose = loose_slides.len(),
            "Course outline ready"
        );
        Ok(CourseOutline {
            course_id: course.course_id.clone(),
            title: course.title.clone(),
            business_unit: course.business_unit.clone(),
            nodes,
            loose_slides,
        })
    }

    /// Annotations of every selected slide
    ///
    /// Failed reads are warnings; the slide then contributes no concepts.
    async fn fetch_annotations(
        &self,
        selected: &[SlideId],
        log: &mut RunLog,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConceptAnnotation>, EngineError> {
        let timeout = self.config.call_timeout();
        let responses = dispatch_all(selected.to_vec(), self.config.max_concurrent_calls, cancel, |slide_id: SlideId| {
            let source = Arc::clone(&self.annotations);
            async move {
                let id = slide_id.clone();
                let outcome = call_blocking(source, timeout, move |a: &A| {
                    a.get_concept_annotations(&id).map_err(|e| e.to_string())
                })
                .await;
                (slide_id, outcome)
            }
        })
        .await?;

        let mut stats = InvocationStats::default();
        let mut annotations = Vec::new();
        for (slide_id, outcome) in responses {
            stats.record(outcome.is_ok());
            match outcome {
                // The source may return rows for other slides; keep only this one's
                Ok(rows) => annotations.extend(rows.into_iter().filter(|a| a.slide_id == slide_id)),
                Err(e) => {
                    warn!(slide = %slide_id, "Annotation fetch failed: {}", e);
                    log.warnings.push(GenerationWarning::partial(
                        Stage::AnnotationFetch,
                        format!("slide {}", slide_id),
                        e,
                    ));
                }
            }
        }

        if stats.all_failed() {
            return Err(EngineError::Aborted(AbortReason::StageFailed {
                stage: Stage::AnnotationFetch,
                attempted: stats.attempted,
            }));
        }

        let distinct: HashSet<&SlideId> = annotations.iter().map(|a| &a.slide_id).collect();
        info!(
            annotations = annotations.len(),
            annotated_slides = distinct.len(),
            "Annotations fetched"
        );
        log.stats.absorb(stats);
        Ok(annotations)
    }

    fn check_failures(&self, log: &RunLog) -> Result<(), EngineError> {
        let ratio = log.stats.failure_ratio();
        if ratio > self.config.max_failure_ratio {
            warn!(
                failed = log.stats.failed,
                attempted = log.stats.attempted,
                "Failure ratio exceeded"
            );
            return Err(EngineError::Aborted(AbortReason::FailureRatioExceeded {
                failed: log.stats.failed,
                attempted: log.stats.attempted,
                max_ratio: self.config.max_failure_ratio,
            }));
        }
        Ok(())
    }
}
