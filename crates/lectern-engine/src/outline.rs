//! Source course outlines
//!
//! Builds a course's section tree either from sections already known to the graph
//! or by sliding-window extraction over the document text, then places the
//! course's slides under sections by page.

use crate::budget::BudgetPlan;
use crate::chunking::{SlidingWindow, TextWindow};
use crate::config::EngineConfig;
use crate::error::{AbortReason, EngineError};
use crate::invoke::{call_blocking, dispatch_all};
use crate::report::{GenerationWarning, InvocationStats, Stage};
use crate::types::{SlideRef, SourceSection};
use lectern_domain::traits::OutlineWindowExtractor;
use lectern_domain::{OutlineEntry, SectionOutlineNode, SlideId};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outline of one document plus what went wrong on the way
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedOutline {
    /// Sections ordered by start page
    pub nodes: Vec<SectionOutlineNode>,
    /// Windows the document was split into
    pub windows: usize,
    /// One warning per dropped window
    pub warnings: Vec<GenerationWarning>,
    /// Extraction calls
    pub stats: InvocationStats,
}

/// Extracts one course outline from a document too long for a single call
pub struct SlidingWindowOutlineExtractor<E> {
    extractor: Arc<E>,
    window: SlidingWindow,
    call_timeout: Duration,
    max_concurrent: usize,
}

impl<E> SlidingWindowOutlineExtractor<E>
where
    E: OutlineWindowExtractor + Send + Sync + 'static,
{
    /// Create an extractor sized by `plan`
    pub fn new(extractor: Arc<E>, plan: &BudgetPlan, config: &EngineConfig) -> Self {
        Self {
            extractor,
            window: SlidingWindow::new(plan.chunk_chars, plan.chunk_overlap),
            call_timeout: config.call_timeout(),
            max_concurrent: config.max_concurrent_calls,
        }
    }

    /// Extract the outline of `text`
    ///
    /// Failed windows are dropped with a warning. If every window fails the stage
    /// has failed and the run is aborted.
    #[instrument(skip_all, fields(course = course_id, chars = text.len()))]
    pub async fn extract(
        &self,
        course_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<ExtractedOutline, EngineError> {
        let windows = self.window.windows(text);
        let window_count = windows.len();
        info!(windows = window_count, "Extracting outline");

        let results = dispatch_all(windows, self.max_concurrent, cancel, |window: TextWindow| {
            let extractor = Arc::clone(&self.extractor);
            let timeout = self.call_timeout;
            async move {
                let index = window.index;
                let entries = call_blocking(extractor, timeout, move |e: &E| {
                    e.extract_outline_window(&window.text)
                        .map_err(|err| err.to_string())
                })
                .await;
                (index, entries)
            }
        })
        .await?;

        let mut stats = InvocationStats::default();
        let mut warnings = Vec::new();
        let mut per_window = Vec::with_capacity(window_count);

        for (index, result) in results {
            stats.record(result.is_ok());
            match result {
                Ok(entries) => {
                    debug!(window = index, entries = entries.len(), "Window extracted");
                    per_window.push(entries);
                }
                Err(e) => {
                    warn!(window = index, "Dropping outline window: {}", e);
                    warnings.push(GenerationWarning::partial(
                        Stage::OutlineExtraction,
                        format!("course {} window {}", course_id, index),
                        e,
                    ));
                }
            }
        }

        if stats.all_failed() {
            return Err(EngineError::Aborted(AbortReason::StageFailed {
                stage: Stage::OutlineExtraction,
                attempted: stats.attempted,
            }));
        }

        let nodes = merge_windows(course_id, per_window);
        info!(sections = nodes.len(), "Outline extracted");

        Ok(ExtractedOutline {
            nodes,
            windows: window_count,
            warnings,
            stats,
        })
    }
}

/// Combine per-window headings into one outline
///
/// Headings sharing a start page keep the earliest one seen; headings without a page
/// are always kept. The result is stably ordered by start page, a missing page
/// counting as 0, with parents derived from levels.
pub fn merge_windows(course_id: &str, windows: Vec<Vec<OutlineEntry>>) -> Vec<SectionOutlineNode> {
    let mut seen_pages = BTreeSet::new();
    let mut entries: Vec<OutlineEntry> = Vec::new();

    for entry in windows.into_iter().flatten() {
        if entry.title.trim().is_empty() {
            continue;
        }
        if let Some(page) = entry.start_page {
            if !seen_pages.insert(page) {
                debug!(page, title = %entry.title, "Discarding duplicate heading");
                continue;
            }
        }
        entries.push(entry);
    }

    entries.sort_by_key(|e| e.start_page.unwrap_or(0));

    let sections = entries
        .into_iter()
        .map(|e| SourceSection {
            title: e.title.trim().to_string(),
            level: e.level,
            start_page: e.start_page,
            slide_ids: Vec::new(),
        })
        .collect::<Vec<_>>();
    build_nodes(course_id, &sections)
}

/// Turn sections in document order into linked outline nodes
///
/// A section's parent is the nearest preceding section with a lower level.
pub fn build_nodes(course_id: &str, sections: &[SourceSection]) -> Vec<SectionOutlineNode> {
    let mut nodes: Vec<SectionOutlineNode> = Vec::with_capacity(sections.len());
    // (level, index) of the open ancestors
    let mut stack: Vec<(u32, usize)> = Vec::new();

    for (index, section) in sections.iter().enumerate() {
        while stack.last().is_some_and(|(level, _)| *level >= section.level) {
            stack.pop();
        }
        let parent_id = stack.last().map(|(_, i)| nodes[*i].id.clone());
        stack.push((section.level, index));

        nodes.push(SectionOutlineNode {
            id: format!("{}-s{}", course_id, index),
            title: section.title.clone(),
            level: section.level,
            parent_id,
            concepts: Vec::new(),
            source_course_id: course_id.to_string(),
            start_page: section.start_page,
            slide_ids: section.slide_ids.clone(),
        });
    }

    nodes
}

/// Restrict section slides to the course's selection and place the rest by page
///
/// A slide goes under the section with the highest start page not after the slide's
/// page; among equal start pages the later (deeper) section wins. Returns the slides
/// that fit no section, in selection order.
pub fn place_slides(nodes: &mut [SectionOutlineNode], slides: &[SlideRef]) -> Vec<SlideId> {
    let selected: BTreeSet<&SlideId> = slides.iter().map(|s| &s.slide_id).collect();
    let mut placed: BTreeSet<SlideId> = BTreeSet::new();

    for node in nodes.iter_mut() {
        node.slide_ids
            .retain(|id| selected.contains(id) && placed.insert(id.clone()));
    }

    let mut loose = Vec::new();
    for slide in slides {
        if placed.contains(&slide.slide_id) {
            continue;
        }
        let target = slide.page.and_then(|page| {
            let mut best: Option<(u32, usize)> = None;
            for (i, node) in nodes.iter().enumerate() {
                if let Some(start) = node.start_page {
                    if start <= page && best.map_or(true, |(b, _)| start >= b) {
                        best = Some((start, i));
                    }
                }
            }
            best.map(|(_, i)| i)
        });

        match target {
            Some(i) => nodes[i].slide_ids.push(slide.slide_id.clone()),
            None => loose.push(slide.slide_id.clone()),
        }
        placed.insert(slide.slide_id.clone());
    }

    loose
}
