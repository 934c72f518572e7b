//! Pairwise consolidation of course outlines into one target outline
//!
//! Outline sets are merged two at a time, first within each business unit and then
//! across units. A pair is only sent to the merge capability when its combined
//! concept count fits the merge budget; pairs that do not fit wait for another
//! partner. Whatever cannot be merged is kept under a grouping section.

use crate::budget::BudgetPlan;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::invoke::call_blocking;
use crate::parser::NO_SOURCE_DATA;
use crate::report::{GenerationWarning, InvocationStats, Stage};
use crate::types::CourseOutline;
use lectern_domain::traits::OutlinePairMerger;
use lectern_domain::{MergeSection, SectionKind, TargetSection};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of the merge stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Target sections in pre-order, ids `t-<order>`
    pub sections: Vec<TargetSection>,
    /// Merge calls issued
    pub merge_calls: usize,
    /// Distinct set pairs that were over budget when considered
    pub deferred_pairs: usize,
    /// Sets left standing on their own (0 when everything merged)
    pub unmerged_sets: usize,
    /// Failed merges
    pub warnings: Vec<GenerationWarning>,
    /// Merge calls
    pub stats: InvocationStats,
}

/// A unit of the merge bracket: one course's outline or an earlier merge result
#[derive(Debug, Clone)]
struct OutlineSet {
    id: usize,
    label: String,
    business_unit: String,
    sections: Vec<MergeSection>,
}

impl OutlineSet {
    fn size(&self) -> usize {
        self.sections.iter().map(MergeSection::concept_count).sum()
    }
}

fn pair_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Bracket state shared by the per-unit and cross-unit phases
#[derive(Debug, Default)]
struct Bracket {
    next_id: usize,
    failed: HashSet<(usize, usize)>,
    deferred: BTreeSet<(usize, usize)>,
    warnings: Vec<GenerationWarning>,
    stats: InvocationStats,
}

impl Bracket {
    fn fresh_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// First-fit pairing in stable order: each set takes the first later unpaired
    /// set it fits with
    fn pair_round(&mut self, sets: &[OutlineSet], budget: usize) -> Vec<(usize, usize)> {
        let mut paired = vec![false; sets.len()];
        let mut pairs = Vec::new();

        for i in 0..sets.len() {
            if paired[i] {
                continue;
            }
            for j in (i + 1)..sets.len() {
                if paired[j] {
                    continue;
                }
                let key = pair_key(sets[i].id, sets[j].id);
                if self.failed.contains(&key) {
                    continue;
                }
                if sets[i].size() + sets[j].size() <= budget {
                    paired[i] = true;
                    paired[j] = true;
                    pairs.push((i, j));
                    break;
                }
                self.deferred.insert(key);
            }
        }
        pairs
    }
}

/// Source sections of a course as merge input
///
/// Each section contributes its top `concept_limit` concepts.
pub fn course_sections(course: &CourseOutline, concept_limit: usize) -> Vec<MergeSection> {
    let origin = if course.business_unit.is_empty() {
        &course.title
    } else {
        &course.business_unit
    };

    course
        .nodes
        .iter()
        .enumerate()
        .map(|(order, node)| MergeSection {
            title: node.title.clone(),
            rationale: format!("Based on content from {}", origin),
            key_concepts: node.top_terms(concept_limit),
            level: node.level,
            order: order as u32,
            kind: SectionKind::Technical,
        })
        .collect()
}

/// Flatten outline sets into linked target sections
///
/// A single set becomes the outline itself. Several sets each get a grouping
/// section titled by their origin, with their sections nested beneath. Levels are
/// clamped so that no section is more than one level below its predecessor.
fn into_targets(sets: Vec<OutlineSet>) -> Vec<TargetSection> {
    let standalone = sets.len() == 1;
    let mut flat: Vec<(u32, MergeSection)> = Vec::new();

    for set in sets {
        if standalone {
            flat.extend(set.sections.into_iter().map(|s| (s.level, s)));
            continue;
        }
        let wrapper = MergeSection {
            title: set.label.clone(),
            rationale: format!("Outline of {} kept separate; it was not merged with the other outlines", set.label),
            key_concepts: Vec::new(),
            level: 0,
            order: 0,
            kind: SectionKind::Grouping,
        };
        flat.push((0, wrapper));
        flat.extend(set.sections.into_iter().map(|s| (s.level + 1, s)));
    }

    let mut stack: Vec<(u32, String)> = Vec::new();
    let mut targets = Vec::with_capacity(flat.len());

    for (order, (raw_level, section)) in flat.into_iter().enumerate() {
        while stack.last().is_some_and(|(level, _)| *level >= raw_level) {
            stack.pop();
        }
        let id = format!("t-{}", order);
        let parent_id = stack.last().map(|(_, parent)| parent.clone());
        let level = stack.len() as u32;
        stack.push((raw_level, id.clone()));

        let mut seen = HashSet::new();
        let key_concepts: Vec<String> = section
            .key_concepts
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty() && seen.insert(c.to_string()))
            .map(str::to_string)
            .collect();
        let is_placeholder = section.rationale.trim() == NO_SOURCE_DATA;

        targets.push(TargetSection {
            id,
            title: section.title,
            rationale: section.rationale,
            key_concepts,
            level,
            order: order as u32,
            parent_id,
            kind: section.kind,
            is_placeholder,
            suggested_source_ids: Vec::new(),
        });
    }
    targets
}

/// Budget-bounded pairwise outline merger
pub struct PairwiseOutlineMerger<M> {
    merger: Arc<M>,
    budget: usize,
    concept_limit: usize,
    call_timeout: Duration,
}

impl<M> PairwiseOutlineMerger<M>
where
    M: OutlinePairMerger + Send + Sync + 'static,
{
    /// Create a merger sized by `plan`
    pub fn new(merger: Arc<M>, plan: &BudgetPlan, config: &EngineConfig) -> Self {
        Self {
            merger,
            budget: plan.max_sections_per_merge,
            concept_limit: config.section_concept_limit,
            call_timeout: config.call_timeout(),
        }
    }

    /// Merge the outlines of `courses` into one target outline
    #[instrument(skip_all, fields(courses = courses.len(), budget = self.budget))]
    pub async fn merge(
        &self,
        courses: &[CourseOutline],
        cancel: &CancellationToken,
    ) -> Result<MergeOutcome, EngineError> {
        let mut bracket = Bracket::default();

        // Business units in first-seen order
        let mut units: Vec<(String, Vec<OutlineSet>)> = Vec::new();
        for course in courses {
            let sections = course_sections(course, self.concept_limit);
            if sections.is_empty() {
                warn!(course = %course.course_id, "Course has no sections to merge");
                continue;
            }
            let set = OutlineSet {
                id: bracket.fresh_id(),
                label: course.origin_label(),
                business_unit: course.business_unit.clone(),
                sections,
            };
            match units.iter_mut().find(|(bu, _)| *bu == course.business_unit) {
                Some((_, sets)) => sets.push(set),
                None => units.push((course.business_unit.clone(), vec![set])),
            }
        }

        let mut survivors = Vec::new();
        for (unit, sets) in units {
            debug!(unit = %unit, sets = sets.len(), "Merging within business unit");
            survivors.extend(self.run_bracket(sets, &mut bracket, cancel).await?);
        }
        debug!(sets = survivors.len(), "Merging across business units");
        let remaining = self.run_bracket(survivors, &mut bracket, cancel).await?;

        let unmerged_sets = if remaining.len() > 1 { remaining.len() } else { 0 };
        let sections = into_targets(remaining);
        info!(
            sections = sections.len(),
            merge_calls = bracket.stats.attempted,
            deferred = bracket.deferred.len(),
            unmerged = unmerged_sets,
            "Outline merge complete"
        );

        Ok(MergeOutcome {
            sections,
            merge_calls: bracket.stats.attempted,
            deferred_pairs: bracket.deferred.len(),
            unmerged_sets,
            warnings: bracket.warnings,
            stats: bracket.stats,
        })
    }

    /// Merge rounds over `sets` until one remains or no legal pair is left
    ///
    /// Merges run one at a time. A merged set takes the slot of its first member, so
    /// the order of the remaining sets is stable.
    async fn run_bracket(
        &self,
        mut sets: Vec<OutlineSet>,
        bracket: &mut Bracket,
        cancel: &CancellationToken,
    ) -> Result<Vec<OutlineSet>, EngineError> {
        while sets.len() > 1 {
            let pairs = bracket.pair_round(&sets, self.budget);
            if pairs.is_empty() {
                break;
            }

            let mut slots: Vec<Option<OutlineSet>> = sets.into_iter().map(Some).collect();
            for (i, j) in pairs {
                if cancel.is_cancelled() {
                    return Err(EngineError::cancelled());
                }
                let (Some(a), Some(b)) = (slots[i].take(), slots[j].take()) else {
                    continue;
                };

                match self.merge_pair(&a, &b).await {
                    Ok(sections) => {
                        bracket.stats.record(true);
                        debug!(a = %a.label, b = %b.label, sections = sections.len(), "Merged outline pair");
                        let business_unit = if a.business_unit == b.business_unit {
                            a.business_unit.clone()
                        } else {
                            format!("{} + {}", a.business_unit, b.business_unit)
                        };
                        slots[i] = Some(OutlineSet {
                            id: bracket.fresh_id(),
                            label: format!("{} + {}", a.label, b.label),
                            business_unit,
                            sections,
                        });
                    }
                    Err(e) => {
                        bracket.stats.record(false);
                        warn!(a = %a.label, b = %b.label, "Outline merge failed: {}", e);
                        bracket.failed.insert(pair_key(a.id, b.id));
                        bracket.warnings.push(GenerationWarning::partial(
                            Stage::OutlineMerge,
                            format!("outlines {} and {}", a.label, b.label),
                            e,
                        ));
                        slots[i] = Some(a);
                        slots[j] = Some(b);
                    }
                }
            }
            sets = slots.into_iter().flatten().collect();
        }
        Ok(sets)
    }

    async fn merge_pair(&self, a: &OutlineSet, b: &OutlineSet) -> Result<Vec<MergeSection>, EngineError> {
        let outline_a = a.sections.clone();
        let outline_b = b.sections.clone();
        let budget = self.budget;

        let mut sections = call_blocking(Arc::clone(&self.merger), self.call_timeout, move |m: &M| {
            m.merge_outline_pair(&outline_a, &outline_b, budget)
                .map_err(|e| e.to_string())
        })
        .await?;

        if sections.is_empty() {
            return Err(EngineError::InvalidFormat("merged outline has no sections".to_string()));
        }
        for (order, section) in sections.iter_mut().enumerate() {
            section.order = order as u32;
            section.kind = section.kind.unreserved();
        }
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_domain::{SectionOutlineNode, WeightedConcept};
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Concatenates both outlines with concepts deduplicated; records call sizes
    #[derive(Default)]
    struct ConcatMerger {
        calls: Mutex<Vec<(usize, usize)>>,
        fail: bool,
    }

    impl OutlinePairMerger for ConcatMerger {
        type Error = String;

        fn merge_outline_pair(
            &self,
            a: &[MergeSection],
            b: &[MergeSection],
            budget: usize,
        ) -> Result<Vec<MergeSection>, String> {
            let size = a.iter().chain(b).map(MergeSection::concept_count).sum();
            self.calls.lock().unwrap().push((size, budget));
            if self.fail {
                return Err("merge refused".to_string());
            }
            let mut seen = HashSet::new();
            Ok(a.iter()
                .chain(b)
                .map(|s| MergeSection {
                    key_concepts: s
                        .key_concepts
                        .iter()
                        .filter(|c| seen.insert((*c).clone()))
                        .cloned()
                        .collect(),
                    rationale: "Combined".to_string(),
                    ..s.clone()
                })
                .collect())
        }
    }

    fn course(id: &str, bu: &str, sections: &[(&str, u32, &[&str])]) -> CourseOutline {
        CourseOutline {
            course_id: id.to_string(),
            title: id.to_string(),
            business_unit: bu.to_string(),
            nodes: sections
                .iter()
                .enumerate()
                .map(|(i, (title, level, concepts))| SectionOutlineNode {
                    id: format!("{}-s{}", id, i),
                    title: title.to_string(),
                    level: *level,
                    parent_id: None,
                    concepts: concepts
                        .iter()
                        .map(|c| WeightedConcept::new(*c, 1.0))
                        .collect(),
                    source_course_id: id.to_string(),
                    start_page: None,
                    slide_ids: vec![],
                })
                .collect(),
            loose_slides: vec![],
        }
    }

    fn plan(budget: usize) -> BudgetPlan {
        BudgetPlan {
            context_size: 0,
            concept_batch_size: 10,
            max_sections_per_merge: budget,
            chunk_chars: 1000,
            chunk_overlap: 100,
        }
    }

    fn merger(inner: Arc<ConcatMerger>, budget: usize, limit: usize) -> PairwiseOutlineMerger<ConcatMerger> {
        let config = EngineConfig {
            section_concept_limit: limit,
            ..EngineConfig::default()
        };
        PairwiseOutlineMerger::new(inner, &plan(budget), &config)
    }

    #[test]
    fn test_course_sections_carry_origin_and_top_concepts() {
        let c = course("press-a", "Stamping", &[("Die Change", 0, &["Die", "Bolster", "Crane"])]);
        let sections = course_sections(&c, 2);
        assert_eq!(sections[0].key_concepts, vec!["Die", "Bolster"]);
        assert_eq!(sections[0].rationale, "Based on content from Stamping");
    }

    #[tokio::test]
    async fn test_oversized_pair_is_deferred_not_merged() {
        let big: Vec<String> = (0..60).map(|i| format!("a{}", i)).collect();
        let other: Vec<String> = (0..60).map(|i| format!("b{}", i)).collect();
        let big: Vec<&str> = big.iter().map(String::as_str).collect();
        let other: Vec<&str> = other.iter().map(String::as_str).collect();
        let courses = vec![
            course("A", "", &[("Hydraulics", 0, &big[..])]),
            course("B", "", &[("Pneumatics", 0, &other[..])]),
        ];
        let inner = Arc::new(ConcatMerger::default());

        let outcome = merger(Arc::clone(&inner), 14, 100)
            .merge(&courses, &CancellationToken::new())
            .await
            .unwrap();

        assert!(inner.calls.lock().unwrap().is_empty());
        assert_eq!(outcome.merge_calls, 0);
        assert_eq!(outcome.deferred_pairs, 1);
        assert_eq!(outcome.unmerged_sets, 2);
        let titles: Vec<&str> = outcome.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "Hydraulics", "B", "Pneumatics"]);
        assert_eq!(outcome.sections[0].kind, SectionKind::Grouping);
        assert_eq!(outcome.sections[1].parent_id.as_deref(), Some("t-0"));
        assert_eq!(outcome.sections[1].level, 1);
        assert_eq!(outcome.sections[3].parent_id.as_deref(), Some("t-2"));
    }

    #[tokio::test]
    async fn test_business_units_merge_first() {
        let courses = vec![
            course("A", "Stamping", &[("Dies", 0, &["Die", "Bolster"])]),
            course("B", "Welding", &[("Arc", 0, &["Arc", "Wire"])]),
            course("C", "Stamping", &[("Presses", 0, &["Tonnage", "Slide"])]),
        ];
        let inner = Arc::new(ConcatMerger::default());

        let outcome = merger(Arc::clone(&inner), 4, 5)
            .merge(&courses, &CancellationToken::new())
            .await
            .unwrap();

        // A + C within Stamping; the 4-concept result cannot take B
        assert_eq!(outcome.merge_calls, 1);
        assert_eq!(outcome.unmerged_sets, 2);
        assert_eq!(outcome.sections[0].title, "A (Stamping) + C (Stamping)");
        let children: Vec<&str> = outcome
            .sections
            .iter()
            .filter(|s| s.parent_id.as_deref() == Some("t-0"))
            .map(|s| s.title.as_str())
            .collect();
        assert_eq!(children, vec!["Dies", "Presses"]);
    }

    #[tokio::test]
    async fn test_full_merge_yields_single_outline() {
        let courses = vec![
            course("A", "", &[("Intro", 0, &["Scope"]), ("Valves", 1, &["Valve"])]),
            course("B", "", &[("Pumps", 0, &["Pump", "Valve"])]),
            course("C", "", &[("Seals", 0, &["Seal"])]),
        ];
        let outcome = merger(Arc::new(ConcatMerger::default()), 14, 5)
            .merge(&courses, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.merge_calls, 2);
        assert_eq!(outcome.unmerged_sets, 0);
        assert!(outcome.sections.iter().all(|s| s.kind != SectionKind::Grouping));
        let ids: Vec<&str> = outcome.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["t-0", "t-1", "t-2", "t-3"]);
        assert_eq!(outcome.sections[1].parent_id.as_deref(), Some("t-0"));
        // Pumps lost its repeated concept in the concatenating merge
        assert_eq!(outcome.sections[2].key_concepts, vec!["Pump"]);
    }

    /// Labels its merged sections with kinds only the engine may assign
    struct ReservedKindMerger;

    impl OutlinePairMerger for ReservedKindMerger {
        type Error = String;

        fn merge_outline_pair(
            &self,
            _a: &[MergeSection],
            _b: &[MergeSection],
            _budget: usize,
        ) -> Result<Vec<MergeSection>, String> {
            let section = |title: &str, level: u32, kind: SectionKind| MergeSection {
                title: title.to_string(),
                rationale: "Combined".to_string(),
                key_concepts: vec!["Lockout".to_string()],
                level,
                order: 0,
                kind,
            };
            Ok(vec![
                section("Final Review", 0, SectionKind::Review),
                section("Review Questions", 1, SectionKind::Grouping),
            ])
        }
    }

    #[tokio::test]
    async fn test_merged_sections_never_carry_reserved_kinds() {
        let courses = vec![
            course("A", "", &[("Intro", 0, &["Scope"])]),
            course("B", "", &[("Pumps", 0, &["Pump"])]),
        ];
        let config = EngineConfig::default();
        let outcome = PairwiseOutlineMerger::new(Arc::new(ReservedKindMerger), &plan(14), &config)
            .merge(&courses, &CancellationToken::new())
            .await
            .unwrap();

        let kinds: Vec<SectionKind> = outcome.sections.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SectionKind::Assessment, SectionKind::Technical]);
        assert_eq!(outcome.sections[1].parent_id.as_deref(), Some("t-0"));
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_both_sets_and_is_not_retried() {
        let courses = vec![
            course("A", "", &[("Intro", 0, &["Scope"])]),
            course("B", "", &[("Pumps", 0, &["Pump"])]),
        ];
        let inner = Arc::new(ConcatMerger {
            fail: true,
            ..ConcatMerger::default()
        });

        let outcome = merger(Arc::clone(&inner), 14, 5)
            .merge(&courses, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(inner.calls.lock().unwrap().len(), 1);
        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(outcome.unmerged_sets, 2);
        assert!(matches!(
            outcome.warnings[0],
            GenerationWarning::PartialExtraction { stage: Stage::OutlineMerge, .. }
        ));
    }

    #[tokio::test]
    async fn test_single_course_passes_through() {
        let courses = vec![course("A", "", &[("Intro", 0, &["Scope"]), ("Deep", 3, &["Depth"])])];
        let outcome = merger(Arc::new(ConcatMerger::default()), 14, 5)
            .merge(&courses, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.merge_calls, 0);
        assert_eq!(outcome.sections.len(), 2);
        // Level jump clamped to one below the parent
        assert_eq!(outcome.sections[1].level, 1);
        assert_eq!(outcome.sections[1].parent_id.as_deref(), Some("t-0"));
    }

    #[test]
    fn test_placeholder_marker_and_concept_dedup() {
        let set = OutlineSet {
            id: 0,
            label: "A".to_string(),
            business_unit: String::new(),
            sections: vec![MergeSection {
                title: "Final Assessment".to_string(),
                rationale: NO_SOURCE_DATA.to_string(),
                key_concepts: vec!["Quiz".to_string(), " Quiz ".to_string(), String::new()],
                level: 0,
                order: 0,
                kind: SectionKind::Assessment,
            }],
        };
        let targets = into_targets(vec![set]);
        assert!(targets[0].is_placeholder);
        assert_eq!(targets[0].key_concepts, vec!["Quiz"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_merge() {
        let courses = vec![
            course("A", "", &[("Intro", 0, &["Scope"])]),
            course("B", "", &[("Pumps", 0, &["Pump"])]),
        ];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = merger(Arc::new(ConcatMerger::default()), 14, 5)
            .merge(&courses, &cancel)
            .await;
        assert!(matches!(result, Err(e) if e.is_abort()));
    }

    proptest! {
        #[test]
        fn prop_merge_calls_respect_budget_and_are_deterministic(
            sizes in proptest::collection::vec((0usize..3, 1usize..8), 1..8),
            budget in 2usize..20
        ) {
            let names: Vec<Vec<String>> = sizes
                .iter()
                .enumerate()
                .map(|(i, (_, n))| (0..*n).map(|k| format!("c{}-{}", i, k)).collect())
                .collect();
            let courses: Vec<CourseOutline> = sizes
                .iter()
                .enumerate()
                .map(|(i, (bu, _))| {
                    let concepts: Vec<&str> = names[i].iter().map(String::as_str).collect();
                    course(&format!("course-{}", i), &format!("bu-{}", bu), &[("Section", 0, &concepts[..])])
                })
                .collect();

            let run = || {
                let inner = Arc::new(ConcatMerger::default());
                let outcome = tokio_test::block_on(merger(Arc::clone(&inner), budget, 10).merge(&courses, &CancellationToken::new()))
                    .unwrap();
                let calls = inner.calls.lock().unwrap().clone();
                (outcome, calls)
            };

            let (first, calls) = run();
            for (size, call_budget) in &calls {
                prop_assert!(size <= call_budget);
            }
            let (second, _) = run();
            prop_assert_eq!(first.sections, second.sections);
        }
    }
}
