//! Roll slide-level concept annotations up to sections and courses

use lectern_domain::{ConceptAnnotation, SectionOutlineNode, SlideId, WeightedConcept};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Ranked concept weights of a section, course or slide set
///
/// Ordered by weight descending, ties broken by term.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptSummary {
    concepts: Vec<WeightedConcept>,
}

impl ConceptSummary {
    fn from_weights(weights: BTreeMap<String, f64>) -> Self {
        let mut concepts: Vec<WeightedConcept> = weights
            .into_iter()
            .map(|(term, weight)| WeightedConcept::new(term, weight))
            .collect();
        // BTreeMap iteration already orders ties by term; the sort is stable
        concepts.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        Self { concepts }
    }

    /// Summary built from already-weighted concepts, re-ranked
    pub fn from_concepts(concepts: &[WeightedConcept]) -> Self {
        let mut weights = BTreeMap::new();
        for concept in concepts {
            *weights.entry(concept.term.clone()).or_insert(0.0) += concept.weight;
        }
        Self::from_weights(weights)
    }

    /// Ranked concepts
    pub fn concepts(&self) -> &[WeightedConcept] {
        &self.concepts
    }

    /// Consume into the ranked concepts
    pub fn into_concepts(self) -> Vec<WeightedConcept> {
        self.concepts
    }

    /// Top `limit` terms in rank order
    pub fn top_terms(&self, limit: usize) -> Vec<String> {
        self.concepts
            .iter()
            .take(limit)
            .map(|c| c.term.clone())
            .collect()
    }

    /// Weight of one term, 0 when absent
    pub fn weight_of(&self, term: &str) -> f64 {
        self.concepts
            .iter()
            .find(|c| c.term == term)
            .map(|c| c.weight)
            .unwrap_or(0.0)
    }

    /// Number of distinct terms
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// Whether no concept was found
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Re-key terms to their canonical names
    ///
    /// Weights of terms mapping to the same canonical name are summed. Terms missing
    /// from `mapping` keep their own name.
    pub fn canonicalize(&self, mapping: &HashMap<String, String>) -> ConceptSummary {
        let mut weights = BTreeMap::new();
        for concept in &self.concepts {
            let name = mapping
                .get(&concept.term)
                .cloned()
                .unwrap_or_else(|| concept.term.clone());
            *weights.entry(name).or_insert(0.0) += concept.weight;
        }
        Self::from_weights(weights)
    }
}

/// Aggregates concept annotations over sets of slides
///
/// Holds one weight per (slide, term). Deterministic and free of capability calls.
#[derive(Debug, Clone, Default)]
pub struct ConceptAggregator {
    slides: HashMap<SlideId, BTreeMap<String, f64>>,
}

impl ConceptAggregator {
    /// Index annotations by slide
    ///
    /// Blank terms and saliences outside [0, 1] are skipped. A term annotated twice
    /// on the same slide keeps its highest salience.
    pub fn new(annotations: impl IntoIterator<Item = ConceptAnnotation>) -> Self {
        let mut slides: HashMap<SlideId, BTreeMap<String, f64>> = HashMap::new();
        let mut skipped = 0;

        for annotation in annotations {
            if let Err(e) = annotation.validate() {
                warn!(slide = %annotation.slide_id, "Skipping annotation: {}", e);
                skipped += 1;
                continue;
            }
            let term = annotation.term.trim().to_string();
            let entry = slides
                .entry(annotation.slide_id)
                .or_default()
                .entry(term)
                .or_insert(annotation.salience);
            if annotation.salience > *entry {
                *entry = annotation.salience;
            }
        }

        debug!(slides = slides.len(), skipped, "Indexed concept annotations");
        Self { slides }
    }

    /// Terms annotated on one slide with their salience
    pub fn slide_terms(&self, slide_id: &SlideId) -> Option<&BTreeMap<String, f64>> {
        self.slides.get(slide_id)
    }

    /// Salience-weighted term frequency over a set of slides, each counted once
    pub fn aggregate_slides<'a, I>(&self, slide_ids: I) -> ConceptSummary
    where
        I: IntoIterator<Item = &'a SlideId>,
    {
        let unique: BTreeSet<&SlideId> = slide_ids.into_iter().collect();
        let mut weights: BTreeMap<String, f64> = BTreeMap::new();
        for slide_id in unique {
            if let Some(terms) = self.slides.get(slide_id) {
                for (term, salience) in terms {
                    *weights.entry(term.clone()).or_insert(0.0) += salience;
                }
            }
        }
        ConceptSummary::from_weights(weights)
    }

    /// Summary of one section: its slides plus every descendant's slides
    ///
    /// A slide listed under both the section and a descendant counts once.
    pub fn aggregate_section(
        &self,
        nodes: &[SectionOutlineNode],
        section_id: &str,
    ) -> ConceptSummary {
        let slides = subtree_slides(nodes, section_id);
        self.aggregate_slides(slides)
    }

    /// Fill `concepts` of every node with its section summary
    pub fn summarize_outline(&self, nodes: &mut [SectionOutlineNode]) {
        let view: &[SectionOutlineNode] = nodes;
        let summaries: Vec<Vec<WeightedConcept>> = view
            .iter()
            .map(|node| self.aggregate_section(view, &node.id).into_concepts())
            .collect();
        for (node, concepts) in nodes.iter_mut().zip(summaries) {
            node.concepts = concepts;
        }
    }

    /// Summary of a whole course: every section plus slides outside any section
    pub fn summarize_course(
        &self,
        nodes: &[SectionOutlineNode],
        loose_slides: &[SlideId],
    ) -> ConceptSummary {
        let slides = nodes
            .iter()
            .flat_map(|n| n.slide_ids.iter())
            .chain(loose_slides.iter());
        self.aggregate_slides(slides)
    }
}

/// Slides of a section and all of its descendants
fn subtree_slides<'a>(nodes: &'a [SectionOutlineNode], section_id: &str) -> BTreeSet<&'a SlideId> {
    let mut children: HashMap<&str, Vec<&SectionOutlineNode>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent_id.as_deref() {
            children.entry(parent).or_default().push(node);
        }
    }

    let mut slides = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut stack: Vec<&SectionOutlineNode> = nodes.iter().filter(|n| n.id == section_id).collect();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.id.as_str()) {
            continue;
        }
        slides.extend(node.slide_ids.iter());
        if let Some(kids) = children.get(node.id.as_str()) {
            stack.extend(kids.iter().copied());
        }
    }

    slides
}
