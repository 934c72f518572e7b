//! Target outline and slide assignment

use crate::SlideId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role of a target section in the standard course template
///
/// The template orders an introduction, a mandatory safety module, the technical
/// modules, and an assessment. `Grouping` wraps an outline set that could not be
/// merged and `Review` is the reserved unassigned-material section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Overview, purpose, scope, prerequisites
    Introduction,
    /// Safety, hazards, compliance
    Safety,
    /// Core teaching content
    #[default]
    Technical,
    /// Knowledge checks and final review
    Assessment,
    /// Container for an outline set that was not merged
    Grouping,
    /// Reserved parking-lot section for unassigned slides
    Review,
}

impl SectionKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Introduction => "introduction",
            SectionKind::Safety => "safety",
            SectionKind::Technical => "technical",
            SectionKind::Assessment => "assessment",
            SectionKind::Grouping => "grouping",
            SectionKind::Review => "review",
        }
    }

    /// Parse a kind leniently, accepting the labels language models tend to emit
    ///
    /// Never yields `Grouping` or `Review`; only the engine creates those. A
    /// "review" label is a knowledge check and parses as `Assessment`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "introduction" | "overview" | "intro" => Some(SectionKind::Introduction),
            "safety" | "mandatory_safety" | "safety_module" => Some(SectionKind::Safety),
            "technical" | "technical_module" => Some(SectionKind::Technical),
            "assessment" | "mandatory_assessment" | "review" | "quiz" | "knowledge_check" => {
                Some(SectionKind::Assessment)
            }
            _ => None,
        }
    }

    /// Whether only the engine may assign this kind
    pub fn is_reserved(&self) -> bool {
        matches!(self, SectionKind::Grouping | SectionKind::Review)
    }

    /// The kind a merged section may carry: reserved kinds become ordinary ones
    pub fn unreserved(self) -> Self {
        match self {
            SectionKind::Review => SectionKind::Assessment,
            SectionKind::Grouping => SectionKind::Technical,
            kind => kind,
        }
    }
}

/// A section as exchanged with the outline-merge capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSection {
    /// Section title
    pub title: String,

    /// Why the section exists / how it was merged
    #[serde(default)]
    pub rationale: String,

    /// Concepts the section teaches
    #[serde(default)]
    pub key_concepts: Vec<String>,

    /// Nesting level (0 = top level)
    #[serde(default)]
    pub level: u32,

    /// Position within its outline
    #[serde(default)]
    pub order: u32,

    /// Template role
    #[serde(default)]
    pub kind: SectionKind,
}

impl MergeSection {
    /// Number of concepts this section contributes to a merge budget
    pub fn concept_count(&self) -> usize {
        self.key_concepts.len()
    }
}

/// A node of the consolidated curriculum outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSection {
    /// Unique id within the generated outline
    pub id: String,

    /// Section title
    pub title: String,

    /// Explanation of the merge decision
    pub rationale: String,

    /// Concepts the section teaches, insertion ordered and unique
    pub key_concepts: Vec<String>,

    /// Nesting depth
    pub level: u32,

    /// Final linear position in the outline
    pub order: u32,

    /// Parent section
    pub parent_id: Option<String>,

    /// Template role
    pub kind: SectionKind,

    /// Set when neither the section nor any descendant has source material
    #[serde(default)]
    pub is_placeholder: bool,

    /// Slides suggested as source material, best match first
    #[serde(default)]
    pub suggested_source_ids: Vec<SlideId>,
}

impl TargetSection {
    /// Whether this is the reserved unassigned-material section
    pub fn is_review(&self) -> bool {
        self.kind == SectionKind::Review
    }
}

/// One result of a similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSlide {
    /// Matched slide
    pub slide_id: SlideId,

    /// Similarity score, higher is better
    pub score: f64,
}

impl ScoredSlide {
    /// Create a new scored slide
    pub fn new(slide_id: impl Into<SlideId>, score: f64) -> Self {
        Self {
            slide_id: slide_id.into(),
            score,
        }
    }
}

/// Slides assigned to one target section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionAssignment {
    /// Target section id
    pub section_id: String,

    /// Assigned slides, best match first
    pub slide_ids: Vec<SlideId>,
}

/// Mapping of target sections to slides plus the reserved unassigned bucket
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlideAssignment {
    /// Per-section buckets in outline order
    pub buckets: Vec<SectionAssignment>,

    /// Selected slides not matched to any section, in selection order
    pub unassigned: Vec<SlideId>,
}

impl SlideAssignment {
    /// Union of all slides assigned to at least one section
    pub fn assigned_slides(&self) -> BTreeSet<SlideId> {
        self.buckets
            .iter()
            .flat_map(|b| b.slide_ids.iter().cloned())
            .collect()
    }

    /// Every slide that appears in any bucket, including the unassigned one
    pub fn covered_slides(&self) -> BTreeSet<SlideId> {
        let mut covered = self.assigned_slides();
        covered.extend(self.unassigned.iter().cloned());
        covered
    }

    /// Slides for a given section, if the section has a bucket
    pub fn bucket(&self, section_id: &str) -> Option<&[SlideId]> {
        self.buckets
            .iter()
            .find(|b| b.section_id == section_id)
            .map(|b| b.slide_ids.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_accepts_template_labels() {
        assert_eq!(SectionKind::parse("overview"), Some(SectionKind::Introduction));
        assert_eq!(SectionKind::parse("mandatory_safety"), Some(SectionKind::Safety));
        assert_eq!(SectionKind::parse("Assessment"), Some(SectionKind::Assessment));
        assert_eq!(SectionKind::parse("appendix"), None);
    }

    #[test]
    fn test_kind_round_trips_through_as_str() {
        for kind in [
            SectionKind::Introduction,
            SectionKind::Safety,
            SectionKind::Technical,
            SectionKind::Assessment,
        ] {
            assert_eq!(SectionKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_reserved_kinds_are_never_parsed() {
        assert_eq!(SectionKind::parse("review"), Some(SectionKind::Assessment));
        assert_eq!(SectionKind::parse("Review"), Some(SectionKind::Assessment));
        assert_eq!(SectionKind::parse("grouping"), None);
        assert!(SectionKind::Review.is_reserved());
        assert_eq!(SectionKind::Review.unreserved(), SectionKind::Assessment);
        assert_eq!(SectionKind::Grouping.unreserved(), SectionKind::Technical);
        assert_eq!(SectionKind::Safety.unreserved(), SectionKind::Safety);
    }

    #[test]
    fn test_merge_section_defaults() {
        let section: MergeSection = serde_json::from_str(r#"{"title": "Motors"}"#).unwrap();
        assert_eq!(section.kind, SectionKind::Technical);
        assert_eq!(section.concept_count(), 0);
    }

    #[test]
    fn test_assignment_sets() {
        let assignment = SlideAssignment {
            buckets: vec![
                SectionAssignment {
                    section_id: "t-0".to_string(),
                    slide_ids: vec!["s1".into(), "s2".into()],
                },
                SectionAssignment {
                    section_id: "t-1".to_string(),
                    slide_ids: vec!["s2".into()],
                },
            ],
            unassigned: vec!["s3".into()],
        };

        assert_eq!(assignment.assigned_slides().len(), 2);
        assert_eq!(assignment.covered_slides().len(), 3);
        assert_eq!(assignment.bucket("t-1").unwrap().len(), 1);
        assert!(assignment.bucket("t-9").is_none());
    }
}
