//! Request and result types

use crate::error::EngineError;
use crate::report::GenerationSummary;
use lectern_domain::{
    CanonicalConcept, SectionOutlineNode, SlideAssignment, SlideId, TargetSection,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A slide of a source course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRef {
    /// Slide identifier
    pub slide_id: SlideId,

    /// Page in the source document, used to place the slide under a section
    #[serde(default)]
    pub page: Option<u32>,
}

impl SlideRef {
    /// Create a new slide reference
    pub fn new(slide_id: impl Into<SlideId>, page: Option<u32>) -> Self {
        Self {
            slide_id: slide_id.into(),
            page,
        }
    }
}

/// A section of an already-known course outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSection {
    /// Section title
    pub title: String,

    /// Nesting level (0 = top level)
    #[serde(default)]
    pub level: u32,

    /// Page on which the section starts
    #[serde(default)]
    pub start_page: Option<u32>,

    /// Slides explicitly placed under this section
    #[serde(default)]
    pub slide_ids: Vec<SlideId>,
}

/// Where a course's outline comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutlineSource {
    /// Outline already stored in the graph
    Sections {
        /// Sections in document order
        sections: Vec<SourceSection>,
    },

    /// Full document text to extract the outline from
    Document {
        /// Document text
        text: String,
    },
}

impl Default for OutlineSource {
    fn default() -> Self {
        OutlineSource::Sections {
            sections: Vec::new(),
        }
    }
}

/// One selected source course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSource {
    /// Course identifier
    pub course_id: String,

    /// Course title
    pub title: String,

    /// Owning business unit
    #[serde(default)]
    pub business_unit: String,

    /// Selected slides, in document order
    #[serde(default)]
    pub slides: Vec<SlideRef>,

    /// Outline source
    #[serde(default)]
    pub outline: OutlineSource,
}

/// One generation request: the courses to consolidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Selected courses
    pub courses: Vec<CourseSource>,
}

impl GenerationRequest {
    /// Create a request over `courses`
    pub fn new(courses: Vec<CourseSource>) -> Self {
        Self { courses }
    }

    /// Check the request before any work starts
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.courses.is_empty() {
            return Err(EngineError::InvalidRequest(
                "no courses selected".to_string(),
            ));
        }

        let mut ids = BTreeSet::new();
        for course in &self.courses {
            if !ids.insert(course.course_id.as_str()) {
                return Err(EngineError::InvalidRequest(format!(
                    "course {} selected twice",
                    course.course_id
                )));
            }
        }

        if self.courses.iter().all(|c| c.slides.is_empty()) {
            return Err(EngineError::InvalidRequest(
                "selected courses have no slides".to_string(),
            ));
        }
        Ok(())
    }

    /// Every selected slide, first occurrence order, without duplicates
    pub fn selected_slides(&self) -> Vec<SlideId> {
        let mut seen = BTreeSet::new();
        self.courses
            .iter()
            .flat_map(|c| c.slides.iter())
            .filter(|s| seen.insert(s.slide_id.clone()))
            .map(|s| s.slide_id.clone())
            .collect()
    }
}

/// A course's outline as the merger consumes it
#[derive(Debug, Clone, PartialEq)]
pub struct CourseOutline {
    /// Course identifier
    pub course_id: String,

    /// Course title
    pub title: String,

    /// Owning business unit
    pub business_unit: String,

    /// Sections in document order, concepts filled by aggregation
    pub nodes: Vec<SectionOutlineNode>,

    /// Slides not under any section
    pub loose_slides: Vec<SlideId>,
}

impl CourseOutline {
    /// Label used when the course's outline stands on its own in the output
    pub fn origin_label(&self) -> String {
        if self.business_unit.is_empty() {
            self.title.clone()
        } else {
            format!("{} ({})", self.title, self.business_unit)
        }
    }
}

/// Result of a completed generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    /// Target outline in order, review section last when present
    pub sections: Vec<TargetSection>,

    /// Slides per section plus the unassigned bucket
    pub assignment: SlideAssignment,

    /// Canonical concept vocabulary
    pub concepts: Vec<CanonicalConcept>,

    /// Run report
    pub summary: GenerationSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: &str, slides: &[&str]) -> CourseSource {
        CourseSource {
            course_id: id.to_string(),
            title: id.to_string(),
            business_unit: String::new(),
            slides: slides.iter().map(|s| SlideRef::new(*s, None)).collect(),
            outline: OutlineSource::default(),
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(GenerationRequest::default().validate().is_err());
        assert!(GenerationRequest::new(vec![course("a", &[])]).validate().is_err());
        assert!(GenerationRequest::new(vec![course("a", &["s1"]), course("a", &["s2"])])
            .validate()
            .is_err());
        assert!(GenerationRequest::new(vec![course("a", &["s1"]), course("b", &[])])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_selected_slides_dedup_in_order() {
        let request = GenerationRequest::new(vec![
            course("a", &["s2", "s1"]),
            course("b", &["s1", "s3"]),
        ]);
        let ids: Vec<String> = request
            .selected_slides()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(ids, vec!["s2", "s1", "s3"]);
    }

    #[test]
    fn test_outline_source_json() {
        let json = r#"{"course_id": "c1", "title": "Hydraulics",
                       "outline": {"type": "document", "text": "1 Intro"}}"#;
        let course: CourseSource = serde_json::from_str(json).unwrap();
        assert!(matches!(course.outline, OutlineSource::Document { .. }));

        let json = r#"{"course_id": "c2", "title": "Motors"}"#;
        let course: CourseSource = serde_json::from_str(json).unwrap();
        assert_eq!(course.outline, OutlineSource::default());
    }
}
