//! JSON export of the graph store
//!
//! A snapshot lists courses with their slides in document order and the concept
//! annotations attached to those slides.

use crate::StoreError;
use lectern_domain::{ConceptAnnotation, SlideId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// One slide of a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSlide {
    /// Slide identifier
    pub slide_id: SlideId,

    /// Page in the source document, if known
    #[serde(default)]
    pub page: Option<u32>,
}

/// One course with its slides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCourse {
    /// Course identifier
    pub course_id: String,

    /// Course title
    pub title: String,

    /// Owning business unit
    #[serde(default)]
    pub business_unit: String,

    /// Slides in document order
    #[serde(default)]
    pub slides: Vec<SnapshotSlide>,
}

/// Full graph export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Courses in the export
    #[serde(default)]
    pub courses: Vec<SnapshotCourse>,

    /// Slide-level concept annotations
    #[serde(default)]
    pub annotations: Vec<ConceptAnnotation>,
}

impl GraphSnapshot {
    /// Parse a snapshot from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let snapshot: GraphSnapshot = serde_json::from_str(json)?;
        snapshot.check()?;
        Ok(snapshot)
    }

    /// Read and parse a snapshot file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Look up a course by id
    pub fn course(&self, course_id: &str) -> Option<&SnapshotCourse> {
        self.courses.iter().find(|c| c.course_id == course_id)
    }

    /// Reject duplicate ids and annotations on unknown slides
    fn check(&self) -> Result<(), StoreError> {
        let mut course_ids = BTreeSet::new();
        let mut slide_ids = BTreeSet::new();

        for course in &self.courses {
            if !course_ids.insert(course.course_id.as_str()) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate course id: {}",
                    course.course_id
                )));
            }
            for slide in &course.slides {
                if !slide_ids.insert(&slide.slide_id) {
                    return Err(StoreError::InvalidData(format!(
                        "duplicate slide id: {}",
                        slide.slide_id
                    )));
                }
            }
        }

        if let Some(orphan) = self
            .annotations
            .iter()
            .find(|a| !slide_ids.contains(&a.slide_id))
        {
            return Err(StoreError::InvalidData(format!(
                "annotation references unknown slide: {}",
                orphan.slide_id
            )));
        }

        Ok(())
    }
}
