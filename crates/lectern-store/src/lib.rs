//! Lectern Storage Layer
//!
//! SQLite-backed read model of the course graph. It implements the engine's
//! `AnnotationSource` and `VectorSearch` capabilities so a generation can run
//! offline from a JSON export of the graph store.
//!
//! # Architecture
//!
//! - `GraphSnapshot`: JSON export of courses, slides and concept annotations
//! - `SqliteGraphStore`: SQLite tables loaded from a snapshot
//! - Similarity search scores slides by concept overlap with the query
//!
//! # Examples
//!
//! ```no_run
//! use lectern_store::{GraphSnapshot, SqliteGraphStore};
//!
//! let snapshot = GraphSnapshot::load("graph.json").unwrap();
//! let store = SqliteGraphStore::in_memory().unwrap();
//! store.import_snapshot(&snapshot).unwrap();
//! ```

#![warn(missing_docs)]

pub mod snapshot;

pub use snapshot::{GraphSnapshot, SnapshotCourse, SnapshotSlide};

use lectern_domain::traits::{AnnotationSource, VectorSearch};
use lectern_domain::{ConceptAnnotation, ScoredSlide, SlideId};
use rusqlite::{params, Connection};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Snapshot file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Course not found
    #[error("Course not found: {0}")]
    NotFound(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection lock was poisoned by a panicking thread
    #[error("Store lock poisoned")]
    Poisoned,
}

/// SQLite implementation of the graph read model
///
/// The connection sits behind a mutex so the store can be shared across the
/// blocking threads the engine dispatches capability calls on.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open (or create) a store at the given database path
    ///
    /// Use `:memory:` for an in-memory database.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an empty in-memory store
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Load every course, slide and annotation of a snapshot
    ///
    /// Rows already present are replaced, so importing the same snapshot twice is a
    /// no-op. Runs in one transaction.
    pub fn import_snapshot(&self, snapshot: &GraphSnapshot) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for course in &snapshot.courses {
            tx.execute(
                "INSERT OR REPLACE INTO courses (course_id, title, business_unit) VALUES (?1, ?2, ?3)",
                params![&course.course_id, &course.title, &course.business_unit],
            )?;
            for (position, slide) in course.slides.iter().enumerate() {
                tx.execute(
                    "INSERT OR REPLACE INTO slides (slide_id, course_id, position, page) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        slide.slide_id.as_str(),
                        &course.course_id,
                        position as i64,
                        slide.page.map(i64::from),
                    ],
                )?;
            }
        }

        for annotation in &snapshot.annotations {
            tx.execute(
                "INSERT OR REPLACE INTO concept_annotations (slide_id, term, salience) VALUES (?1, ?2, ?3)",
                params![annotation.slide_id.as_str(), &annotation.term, annotation.salience],
            )?;
        }

        tx.commit()?;
        info!(
            courses = snapshot.courses.len(),
            annotations = snapshot.annotations.len(),
            "Imported graph snapshot"
        );
        Ok(())
    }

    /// Slides of a course in document order
    pub fn course_slides(&self, course_id: &str) -> Result<Vec<SnapshotSlide>, StoreError> {
        let conn = self.conn()?;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM courses WHERE course_id = ?1",
            params![course_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(StoreError::NotFound(course_id.to_string()));
        }

        let mut stmt = conn.prepare(
            "SELECT slide_id, page FROM slides WHERE course_id = ?1 ORDER BY position",
        )?;
        let slides = stmt
            .query_map(params![course_id], |row| {
                let slide_id: String = row.get(0)?;
                let page: Option<i64> = row.get(1)?;
                Ok(SnapshotSlide {
                    slide_id: SlideId::new(slide_id),
                    page: page.and_then(|p| u32::try_from(p).ok()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(slides)
    }

    /// Number of slides stored
    pub fn slide_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM slides", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn annotations_for(
        conn: &Connection,
        slide_id: &SlideId,
    ) -> Result<Vec<ConceptAnnotation>, StoreError> {
        let mut stmt = conn.prepare_cached(
            "SELECT term, salience FROM concept_annotations WHERE slide_id = ?1 ORDER BY term",
        )?;
        let annotations = stmt
            .query_map(params![slide_id.as_str()], |row| {
                Ok(ConceptAnnotation::new(
                    slide_id.clone(),
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(annotations)
    }
}

impl AnnotationSource for SqliteGraphStore {
    type Error = StoreError;

    fn get_concept_annotations(
        &self,
        slide_id: &SlideId,
    ) -> Result<Vec<ConceptAnnotation>, Self::Error> {
        let conn = self.conn()?;
        Self::annotations_for(&conn, slide_id)
    }
}

impl VectorSearch for SqliteGraphStore {
    type Error = StoreError;

    /// Concept-overlap similarity
    ///
    /// A slide scores the share of its total annotation salience carried by terms
    /// that match a query concept (case-insensitive). Adding synonyms to a query
    /// never lowers a score. Slides with no overlap are not returned.
    fn vector_search(
        &self,
        query_concepts: &[String],
        filter_ids: &BTreeSet<SlideId>,
        top_n: usize,
    ) -> Result<Vec<ScoredSlide>, Self::Error> {
        let query: BTreeSet<String> = query_concepts
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if query.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut scores: HashMap<&SlideId, f64> = HashMap::new();
        for slide_id in filter_ids {
            let annotations = Self::annotations_for(&conn, slide_id)?;
            let total: f64 = annotations.iter().map(|a| a.salience).sum();
            let overlap: f64 = annotations
                .iter()
                .filter(|a| query.contains(&a.term.trim().to_lowercase()))
                .map(|a| a.salience)
                .sum();
            if overlap > 0.0 && total > 0.0 {
                scores.insert(slide_id, (overlap / total).min(1.0));
            }
        }

        let mut results: Vec<ScoredSlide> = scores
            .into_iter()
            .map(|(id, score)| ScoredSlide::new(id.clone(), score))
            .collect();
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.slide_id.cmp(&b.slide_id))
        });
        results.truncate(top_n);

        debug!(
            query = query.len(),
            candidates = filter_ids.len(),
            hits = results.len(),
            "Concept overlap search"
        );
        Ok(results)
    }
}
