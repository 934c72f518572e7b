//! Warnings, call statistics and the run summary

use lectern_domain::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage that issues capability calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Sliding-window outline extraction
    OutlineExtraction,
    /// Slide annotation reads
    AnnotationFetch,
    /// Concept clustering (both harmonization passes)
    ConceptClustering,
    /// Pairwise outline merge
    OutlineMerge,
    /// Similarity search for slide assignment
    SlideSearch,
}

impl Stage {
    /// Get the stage name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::OutlineExtraction => "outline extraction",
            Stage::AnnotationFetch => "annotation fetch",
            Stage::ConceptClustering => "concept clustering",
            Stage::OutlineMerge => "outline merge",
            Stage::SlideSearch => "slide search",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recoverable problem surfaced alongside a completed outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationWarning {
    /// One unit of work (window, batch, merge, fetch, search) was skipped
    PartialExtraction {
        /// Stage the unit belongs to
        stage: Stage,
        /// Which unit failed, e.g. "course c1 window 2"
        unit: String,
        /// Failure description
        reason: String,
    },

    /// Cross-batch harmonization hit its round cap still shrinking
    NonConvergence {
        /// Rounds executed
        rounds: u32,
        /// Canonical concepts left after the last round
        remaining: usize,
    },
}

impl GenerationWarning {
    /// Build a partial-extraction warning
    pub fn partial(stage: Stage, unit: impl Into<String>, reason: impl fmt::Display) -> Self {
        GenerationWarning::PartialExtraction {
            stage,
            unit: unit.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for GenerationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationWarning::PartialExtraction {
                stage,
                unit,
                reason,
            } => write!(f, "{} skipped {}: {}", stage, unit, reason),
            GenerationWarning::NonConvergence { rounds, remaining } => write!(
                f,
                "concept harmonization did not converge after {} rounds ({} concepts)",
                rounds, remaining
            ),
        }
    }
}

/// Attempted / failed capability calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationStats {
    /// Calls dispatched
    pub attempted: usize,
    /// Calls that errored, timed out or returned malformed output
    pub failed: usize,
}

impl InvocationStats {
    /// Record one call outcome
    pub fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if !ok {
            self.failed += 1;
        }
    }

    /// Add another set of counts
    pub fn absorb(&mut self, other: InvocationStats) {
        self.attempted += other.attempted;
        self.failed += other.failed;
    }

    /// Whether calls were made and none succeeded
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failed == self.attempted
    }

    /// Share of failed calls (0 when nothing was attempted)
    pub fn failure_ratio(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.failed as f64 / self.attempted as f64
        }
    }
}

/// Outcome report of one generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    /// Time-ordered run id
    pub run_id: String,

    /// Courses in the request
    pub courses: usize,

    /// Target sections produced, review section included
    pub sections_produced: usize,

    /// Sections with no source material
    pub placeholder_sections: usize,

    /// Distinct slides selected
    pub slides_selected: usize,

    /// Slides suggested for at least one section
    pub slides_assigned: usize,

    /// Slides left in the unassigned bucket
    pub slides_unassigned: usize,

    /// Distinct raw concept terms harmonized
    pub raw_concepts: usize,

    /// Canonical concepts after harmonization
    pub canonical_concepts: usize,

    /// Cross-batch harmonization rounds
    pub harmonization_rounds: u32,

    /// Whether harmonization stabilized
    pub harmonization_converged: bool,

    /// Merge calls issued
    pub merge_calls: usize,

    /// Distinct outline pairs deferred for exceeding the merge budget
    pub deferred_pairs: usize,

    /// Outline sets left unmerged at the end
    pub unmerged_sets: usize,

    /// Capability calls across all stages
    pub invocations: InvocationStats,

    /// Recoverable problems
    pub warnings: Vec<GenerationWarning>,
}

impl GenerationSummary {
    /// Empty summary for a new run
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id: run_id.to_string(),
            courses: 0,
            sections_produced: 0,
            placeholder_sections: 0,
            slides_selected: 0,
            slides_assigned: 0,
            slides_unassigned: 0,
            raw_concepts: 0,
            canonical_concepts: 0,
            harmonization_rounds: 0,
            harmonization_converged: true,
            merge_calls: 0,
            deferred_pairs: 0,
            unmerged_sets: 0,
            invocations: InvocationStats::default(),
            warnings: Vec::new(),
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Generation Summary".to_string(),
            "==================".to_string(),
            format!("Run: {}", self.run_id),
            format!("Courses: {}", self.courses),
            format!(
                "Sections: {} ({} placeholders)",
                self.sections_produced, self.placeholder_sections
            ),
            format!(
                "Slides: {} selected, {} assigned, {} unassigned",
                self.slides_selected, self.slides_assigned, self.slides_unassigned
            ),
            format!(
                "Concepts: {} raw -> {} canonical",
                self.raw_concepts, self.canonical_concepts
            ),
            format!(
                "Harmonization: {} rounds, {}",
                self.harmonization_rounds,
                if self.harmonization_converged {
                    "converged"
                } else {
                    "not converged"
                }
            ),
            format!(
                "Merges: {} calls, {} deferred pairs, {} unmerged sets",
                self.merge_calls, self.deferred_pairs, self.unmerged_sets
            ),
            format!(
                "Calls: {} attempted, {} failed",
                self.invocations.attempted, self.invocations.failed
            ),
        ];

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            for warning in &self.warnings {
                lines.push(format!("  - {}", warning));
            }
        }

        lines.join("\n")
    }
}
