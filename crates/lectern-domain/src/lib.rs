//! Lectern Domain Layer
//!
//! Core data model and capability traits for the curriculum consolidation engine.
//! It performs no I/O and defines the fundamental concepts, value objects, and trait
//! interfaces that every other layer depends upon.
//!
//! ## Key Concepts
//!
//! - **Concept annotation**: a (term, salience) pair attached to one slide
//! - **Section outline node**: a section of a source course with its aggregated concepts
//! - **Canonical concept**: a normalized name for a group of synonymous terms
//! - **Target section**: a node of the consolidated curriculum outline
//! - **Slide assignment**: which selected slides feed which target section
//!
//! ## Architecture
//!
//! - Pure data and business rules only
//! - External collaborators (LLM, vector index, graph store) are reached through the
//!   traits in [`traits`]; implementations live in other crates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod annotation;
pub mod concept;
pub mod ids;
pub mod outline;
pub mod target;
pub mod traits;

// Re-exports for convenience
pub use annotation::ConceptAnnotation;
pub use concept::{CanonicalConcept, ConceptCluster};
pub use ids::{RunId, SlideId};
pub use outline::{OutlineEntry, SectionOutlineNode, WeightedConcept};
pub use target::{
    MergeSection, ScoredSlide, SectionAssignment, SectionKind, SlideAssignment, TargetSection,
};
