//! Lectern Engine
//!
//! Consolidates several source courses into one curriculum outline, suggesting
//! source slides for every section.
//!
//! # Overview
//!
//! Every call to a language model or index has to fit a fixed context window. The
//! engine derives batch and chunk sizes from that window once per request and
//! splits every large input accordingly: long documents into overlapping windows,
//! large concept vocabularies into clustering batches, and the outline merge into a
//! pairwise bracket.
//!
//! # Architecture
//!
//! ```text
//! Courses → Outlines → Annotations → Aggregation → Harmonization → Merge → Assignment
//! ```
//!
//! - [`BudgetPlan`]: per-call-site capacities for a context size
//! - [`SlidingWindowOutlineExtractor`]: outline of a document too long for one call
//! - [`ConceptAggregator`]: slide annotations rolled up to sections and courses
//! - [`ConceptHarmonizer`]: two-pass synonym clustering into canonical concepts
//! - [`PairwiseOutlineMerger`]: budget-bounded merge into one target outline
//! - [`SlideAssignmentResolver`]: slide suggestions plus the unassigned bucket
//! - [`CurriculumGenerator`]: the whole pipeline for one request
//!
//! # Example Usage
//!
//! ```no_run
//! use lectern_engine::{
//!     CurriculumGenerator, EngineConfig, GenerationRequest, LlmConceptClusterer,
//!     LlmOutlineExtractor, LlmOutlineMerger,
//! };
//! use lectern_llm::MockProvider;
//! use lectern_store::{GraphSnapshot, SqliteGraphStore};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let llm = Arc::new(MockProvider::new("[]"));
//! let store = Arc::new(SqliteGraphStore::in_memory()?);
//! store.import_snapshot(&GraphSnapshot::load("graph.json")?)?;
//!
//! let generator = CurriculumGenerator::new(
//!     Arc::new(LlmOutlineExtractor::new(Arc::clone(&llm))),
//!     Arc::new(LlmConceptClusterer::new(Arc::clone(&llm))),
//!     Arc::new(LlmOutlineMerger::new(llm)),
//!     Arc::clone(&store),
//!     store,
//!     EngineConfig::default(),
//! );
//!
//! let request: GenerationRequest = serde_json::from_str(r#"{"courses": []}"#)?;
//! let outcome = generator.generate(&request, &CancellationToken::new()).await?;
//! println!("{}", outcome.summary.summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod aggregator;
pub mod budget;
pub mod chunking;
pub mod config;
pub mod error;
pub mod generator;
pub mod harmonizer;
mod invoke;
pub mod llm;
pub mod merger;
pub mod outline;
pub mod parser;
pub mod prompt;
pub mod report;
pub mod resolver;
pub mod types;

pub use aggregator::{ConceptAggregator, ConceptSummary};
pub use budget::{capacity, BudgetPlan, CallSite};
pub use chunking::{SlidingWindow, TextWindow};
pub use config::EngineConfig;
pub use error::{AbortReason, EngineError};
pub use generator::CurriculumGenerator;
pub use harmonizer::{ConceptHarmonizer, HarmonizationResult};
pub use llm::{LlmConceptClusterer, LlmOutlineExtractor, LlmOutlineMerger};
pub use merger::{MergeOutcome, PairwiseOutlineMerger};
pub use outline::{ExtractedOutline, SlidingWindowOutlineExtractor};
pub use parser::NO_SOURCE_DATA;
pub use prompt::PromptBuilder;
pub use report::{GenerationSummary, GenerationWarning, InvocationStats, Stage};
pub use resolver::{ResolvedOutline, SlideAssignmentResolver, REVIEW_SECTION_TITLE};
pub use types::{
    CourseOutline, CourseSource, GenerationOutcome, GenerationRequest, OutlineSource, SlideRef,
    SourceSection,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
