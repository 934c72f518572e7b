//! Canonical concepts produced by harmonization

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One cluster as proposed by the clustering capability for a single batch
///
/// Proposals are untrusted: they may name terms outside the batch, repeat terms
/// across clusters, or omit terms. The harmonizer reconciles them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptCluster {
    /// Proposed canonical name
    pub canonical_name: String,

    /// Terms proposed as synonyms of the canonical name
    #[serde(default)]
    pub member_terms: Vec<String>,
}

impl ConceptCluster {
    /// Create a new cluster proposal
    pub fn new<I, S>(canonical_name: impl Into<String>, member_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            canonical_name: canonical_name.into(),
            member_terms: member_terms.into_iter().map(Into::into).collect(),
        }
    }
}

/// A normalized concept name and the raw terms it stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalConcept {
    /// Normalized name
    pub canonical_name: String,

    /// Original terms mapped to this concept
    pub member_terms: BTreeSet<String>,
}

impl CanonicalConcept {
    /// Create a canonical concept with no members yet
    pub fn new(canonical_name: impl Into<String>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            member_terms: BTreeSet::new(),
        }
    }

    /// Whether the concept groups more than one raw term
    pub fn is_merged(&self) -> bool {
        self.member_terms.len() > 1
    }
}
