//! Two-pass concept harmonization
//!
//! Pass 1 clusters the raw terms in budget-sized batches. Pass 2 re-clusters the
//! canonical names across batches until their number stops shrinking.

use crate::budget::BudgetPlan;
use crate::config::EngineConfig;
use crate::error::{AbortReason, EngineError};
use crate::invoke::{call_blocking, dispatch_all};
use crate::report::{GenerationWarning, InvocationStats, Stage};
use lectern_domain::traits::ConceptClusterer;
use lectern_domain::{CanonicalConcept, ConceptCluster};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Canonical vocabulary for a set of raw terms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonizationResult {
    /// Canonical concepts in first-seen order
    pub concepts: Vec<CanonicalConcept>,
    /// Every raw term to its canonical name
    pub mapping: HashMap<String, String>,
    /// Batches in pass 1
    pub pass1_batches: usize,
    /// Cross-batch rounds in pass 2
    pub rounds: u32,
    /// Whether pass 2 stabilized (or was not needed)
    pub converged: bool,
    /// Failed batches and non-convergence
    pub warnings: Vec<GenerationWarning>,
    /// Clustering calls
    pub stats: InvocationStats,
}

impl HarmonizationResult {
    /// Canonical name of a raw term
    pub fn canonical_for(&self, term: &str) -> Option<&str> {
        self.mapping.get(term).map(String::as_str)
    }

    /// Canonical name to its member terms, for query expansion
    pub fn synonyms(&self) -> HashMap<String, Vec<String>> {
        self.concepts
            .iter()
            .map(|c| {
                (
                    c.canonical_name.clone(),
                    c.member_terms.iter().cloned().collect(),
                )
            })
            .collect()
    }
}

/// Groups of raw terms under a name, in first-seen order
#[derive(Debug, Clone, Default)]
struct Groups {
    names: Vec<String>,
    members: HashMap<String, BTreeSet<String>>,
}

impl Groups {
    fn add(&mut self, name: String, members: impl IntoIterator<Item = String>) {
        if !self.members.contains_key(&name) {
            self.names.push(name.clone());
        }
        self.members.entry(name).or_default().extend(members);
    }

    fn len(&self) -> usize {
        self.names.len()
    }

    fn into_result(self) -> (Vec<CanonicalConcept>, HashMap<String, String>) {
        let mut members = self.members;
        let mut mapping = HashMap::new();
        let concepts = self
            .names
            .into_iter()
            .map(|name| {
                let member_terms = members.remove(&name).unwrap_or_default();
                for term in &member_terms {
                    mapping.insert(term.clone(), name.clone());
                }
                CanonicalConcept {
                    canonical_name: name,
                    member_terms,
                }
            })
            .collect();
        (concepts, mapping)
    }
}

/// Make one batch's proposals a partition of the batch
///
/// Terms outside the batch are ignored, a term claimed twice stays with the first
/// cluster, unclaimed terms become singletons, an empty name falls back to the first
/// member, and clusters sharing a name are combined.
pub fn reconcile_batch(batch: &[String], proposals: Vec<ConceptCluster>) -> Vec<(String, Vec<String>)> {
    let in_batch: HashSet<&str> = batch.iter().map(String::as_str).collect();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut order: Vec<String> = Vec::new();
    let mut clusters: HashMap<String, Vec<String>> = HashMap::new();

    let mut push = |name: String, members: Vec<String>| {
        if !clusters.contains_key(&name) {
            order.push(name.clone());
        }
        clusters.entry(name).or_default().extend(members);
    };

    for proposal in proposals {
        let members: Vec<String> = proposal
            .member_terms
            .into_iter()
            .filter(|t| in_batch.contains(t.as_str()) && claimed.insert(t.clone()))
            .collect();
        if members.is_empty() {
            continue;
        }
        let name = match proposal.canonical_name.trim() {
            "" => members[0].clone(),
            name => name.to_string(),
        };
        push(name, members);
    }

    for term in batch {
        if claimed.insert(term.clone()) {
            push(term.clone(), vec![term.clone()]);
        }
    }

    order
        .into_iter()
        .map(|name| {
            let members = clusters.remove(&name).unwrap_or_default();
            (name, members)
        })
        .collect()
}

fn identity(batch: &[String]) -> Vec<(String, Vec<String>)> {
    batch.iter().map(|t| (t.clone(), vec![t.clone()])).collect()
}

/// Two-pass synonym clustering under the context budget
pub struct ConceptHarmonizer<C> {
    clusterer: Arc<C>,
    batch_size: usize,
    max_rounds: u32,
    call_timeout: Duration,
    max_concurrent: usize,
}

impl<C> ConceptHarmonizer<C>
where
    C: ConceptClusterer + Send + Sync + 'static,
{
    /// Create a harmonizer sized by `plan`
    pub fn new(clusterer: Arc<C>, plan: &BudgetPlan, config: &EngineConfig) -> Self {
        Self {
            clusterer,
            batch_size: plan.concept_batch_size.max(1),
            max_rounds: config.max_harmonization_rounds,
            call_timeout: config.call_timeout(),
            max_concurrent: config.max_concurrent_calls,
        }
    }

    /// Partition `terms` into canonical concepts
    ///
    /// Duplicate and blank terms are dropped first. Failed batches keep their terms
    /// as singletons and add a warning.
    #[instrument(skip_all, fields(terms = terms.len()))]
    pub async fn harmonize(
        &self,
        terms: &[String],
        cancel: &CancellationToken,
    ) -> Result<HarmonizationResult, EngineError> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty() && seen.insert(*t))
            .map(str::to_string)
            .collect();

        let mut result = HarmonizationResult {
            converged: true,
            ..HarmonizationResult::default()
        };
        if unique.is_empty() {
            return Ok(result);
        }

        // Pass 1: concurrent batches over the raw terms
        let batches: Vec<Vec<String>> = unique
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        result.pass1_batches = batches.len();
        info!(unique = unique.len(), batches = batches.len(), "Harmonization pass 1");

        let clustered = dispatch_all(batches, self.max_concurrent, cancel, |batch| {
            self.cluster_batch(batch)
        })
        .await?;

        let mut groups = Groups::default();
        for (index, (batch, outcome)) in clustered.into_iter().enumerate() {
            let local = self.absorb_outcome(&batch, outcome, &mut result, format!("pass 1 batch {}", index));
            for (name, members) in local {
                groups.add(name, members);
            }
        }

        if result.stats.all_failed() {
            return Err(EngineError::Aborted(AbortReason::StageFailed {
                stage: Stage::ConceptClustering,
                attempted: result.stats.attempted,
            }));
        }

        // Pass 2: sequential rounds over the canonical names
        if result.pass1_batches > 1 {
            self.consolidate(&mut groups, &mut result, cancel).await?;
        }

        let (concepts, mapping) = groups.into_result();
        info!(
            canonical = concepts.len(),
            rounds = result.rounds,
            converged = result.converged,
            "Harmonization complete"
        );
        result.concepts = concepts;
        result.mapping = mapping;
        Ok(result)
    }

    async fn consolidate(
        &self,
        groups: &mut Groups,
        result: &mut HarmonizationResult,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut stabilized = false;

        while result.rounds < self.max_rounds {
            if groups.len() <= 1 {
                stabilized = true;
                break;
            }
            result.rounds += 1;
            let before = groups.len();
            debug!(round = result.rounds, names = before, "Harmonization pass 2 round");

            let mut next = Groups::default();
            for (index, batch) in groups.names.chunks(self.batch_size).enumerate() {
                if cancel.is_cancelled() {
                    return Err(EngineError::cancelled());
                }
                let batch = batch.to_vec();
                let (batch, outcome) = self.cluster_batch(batch).await;
                let unit = format!("pass 2 round {} batch {}", result.rounds, index);
                for (name, member_names) in self.absorb_outcome(&batch, outcome, result, unit) {
                    let members: Vec<String> = member_names
                        .iter()
                        .flat_map(|m| groups.members.get(m).cloned().unwrap_or_default())
                        .collect();
                    next.add(name, members);
                }
            }

            *groups = next;
            if groups.len() >= before {
                stabilized = true;
                break;
            }
        }

        if !stabilized && groups.len() > 1 {
            warn!(rounds = result.rounds, remaining = groups.len(), "Harmonization did not converge");
            result.converged = false;
            result.warnings.push(GenerationWarning::NonConvergence {
                rounds: result.rounds,
                remaining: groups.len(),
            });
        }
        Ok(())
    }

    async fn cluster_batch(
        &self,
        batch: Vec<String>,
    ) -> (Vec<String>, Result<Vec<ConceptCluster>, EngineError>) {
        let clusterer = Arc::clone(&self.clusterer);
        let payload = batch.clone();
        let outcome = call_blocking(clusterer, self.call_timeout, move |c: &C| {
            c.cluster_concepts(&payload).map_err(|e| e.to_string())
        })
        .await;
        (batch, outcome)
    }

    fn absorb_outcome(
        &self,
        batch: &[String],
        outcome: Result<Vec<ConceptCluster>, EngineError>,
        result: &mut HarmonizationResult,
        unit: String,
    ) -> Vec<(String, Vec<String>)> {
        result.stats.record(outcome.is_ok());
        match outcome {
            Ok(proposals) => reconcile_batch(batch, proposals),
            Err(e) => {
                warn!(unit = %unit, "Clustering batch failed: {}", e);
                result
                    .warnings
                    .push(GenerationWarning::partial(Stage::ConceptClustering, unit, e));
                identity(batch)
            }
        }
    }
}
