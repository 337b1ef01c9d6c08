//! Scoring: turn propagated aggregates into comparable candidate scores.
//!
//! Score functions are pure: they read the tree and the aggregates and
//! return a score plus an edge-insertion fraction.

use rayon::prelude::*;
use tracing::{info, instrument};

use insertster_shared::{NodeId, QueryId};
use insertster_tree::{Tree, TreeStats};

use crate::propagate::{Aggregate, Propagated};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A scored (query, node) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub query: QueryId,
    pub node: NodeId,
    pub score: f64,
    /// Branch length suggested by the evidence (percent-identity divergence).
    pub estimated_length: f64,
    /// Where on the edge above `node` the query belongs: 0 at the node,
    /// 1 at its parent.
    pub edge_fraction: f64,
}

/// All candidates of one query, children before parents.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCandidates {
    pub query: QueryId,
    pub candidates: Vec<Candidate>,
}

/// Everything a score function may look at.
pub struct ScoreContext<'a> {
    pub tree: &'a Tree,
    pub stats: &'a TreeStats,
    pub node: NodeId,
    /// Evidence in the subtree of `node`.
    pub local: &'a Aggregate,
    /// Evidence across the whole tree (the root aggregate).
    pub global: &'a Aggregate,
}

/// Output of a score function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub score: f64,
    pub edge_fraction: f64,
}

/// A named scoring strategy.
pub trait ScoreFunction: Send + Sync {
    /// Registry key.
    fn name(&self) -> &str;

    /// One-line description for `insertster list score`.
    fn description(&self) -> &str;

    fn score(&self, ctx: &ScoreContext<'_>) -> Scored;
}

// ---------------------------------------------------------------------------
// Built-in score functions
// ---------------------------------------------------------------------------

/// F-beta measure of how well a node's subtree matches the query's hits.
///
/// Precision is the share of the subtree's tips carrying evidence, recall
/// the share of the query's qualifying hits falling inside the subtree.
/// Partially covered clades are placed up the edge, in proportion to the
/// uncovered share.
pub struct FBetaMeasure {
    name: &'static str,
    description: &'static str,
    beta: f64,
}

impl FBetaMeasure {
    pub const fn new(name: &'static str, description: &'static str, beta: f64) -> Self {
        Self {
            name,
            description,
            beta,
        }
    }

    pub fn f1() -> Self {
        Self::new("f1-measure", "F1: balanced precision and recall", 1.0)
    }

    pub fn fhalf() -> Self {
        Self::new("fhalf-measure", "F0.5: weighs precision over recall", 0.5)
    }

    pub fn f2() -> Self {
        Self::new("f2-measure", "F2: weighs recall over precision", 2.0)
    }
}

impl ScoreFunction for FBetaMeasure {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn score(&self, ctx: &ScoreContext<'_>) -> Scored {
        let tips = ctx.stats.tip_count(ctx.node).unwrap_or(1).max(1) as f64;
        let precision = (ctx.local.covered as f64 / tips).min(1.0);
        let recall = if ctx.global.hits == 0 {
            0.0
        } else {
            ctx.local.hits as f64 / ctx.global.hits as f64
        };

        let beta2 = self.beta * self.beta;
        let denominator = beta2 * precision + recall;
        let score = if denominator > 0.0 {
            (1.0 + beta2) * precision * recall / denominator
        } else {
            0.0
        };

        Scored {
            score,
            edge_fraction: 1.0 - precision,
        }
    }
}

/// The propagated value itself (see the combination rule).
pub struct AggregateScore;

impl ScoreFunction for AggregateScore {
    fn name(&self) -> &str {
        "aggregate"
    }

    fn description(&self) -> &str {
        "propagated value under the combination rule"
    }

    fn score(&self, ctx: &ScoreContext<'_>) -> Scored {
        Scored {
            score: ctx.local.value,
            edge_fraction: 0.0,
        }
    }
}

/// Number of qualifying hits in the subtree.
pub struct HitCount;

impl ScoreFunction for HitCount {
    fn name(&self) -> &str {
        "hit-count"
    }

    fn description(&self) -> &str {
        "number of qualifying hits in the subtree"
    }

    fn score(&self, ctx: &ScoreContext<'_>) -> Scored {
        Scored {
            score: ctx.local.hits as f64,
            edge_fraction: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score every propagated (query, node) pair.
///
/// One [`QueryCandidates`] is returned per query, in ascending query order;
/// queries without evidence get an empty candidate list.
#[instrument(skip_all, fields(queries = propagated.len(), score_function = function.name()))]
pub fn score(
    tree: &Tree,
    stats: &TreeStats,
    propagated: &Propagated,
    function: &dyn ScoreFunction,
) -> Vec<QueryCandidates> {
    let entries: Vec<_> = propagated.iter().collect();

    let scored: Vec<QueryCandidates> = entries
        .par_iter()
        .map(|(query, evidence)| {
            let candidates = match evidence.global() {
                Some(global) => evidence
                    .iter()
                    .map(|(node, local)| {
                        let ctx = ScoreContext {
                            tree,
                            stats,
                            node,
                            local,
                            global,
                        };
                        let Scored {
                            score,
                            edge_fraction,
                        } = function.score(&ctx);
                        Candidate {
                            query: (*query).clone(),
                            node,
                            score,
                            estimated_length: divergence(local.best),
                            edge_fraction,
                        }
                    })
                    .collect(),
                None => Vec::new(),
            };
            QueryCandidates {
                query: (*query).clone(),
                candidates,
            }
        })
        .collect();

    info!(
        candidates = scored.iter().map(|q| q.candidates.len()).sum::<usize>(),
        "scoring complete"
    );

    scored
}

/// Branch length implied by a percent-identity score.
fn divergence(identity: f64) -> f64 {
    if identity.is_finite() {
        (1.0 - identity / 100.0).max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorate::decorate;
    use crate::propagate::{Combine, propagate};
    use crate::tests::{mock_catalog, sample_tree};

    fn scores(function: &dyn ScoreFunction) -> (Tree, Vec<QueryCandidates>) {
        let tree = sample_tree();
        let stats = TreeStats::compute(&tree);
        let d = decorate(&tree, &mock_catalog(), 11.0).expect("decorate");
        let p = propagate(&tree, &d, Combine::Max);
        let scored = score(&tree, &stats, &p, function);
        (tree, scored)
    }

    fn by_name(tree: &Tree, scored: &[QueryCandidates], query: &str) -> Vec<(String, f64)> {
        scored
            .iter()
            .find(|q| q.query.as_str() == query)
            .expect("query")
            .candidates
            .iter()
            .map(|c| (tree.label(c.node), c.score))
            .collect()
    }

    #[test]
    fn hit_count_matches_local_hits() {
        let (tree, scored) = scores(&HitCount);
        assert_eq!(
            by_name(&tree, &scored, "query1"),
            vec![
                ("a".into(), 1.0),
                ("c".into(), 1.0),
                ("e".into(), 1.0),
                ("f".into(), 1.0),
                ("h".into(), 1.0),
                ("root".into(), 2.0),
            ]
        );
        assert_eq!(
            by_name(&tree, &scored, "query2"),
            vec![("f".into(), 1.0), ("g".into(), 1.0), ("h".into(), 2.0), ("root".into(), 2.0)]
        );
    }

    #[test]
    fn f1_prefers_fully_covered_clades() {
        let (tree, scored) = scores(&FBetaMeasure::f1());
        let q2 = by_name(&tree, &scored, "query2");
        let h = q2.iter().find(|(n, _)| n == "h").expect("h").1;
        let root = q2.iter().find(|(n, _)| n == "root").expect("root").1;
        // h: precision 2/2, recall 2/2
        assert!((h - 1.0).abs() < 1e-9);
        // root: precision 2/5, recall 1 → 2·0.4/1.4
        assert!((root - 0.8 / 1.4).abs() < 1e-9);
    }

    #[test]
    fn f_measure_fraction_tracks_uncovered_share() {
        let (tree, scored) = scores(&FBetaMeasure::f1());
        let q1 = &scored.iter().find(|q| q.query.as_str() == "query1").expect("query1").candidates;
        let at = |name: &str| q1.iter().find(|c| tree.label(c.node) == name).expect("candidate");
        assert_eq!(at("a").edge_fraction, 0.0);
        assert!((at("c").edge_fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn estimated_length_is_identity_divergence() {
        let (tree, scored) = scores(&AggregateScore);
        let q1 = &scored.iter().find(|q| q.query.as_str() == "query1").expect("query1").candidates;
        let a = q1.iter().find(|c| tree.label(c.node) == "a").expect("a");
        assert!((a.estimated_length - 0.044).abs() < 1e-9);
        assert_eq!(a.score, 95.6);
    }

    #[test]
    fn queries_without_evidence_have_no_candidates() {
        let tree = sample_tree();
        let stats = TreeStats::compute(&tree);
        let d = decorate(&tree, &mock_catalog(), 99.0).expect("decorate");
        let p = propagate(&tree, &d, Combine::Max);
        let scored = score(&tree, &stats, &p, &HitCount);
        assert_eq!(scored.len(), 2);
        assert!(scored.iter().all(|q| q.candidates.is_empty()));
    }
}
