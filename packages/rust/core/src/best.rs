//! Selection: reduce each query's candidates to at most one placement.

use tracing::{debug, info, instrument};

use insertster_shared::{QueryId, UnplacedReason};
use insertster_tree::{Tree, TreeStats};

use crate::score::{Candidate, QueryCandidates};

/// Outcome of selection for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub query: QueryId,
    /// The chosen candidate; `None` means Unplaced.
    pub choice: Option<Candidate>,
    /// Why nothing was chosen.
    pub reason: Option<UnplacedReason>,
    /// Highest finite score seen among all candidates, eligible or not.
    pub top_score: Option<f64>,
}

impl Selection {
    pub fn is_placed(&self) -> bool {
        self.choice.is_some()
    }
}

/// A named selection policy.
///
/// Candidates are offered in post-order; `prefers` decides whether a
/// contender displaces the current incumbent. Ties must be resolved the
/// same way on every run.
pub trait BestFunction: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether the policy considers `candidate` at all.
    fn admits(&self, _candidate: &Candidate, _tree: &Tree) -> bool {
        true
    }

    /// Whether `contender` should replace `incumbent`.
    fn prefers(&self, contender: &Candidate, incumbent: &Candidate, stats: &TreeStats) -> bool;
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Higher score wins; exact ties go to the node nearer a tip, then to the
/// earlier node in post-order.
pub struct MaxNearTip;

impl BestFunction for MaxNearTip {
    fn name(&self) -> &str {
        "max-near-tip"
    }

    fn description(&self) -> &str {
        "highest score, ties to the node nearest a tip (default)"
    }

    fn prefers(&self, contender: &Candidate, incumbent: &Candidate, stats: &TreeStats) -> bool {
        if contender.score != incumbent.score {
            return contender.score > incumbent.score;
        }
        let depth = |c: &Candidate| stats.min_tip_distance(c.node).unwrap_or(usize::MAX);
        depth(contender) < depth(incumbent)
    }
}

/// [`MaxNearTip`] that never places at the root.
pub struct MaxNoRoot;

impl BestFunction for MaxNoRoot {
    fn name(&self) -> &str {
        "max-no-root"
    }

    fn description(&self) -> &str {
        "highest score excluding the root, ties to the node nearest a tip"
    }

    fn admits(&self, candidate: &Candidate, tree: &Tree) -> bool {
        !tree.is_root(candidate.node)
    }

    fn prefers(&self, contender: &Candidate, incumbent: &Candidate, stats: &TreeStats) -> bool {
        MaxNearTip.prefers(contender, incumbent, stats)
    }
}

/// Higher score wins; exact ties go to the lower node id.
pub struct MaxLowestId;

impl BestFunction for MaxLowestId {
    fn name(&self) -> &str {
        "max-lowest-id"
    }

    fn description(&self) -> &str {
        "highest score, ties to the lowest node id"
    }

    fn prefers(&self, contender: &Candidate, incumbent: &Candidate, _stats: &TreeStats) -> bool {
        if contender.score != incumbent.score {
            return contender.score > incumbent.score;
        }
        contender.node < incumbent.node
    }
}

/// The first eligible candidate in post-order.
pub struct FirstAbove;

impl BestFunction for FirstAbove {
    fn name(&self) -> &str {
        "first-above"
    }

    fn description(&self) -> &str {
        "first candidate (children before parents) at or above the insert threshold"
    }

    fn prefers(&self, _contender: &Candidate, _incumbent: &Candidate, _stats: &TreeStats) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Pick at most one candidate per query.
///
/// A candidate is eligible when its score is finite, at least
/// `insert_threshold`, and admitted by the policy.
#[instrument(skip_all, fields(queries = candidates.len(), best_function = policy.name(), insert_threshold = insert_threshold))]
pub fn best(
    tree: &Tree,
    stats: &TreeStats,
    candidates: &[QueryCandidates],
    policy: &dyn BestFunction,
    insert_threshold: f64,
) -> Vec<Selection> {
    let selections: Vec<Selection> = candidates
        .iter()
        .map(|q| select_query(tree, stats, q, policy, insert_threshold))
        .collect();

    info!(
        placed = selections.iter().filter(|s| s.is_placed()).count(),
        unplaced = selections.iter().filter(|s| !s.is_placed()).count(),
        "selection complete"
    );

    selections
}

fn select_query(
    tree: &Tree,
    stats: &TreeStats,
    query: &QueryCandidates,
    policy: &dyn BestFunction,
    insert_threshold: f64,
) -> Selection {
    let top_score = query
        .candidates
        .iter()
        .map(|c| c.score)
        .filter(|s| s.is_finite())
        .reduce(f64::max);

    let mut choice: Option<&Candidate> = None;
    for candidate in &query.candidates {
        if !candidate.score.is_finite()
            || candidate.score < insert_threshold
            || !policy.admits(candidate, tree)
        {
            continue;
        }
        match choice {
            Some(incumbent) if !policy.prefers(candidate, incumbent, stats) => {}
            _ => choice = Some(candidate),
        }
    }

    let reason = match choice {
        Some(_) => None,
        None if query.candidates.is_empty() => Some(UnplacedReason::NoEvidence),
        None => Some(UnplacedReason::BelowThreshold),
    };

    debug!(
        query = %query.query,
        node = ?choice.map(|c| tree.label(c.node)),
        reason = ?reason,
        "selected"
    );

    Selection {
        query: query.query.clone(),
        choice: choice.cloned(),
        reason,
        top_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorate::decorate;
    use crate::propagate::{Combine, propagate};
    use crate::score::{HitCount, score};
    use crate::tests::{mock_catalog, sample_tree};
    use insertster_shared::NodeId;

    fn select(policy: &dyn BestFunction, insert_threshold: f64) -> (Tree, Vec<Selection>) {
        let tree = sample_tree();
        let stats = TreeStats::compute(&tree);
        let d = decorate(&tree, &mock_catalog(), 11.0).expect("decorate");
        let p = propagate(&tree, &d, Combine::Max);
        let c = score(&tree, &stats, &p, &HitCount);
        let selections = best(&tree, &stats, &c, policy, insert_threshold);
        (tree, selections)
    }

    fn chosen(tree: &Tree, selections: &[Selection]) -> Vec<(String, Option<String>)> {
        selections
            .iter()
            .map(|s| (s.query.to_string(), s.choice.as_ref().map(|c| tree.label(c.node))))
            .collect()
    }

    fn candidate(node: usize, score: f64) -> Candidate {
        Candidate {
            query: QueryId::from("q"),
            node: NodeId(node),
            score,
            estimated_length: 0.0,
            edge_fraction: 0.0,
        }
    }

    #[test]
    fn max_prefers_highest_score() {
        let (tree, selections) = select(&MaxNearTip, 0.0);
        assert_eq!(
            chosen(&tree, &selections),
            vec![
                ("query1".into(), Some("root".into())),
                ("query2".into(), Some("h".into())),
            ]
        );
    }

    #[test]
    fn ties_go_to_the_node_nearest_a_tip() {
        // query2: h and root both carry 2 hits; h is one branch from a tip.
        let (tree, selections) = select(&MaxNearTip, 0.0);
        let q2 = selections[1].choice.as_ref().expect("placed");
        assert_eq!(tree.label(q2.node), "h");
    }

    /// Higher score wins; ties go to the node nearer the root.
    struct MaxShallow;

    impl BestFunction for MaxShallow {
        fn name(&self) -> &str {
            "max-shallow"
        }

        fn description(&self) -> &str {
            "highest score, ties to the shallowest node"
        }

        fn prefers(&self, contender: &Candidate, incumbent: &Candidate, stats: &TreeStats) -> bool {
            contender.score > incumbent.score
                || (contender.score == incumbent.score
                    && stats.root_distance(contender.node) < stats.root_distance(incumbent.node))
        }
    }

    #[test]
    fn custom_policies_can_rank_by_root_distance() {
        // query2: h and root tie on 2 hits; root is zero branches from the root.
        let (tree, selections) = select(&MaxShallow, 0.0);
        assert_eq!(
            chosen(&tree, &selections),
            vec![
                ("query1".into(), Some("root".into())),
                ("query2".into(), Some("root".into())),
            ]
        );
    }

    #[test]
    fn no_root_policy_skips_the_root() {
        let (tree, selections) = select(&MaxNoRoot, 0.0);
        assert_eq!(
            chosen(&tree, &selections),
            vec![
                ("query1".into(), Some("a".into())),
                ("query2".into(), Some("h".into())),
            ]
        );
    }

    #[test]
    fn first_above_takes_the_earliest_eligible() {
        let (tree, selections) = select(&FirstAbove, 2.0);
        assert_eq!(
            chosen(&tree, &selections),
            vec![
                ("query1".into(), Some("root".into())),
                ("query2".into(), Some("h".into())),
            ]
        );
    }

    #[test]
    fn lowest_id_breaks_exact_ties() {
        let tree = sample_tree();
        let stats = TreeStats::compute(&tree);
        let a = candidate(5, 1.0);
        let b = candidate(2, 1.0);
        assert!(MaxLowestId.prefers(&b, &a, &stats));
        assert!(!MaxLowestId.prefers(&a, &b, &stats));
        assert!(MaxLowestId.prefers(&candidate(9, 2.0), &b, &stats));
    }

    #[test]
    fn threshold_above_every_score_leaves_queries_unplaced() {
        let (_, selections) = select(&MaxNearTip, 3.0);
        for s in &selections {
            assert!(!s.is_placed());
            assert_eq!(s.reason, Some(UnplacedReason::BelowThreshold));
            assert_eq!(s.top_score, Some(2.0));
        }
    }

    #[test]
    fn no_candidates_means_no_evidence() {
        let tree = sample_tree();
        let stats = TreeStats::compute(&tree);
        let empty = QueryCandidates {
            query: QueryId::from("q"),
            candidates: Vec::new(),
        };
        let selections = best(&tree, &stats, &[empty], &MaxNearTip, 0.0);
        assert_eq!(selections[0].reason, Some(UnplacedReason::NoEvidence));
        assert_eq!(selections[0].top_score, None);
    }

    #[test]
    fn non_finite_scores_are_never_chosen() {
        let tree = sample_tree();
        let stats = TreeStats::compute(&tree);
        let query = QueryCandidates {
            query: QueryId::from("q"),
            candidates: vec![candidate(1, f64::NAN), candidate(2, f64::INFINITY)],
        };
        let selections = best(&tree, &stats, &[query], &MaxNearTip, 0.0);
        assert!(!selections[0].is_placed());
        assert_eq!(selections[0].reason, Some(UnplacedReason::BelowThreshold));
    }
}
