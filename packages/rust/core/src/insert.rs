//! Insertion: graft selected queries onto the tree, one at a time.
//!
//! This is the only stage that mutates the tree. Queries are applied in
//! ascending id order so a later query sees every split made by an earlier
//! one on the same edge.

use tracing::{debug, info, instrument, warn};

use insertster_shared::{Disposition, Edge, InsertionResult, InsertsterError, NodeId, Result, UnplacedReason};
use insertster_tree::Tree;

use crate::best::Selection;
use crate::pipeline::ProgressReporter;
use crate::score::Candidate;

// ---------------------------------------------------------------------------
// Length functions
// ---------------------------------------------------------------------------

/// A named branch-length strategy for new leaves.
pub trait LengthFunction: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Length of the pendant edge of the new leaf.
    fn length(&self, tree: &Tree, candidate: &Candidate) -> f64;
}

/// Attach at zero distance.
pub struct ZeroLength;

impl LengthFunction for ZeroLength {
    fn name(&self) -> &str {
        "zero"
    }

    fn description(&self) -> &str {
        "attach at zero distance (default)"
    }

    fn length(&self, _tree: &Tree, _candidate: &Candidate) -> f64 {
        0.0
    }
}

/// Divergence implied by the best hit under the target.
pub struct DivergenceLength;

impl LengthFunction for DivergenceLength {
    fn name(&self) -> &str {
        "divergence"
    }

    fn description(&self) -> &str {
        "1 - identity/100 of the best hit under the target"
    }

    fn length(&self, _tree: &Tree, candidate: &Candidate) -> f64 {
        candidate.estimated_length
    }
}

/// Mean pendant-edge length of the tips below the target.
pub struct TipMeanLength;

impl LengthFunction for TipMeanLength {
    fn name(&self) -> &str {
        "tip-mean"
    }

    fn description(&self) -> &str {
        "mean pendant length of the tips below the target (0 when unknown)"
    }

    fn length(&self, tree: &Tree, candidate: &Candidate) -> f64 {
        let mut stack = vec![candidate.node];
        let (mut total, mut count) = (0.0, 0usize);

        while let Some(id) = stack.pop() {
            let children = tree.children(id);
            if children.is_empty() {
                if let Some(length) = tree.length(id) {
                    total += length;
                    count += 1;
                }
            } else {
                stack.extend_from_slice(children);
            }
        }

        if count == 0 { 0.0 } else { total / count as f64 }
    }
}

// ---------------------------------------------------------------------------
// Insertion
// ---------------------------------------------------------------------------

/// Results of the insertion phase.
#[derive(Debug, Default)]
pub struct InsertOutcome {
    /// One result per processed query, in processing order.
    pub results: Vec<InsertionResult>,
    /// The structural error that stopped the batch, if any.
    pub halted: Option<InsertsterError>,
    /// Whether the caller cancelled before every query was processed.
    pub cancelled: bool,
}

/// Insert every placed selection into `tree`.
///
/// A structural error halts the batch: results and mutations up to that
/// point are kept and the error is returned in [`InsertOutcome::halted`].
/// Cancellation is checked between queries.
#[instrument(skip_all, fields(queries = selections.len(), insert_threshold = insert_threshold, length_function = length_function.name()))]
pub fn insert(
    tree: &mut Tree,
    selections: &[Selection],
    insert_threshold: f64,
    length_function: &dyn LengthFunction,
    progress: &dyn ProgressReporter,
) -> InsertOutcome {
    let mut ordered: Vec<&Selection> = selections.iter().collect();
    ordered.sort_by(|a, b| a.query.cmp(&b.query));

    let total = ordered.len();
    let mut outcome = InsertOutcome::default();

    for (i, selection) in ordered.into_iter().enumerate() {
        if progress.cancelled() {
            warn!(processed = i, total, "insertion cancelled");
            outcome.cancelled = true;
            break;
        }

        let result = match &selection.choice {
            Some(candidate) if candidate.score >= insert_threshold => {
                match attach(tree, candidate, length_function) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(query = %selection.query, error = %e, "insertion halted");
                        outcome.halted = Some(e);
                        break;
                    }
                }
            }
            Some(candidate) => InsertionResult::unplaced(
                selection.query.clone(),
                UnplacedReason::BelowThreshold,
                Some(candidate.score),
            ),
            None => InsertionResult::unplaced(
                selection.query.clone(),
                selection.reason.unwrap_or(UnplacedReason::NoEvidence),
                selection.top_score,
            ),
        };

        progress.query_inserted(&result, i + 1, total);
        outcome.results.push(result);
    }

    info!(
        inserted = outcome.results.iter().filter(|r| r.disposition.is_placed()).count(),
        processed = outcome.results.len(),
        halted = outcome.halted.is_some(),
        "insertion complete"
    );

    outcome
}

/// Graft one query next to its candidate node.
fn attach(tree: &mut Tree, candidate: &Candidate, length_function: &dyn LengthFunction) -> Result<InsertionResult> {
    let target = candidate.node;
    let name = candidate.query.as_str();

    tree.node(target)?;
    // A lone root tip would turn internal and the leaf count would not grow.
    if tree.is_root(target) && tree.is_tip(target) {
        return Err(InsertsterError::structural(format!(
            "cannot insert '{name}': the tree has a single node"
        )));
    }
    if tree.find(name).is_some() {
        return Err(InsertsterError::structural(format!(
            "cannot insert '{name}': the tree already has a node with that name"
        )));
    }

    let length = length_function.length(tree, candidate);
    if !length.is_finite() || length < 0.0 {
        return Err(InsertsterError::structural(format!(
            "length function '{}' produced invalid branch length {length} for '{name}'",
            length_function.name()
        )));
    }

    let fraction = if candidate.edge_fraction.is_nan() {
        0.0
    } else {
        candidate.edge_fraction.clamp(0.0, 1.0)
    };

    let parent = tree.parent(target);
    let edge = Edge {
        parent,
        child: target,
    };

    let attach_to: NodeId = match parent {
        None => target,
        Some(parent) if fraction >= 1.0 => parent,
        Some(_) if fraction == 0.0 && !tree.is_tip(target) => target,
        Some(_) => tree.split_edge(target, fraction)?,
    };

    let leaf = tree.add_child(attach_to, Some(name.to_string()), Some(length))?;

    debug!(
        query = name,
        target = %tree.label(target),
        attached_to = %attach_to,
        %leaf,
        fraction,
        length,
        "inserted"
    );

    Ok(InsertionResult {
        query: candidate.query.clone(),
        disposition: Disposition::Placed,
        target_edge: Some(edge),
        node: Some(leaf),
        attached_to: Some(attach_to),
        branch_length: Some(length),
        score: Some(candidate.score),
    })
}
