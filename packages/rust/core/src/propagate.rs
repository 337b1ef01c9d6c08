//! Propagation: aggregate decorated evidence up the tree.
//!
//! For each query, every node that is an ancestor-or-self of a decorated
//! node receives an [`Aggregate`] summarizing the qualifying hits in its
//! subtree. Nodes outside that set have no entry: "no evidence" is not the
//! same as a zero score.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use insertster_shared::{InsertsterError, NodeId, QueryId};
use insertster_tree::Tree;

use crate::decorate::{DecoratedHit, Decorations, NodeHits};

// ---------------------------------------------------------------------------
// Combination rule
// ---------------------------------------------------------------------------

/// How hit scores are combined into a node's scalar value.
///
/// Every rule is monotonic for non-negative scores: more qualifying hits in
/// a subtree never lower the value at its root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Combine {
    /// Highest qualifying raw score in the subtree.
    #[default]
    Max,
    /// Sum of qualifying raw scores in the subtree.
    Sum,
    /// Number of qualifying hits in the subtree.
    Count,
}

impl Combine {
    pub const ALL: [Combine; 3] = [Combine::Max, Combine::Sum, Combine::Count];

    pub fn name(self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Count => "count",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Max => "highest qualifying score in the subtree (default)",
            Self::Sum => "sum of qualifying scores in the subtree",
            Self::Count => "number of qualifying hits in the subtree",
        }
    }

    fn leaf(self, hits: &[DecoratedHit]) -> f64 {
        match self {
            Self::Max => hits.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max),
            Self::Sum => hits.iter().map(|h| h.score).sum(),
            Self::Count => hits.len() as f64,
        }
    }

    fn merge(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Max => a.max(b),
            Self::Sum | Self::Count => a + b,
        }
    }
}

impl FromStr for Combine {
    type Err = InsertsterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| {
                InsertsterError::config(format!(
                    "unknown combination rule '{s}' (available: max, sum, count)"
                ))
            })
    }
}

impl std::fmt::Display for Combine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Propagated evidence for one (query, node) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Scalar produced by the [`Combine`] rule.
    pub value: f64,
    /// Qualifying hits in the subtree.
    pub hits: usize,
    /// Distinct decorated nodes in the subtree.
    pub covered: usize,
    /// Highest qualifying raw score in the subtree.
    pub best: f64,
}

impl Aggregate {
    fn from_hits(combine: Combine, hits: &[DecoratedHit]) -> Self {
        Self {
            value: combine.leaf(hits),
            hits: hits.len(),
            covered: 1,
            best: hits.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max),
        }
    }

    fn absorb(&mut self, combine: Combine, other: &Aggregate) {
        self.value = combine.merge(self.value, other.value);
        self.hits += other.hits;
        self.covered += other.covered;
        self.best = self.best.max(other.best);
    }
}

/// Aggregates of one query, kept in post-order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryEvidence {
    order: Vec<NodeId>,
    aggregates: HashMap<NodeId, Aggregate>,
    root: Option<Aggregate>,
}

impl QueryEvidence {
    pub fn get(&self, node: NodeId) -> Option<&Aggregate> {
        self.aggregates.get(&node)
    }

    /// The root aggregate: the query's evidence across the whole tree.
    pub fn global(&self) -> Option<&Aggregate> {
        self.root.as_ref()
    }

    /// (node, aggregate) pairs, children before parents.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Aggregate)> {
        self.order.iter().map(|id| (*id, &self.aggregates[id]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Propagated evidence for every query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Propagated {
    by_query: BTreeMap<QueryId, QueryEvidence>,
}

impl Propagated {
    pub fn query(&self, id: &QueryId) -> Option<&QueryEvidence> {
        self.by_query.get(id)
    }

    pub fn get(&self, query: &QueryId, node: NodeId) -> Option<&Aggregate> {
        self.by_query.get(query).and_then(|e| e.get(node))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QueryId, &QueryEvidence)> {
        self.by_query.iter()
    }

    pub fn len(&self) -> usize {
        self.by_query.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_query.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

/// Propagate every query's decorations toward the root.
#[instrument(skip_all, fields(queries = decorations.len(), combine = %combine))]
pub fn propagate(tree: &Tree, decorations: &Decorations, combine: Combine) -> Propagated {
    let rank = postorder_rank(tree);

    let entries: Vec<(&QueryId, &NodeHits)> = decorations.iter().collect();
    let by_query: BTreeMap<QueryId, QueryEvidence> = entries
        .par_iter()
        .map(|(query, nodes)| {
            let evidence = propagate_query(tree, &rank, nodes, combine);
            debug!(query = %query, nodes = evidence.len(), "propagated query");
            ((*query).clone(), evidence)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect();

    info!(
        entries = by_query.values().map(QueryEvidence::len).sum::<usize>(),
        "propagation complete"
    );

    Propagated { by_query }
}

/// Position of each node in the tree's post-order.
fn postorder_rank(tree: &Tree) -> Vec<usize> {
    let mut rank = vec![0; tree.len()];
    for (i, id) in tree.postorder().into_iter().enumerate() {
        rank[id.index()] = i;
    }
    rank
}

/// Aggregate one query. Only the ancestors of decorated nodes are visited,
/// in post-order rank so each child is final before its parent reads it.
fn propagate_query(tree: &Tree, rank: &[usize], nodes: &NodeHits, combine: Combine) -> QueryEvidence {
    let mut reached: HashSet<NodeId> = HashSet::new();
    for &node in nodes.keys() {
        let mut current = Some(node);
        while let Some(id) = current {
            if !reached.insert(id) {
                break;
            }
            current = tree.parent(id);
        }
    }

    let mut order: Vec<NodeId> = reached.into_iter().collect();
    order.sort_by_key(|id| rank[id.index()]);

    let mut aggregates: HashMap<NodeId, Aggregate> = HashMap::with_capacity(order.len());
    for &id in &order {
        let mut aggregate: Option<Aggregate> = nodes
            .get(&id)
            .filter(|hits| !hits.is_empty())
            .map(|hits| Aggregate::from_hits(combine, hits));

        for child in tree.children(id) {
            if let Some(child_agg) = aggregates.get(child) {
                match aggregate.as_mut() {
                    Some(agg) => agg.absorb(combine, child_agg),
                    None => aggregate = Some(*child_agg),
                }
            }
        }

        if let Some(agg) = aggregate {
            aggregates.insert(id, agg);
        }
    }

    order.retain(|id| aggregates.contains_key(id));
    let root = aggregates.get(&tree.root()).copied();

    QueryEvidence {
        order,
        aggregates,
        root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorate::decorate;
    use crate::tests::{mock_catalog, sample_tree};
    use insertster_queries::QueryCatalog;
    use insertster_shared::{Hit, Query};

    fn propagated(combine: Combine) -> (Tree, Propagated) {
        let tree = sample_tree();
        let decorations = decorate(&tree, &mock_catalog(), 11.0).expect("decorate");
        let propagated = propagate(&tree, &decorations, combine);
        (tree, propagated)
    }

    fn hits_at(tree: &Tree, p: &Propagated, query: &str, node: &str) -> Option<usize> {
        p.get(&QueryId::from(query), tree.find(node).expect("node"))
            .map(|a| a.hits)
    }

    #[test]
    fn hits_flow_to_every_ancestor() {
        let (tree, p) = propagated(Combine::Max);

        assert_eq!(hits_at(&tree, &p, "query1", "a"), Some(1));
        assert_eq!(hits_at(&tree, &p, "query1", "c"), Some(1));
        assert_eq!(hits_at(&tree, &p, "query1", "e"), Some(1));
        assert_eq!(hits_at(&tree, &p, "query1", "f"), Some(1));
        assert_eq!(hits_at(&tree, &p, "query1", "h"), Some(1));
        assert_eq!(hits_at(&tree, &p, "query1", "root"), Some(2));

        assert_eq!(hits_at(&tree, &p, "query2", "h"), Some(2));
        assert_eq!(hits_at(&tree, &p, "query2", "root"), Some(2));
    }

    #[test]
    fn nodes_without_evidence_are_absent() {
        let (tree, p) = propagated(Combine::Max);
        assert_eq!(hits_at(&tree, &p, "query1", "b"), None);
        assert_eq!(hits_at(&tree, &p, "query1", "d"), None);
        assert_eq!(hits_at(&tree, &p, "query2", "e"), None);
        assert_eq!(hits_at(&tree, &p, "query2", "a"), None);
    }

    #[test]
    fn combine_rules_at_the_root() {
        let query2 = QueryId::from("query2");
        let (tree, p) = propagated(Combine::Max);
        let root = p.get(&query2, tree.root()).expect("root");
        assert_eq!(root.value, 90.6);
        assert_eq!(root.best, 90.6);
        assert_eq!(root.covered, 2);

        let (tree, p) = propagated(Combine::Sum);
        let root = p.get(&query2, tree.root()).expect("root");
        assert!((root.value - (90.6 + 12.7)).abs() < 1e-9);

        let (tree, p) = propagated(Combine::Count);
        assert_eq!(p.get(&query2, tree.root()).expect("root").value, 2.0);
    }

    #[test]
    fn evidence_is_listed_children_first() {
        let (tree, p) = propagated(Combine::Max);
        let order: Vec<String> = p
            .query(&QueryId::from("query1"))
            .expect("query1")
            .iter()
            .map(|(id, _)| tree.label(id))
            .collect();
        assert_eq!(order, vec!["a", "c", "e", "f", "h", "root"]);
    }

    #[test]
    fn more_hits_never_lower_the_root_value() {
        let tree = sample_tree();
        for combine in Combine::ALL {
            let few = QueryCatalog::from_queries(vec![Query::new("q", vec![Hit::new("a", 40.0)])])
                .expect("catalog");
            let many = QueryCatalog::from_queries(vec![Query::new(
                "q",
                vec![Hit::new("a", 40.0), Hit::new("b", 20.0), Hit::new("g", 60.0)],
            )])
            .expect("catalog");

            let root_value = |catalog: &QueryCatalog| {
                let d = decorate(&tree, catalog, 0.0).expect("decorate");
                propagate(&tree, &d, combine)
                    .get(&QueryId::from("q"), tree.root())
                    .expect("root")
                    .value
            };
            assert!(root_value(&many) >= root_value(&few), "{combine} is not monotonic");
        }
    }

    #[test]
    fn combine_parses_names() {
        assert_eq!("sum".parse::<Combine>().expect("sum"), Combine::Sum);
        assert!(matches!(
            "median".parse::<Combine>().unwrap_err(),
            InsertsterError::Config { .. }
        ));
    }
}
