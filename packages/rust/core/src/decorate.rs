//! Decoration: attach qualifying hits to the tree nodes they target.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use insertster_queries::QueryCatalog;
use insertster_shared::{InsertsterError, NodeId, Query, QueryId, Result, validate_query_threshold};
use insertster_tree::Tree;

/// A hit that passed the acceptance threshold.
///
/// Only the score is kept. Alignment coordinates stay on the catalog's
/// [`Hit`](insertster_shared::Hit) and do not affect placement: edge
/// positions come from the score function's edge fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoratedHit {
    pub score: f64,
}

/// Per-query map from node to the hits it received.
pub type NodeHits = BTreeMap<NodeId, Vec<DecoratedHit>>;

/// Decorations for every query in the catalog.
///
/// A query whose hits were all discarded is still present, with an empty map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decorations {
    by_query: BTreeMap<QueryId, NodeHits>,
}

impl Decorations {
    /// Decorated nodes of one query.
    pub fn query(&self, id: &QueryId) -> Option<&NodeHits> {
        self.by_query.get(id)
    }

    /// All queries (ascending id) with their decorated nodes.
    pub fn iter(&self) -> impl Iterator<Item = (&QueryId, &NodeHits)> {
        self.by_query.iter()
    }

    pub fn len(&self) -> usize {
        self.by_query.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_query.is_empty()
    }

    /// Node-centric view: query id → hits attached to `node`.
    pub fn node(&self, node: NodeId) -> BTreeMap<&QueryId, &[DecoratedHit]> {
        self.by_query
            .iter()
            .filter_map(|(query, nodes)| nodes.get(&node).map(|hits| (query, hits.as_slice())))
            .collect()
    }

    /// Number of hits that survived decoration.
    pub fn hit_count(&self) -> usize {
        self.by_query
            .values()
            .flat_map(|nodes| nodes.values())
            .map(Vec::len)
            .sum()
    }
}

/// Attach every hit with `score >= query_threshold` to its target node.
///
/// Every hit target must name a node of `tree`, whether or not the hit
/// qualifies; an unknown target is a parse error. Queries are decorated in
/// parallel; the tree is only read.
#[instrument(skip_all, fields(queries = catalog.len(), query_threshold = query_threshold))]
pub fn decorate(tree: &Tree, catalog: &QueryCatalog, query_threshold: f64) -> Result<Decorations> {
    validate_query_threshold(query_threshold)?;

    let queries: Vec<&Query> = catalog.iter().collect();
    let decorated: Vec<(QueryId, NodeHits)> = queries
        .par_iter()
        .map(|query| decorate_query(tree, query, query_threshold))
        .collect::<Result<_>>()?;

    let decorations = Decorations {
        by_query: decorated.into_iter().collect(),
    };

    info!(
        hits_kept = decorations.hit_count(),
        hits_total = catalog.hit_count(),
        "decoration complete"
    );

    Ok(decorations)
}

fn decorate_query(tree: &Tree, query: &Query, threshold: f64) -> Result<(QueryId, NodeHits)> {
    let mut nodes = NodeHits::new();

    for hit in &query.hits {
        let node = tree.find(&hit.target).ok_or_else(|| {
            InsertsterError::parse(format!(
                "query '{}' has a hit against '{}', which is not a node of the tree",
                query.id, hit.target
            ))
        })?;

        if hit.score >= threshold {
            nodes.entry(node).or_default().push(DecoratedHit { score: hit.score });
        }
    }

    debug!(query = %query.id, nodes = nodes.len(), "decorated query");
    Ok((query.id.clone(), nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{mock_catalog, sample_tree};
    use insertster_shared::Hit;

    #[test]
    fn keeps_hits_at_or_above_threshold() {
        let tree = sample_tree();
        let decorations = decorate(&tree, &mock_catalog(), 11.0).expect("decorate");

        let find = |n: &str| tree.find(n).expect("node");
        let scores = |n: &str| -> Vec<(String, Vec<f64>)> {
            decorations
                .node(find(n))
                .into_iter()
                .map(|(q, hits)| (q.to_string(), hits.iter().map(|h| h.score).collect()))
                .collect()
        };

        assert_eq!(scores("a"), vec![("query1".to_string(), vec![95.6])]);
        assert!(scores("b").is_empty());
        assert!(scores("d").is_empty(), "10.7 is below the threshold");
        assert_eq!(
            scores("f"),
            vec![("query1".to_string(), vec![15.7]), ("query2".to_string(), vec![90.6])]
        );
        assert_eq!(scores("g"), vec![("query2".to_string(), vec![12.7])]);
        for internal in ["c", "e", "h", "root"] {
            assert!(scores(internal).is_empty(), "{internal} carries no direct hits");
        }
    }

    #[test]
    fn threshold_equal_to_score_is_kept() {
        let tree = sample_tree();
        let catalog =
            QueryCatalog::from_queries(vec![Query::new("q", vec![Hit::new("a", 11.0)])]).expect("catalog");
        let decorations = decorate(&tree, &catalog, 11.0).expect("decorate");
        assert_eq!(decorations.hit_count(), 1);
    }

    #[test]
    fn fully_filtered_query_is_still_listed() {
        let tree = sample_tree();
        let decorations = decorate(&tree, &mock_catalog(), 100.0).expect("decorate");
        assert_eq!(decorations.len(), 2);
        assert!(decorations.query(&"query1".into()).expect("query1").is_empty());
    }

    #[test]
    fn coordinates_do_not_change_decorations() {
        let tree = sample_tree();
        let plain = QueryCatalog::from_queries(vec![Query::new(
            "q",
            vec![Hit::new("a", 90.0), Hit::new("f", 80.0)],
        )])
        .expect("catalog");
        let located = QueryCatalog::from_queries(vec![Query::new(
            "q",
            vec![Hit::new("a", 90.0).with_coordinate(12), Hit::new("f", 80.0).with_coordinate(4000)],
        )])
        .expect("catalog");

        assert_eq!(
            decorate(&tree, &plain, 50.0).expect("decorate"),
            decorate(&tree, &located, 50.0).expect("decorate")
        );
    }

    #[test]
    fn invalid_threshold_is_config_error() {
        let tree = sample_tree();
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let err = decorate(&tree, &mock_catalog(), bad).unwrap_err();
            assert!(matches!(err, InsertsterError::Config { .. }));
        }
    }

    #[test]
    fn unknown_target_is_parse_error() {
        let tree = sample_tree();
        let catalog = QueryCatalog::from_queries(vec![Query::new(
            "q",
            vec![Hit::new("nowhere", 1.0)],
        )])
        .expect("catalog");
        let err = decorate(&tree, &catalog, 50.0).unwrap_err();
        assert!(matches!(err, InsertsterError::Parse { .. }));
        assert!(err.to_string().contains("nowhere"));
    }
}
