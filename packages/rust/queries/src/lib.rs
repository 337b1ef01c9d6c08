//! Query catalog: the parsed set of queries and their hits.
//!
//! Raw query-result files are turned into [`Query`] records by a parser
//! chosen by name from the [`ParserRegistry`].

pub mod parsers;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, instrument};

use insertster_shared::{InsertsterError, Query, QueryId, Result};

pub use parsers::{ParserRegistry, QueryParser};

/// Parsed queries keyed (and iterated) by ascending query id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryCatalog {
    queries: BTreeMap<QueryId, Query>,
}

impl QueryCatalog {
    /// Build a catalog, rejecting duplicate query ids.
    pub fn from_queries(queries: impl IntoIterator<Item = Query>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for query in queries {
            if map.contains_key(&query.id) {
                return Err(InsertsterError::parse(format!(
                    "duplicate query id '{}'",
                    query.id
                )));
            }
            map.insert(query.id.clone(), query);
        }
        Ok(Self { queries: map })
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn get(&self, id: &QueryId) -> Option<&Query> {
        self.queries.get(id)
    }

    pub fn contains(&self, id: &QueryId) -> bool {
        self.queries.contains_key(id)
    }

    /// Queries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.queries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &QueryId> {
        self.queries.keys()
    }

    /// Total number of hits across all queries.
    pub fn hit_count(&self) -> usize {
        self.queries.values().map(|q| q.hits.len()).sum()
    }

    /// Drop every query for which `exclude` returns true.
    /// Returns the ids that were removed.
    pub fn exclude(&mut self, mut exclude: impl FnMut(&QueryId) -> bool) -> Vec<QueryId> {
        let removed: Vec<QueryId> = self.queries.keys().filter(|id| exclude(id)).cloned().collect();
        for id in &removed {
            self.queries.remove(id);
        }
        removed
    }
}

/// Read `path` and parse it with `parser`.
#[instrument(skip_all, fields(path = %path.display(), parser = parser.name()))]
pub fn load_catalog(path: &Path, parser: &dyn QueryParser) -> Result<QueryCatalog> {
    let content = std::fs::read_to_string(path).map_err(|e| InsertsterError::io(path, e))?;
    let catalog = QueryCatalog::from_queries(parser.parse(&content)?)?;

    info!(
        queries = catalog.len(),
        hits = catalog.hit_count(),
        "query catalog loaded"
    );

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use insertster_shared::Hit;

    #[test]
    fn catalog_orders_by_id() {
        let catalog = QueryCatalog::from_queries(vec![
            Query::new("q2", vec![Hit::new("a", 1.0)]),
            Query::new("q1", vec![Hit::new("b", 1.0), Hit::new("c", 2.0)]),
        ])
        .expect("catalog");

        let ids: Vec<&str> = catalog.ids().map(QueryId::as_str).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
        assert_eq!(catalog.hit_count(), 3);
    }

    #[test]
    fn duplicate_ids_are_parse_errors() {
        let err = QueryCatalog::from_queries(vec![
            Query::new("q1", vec![]),
            Query::new("q1", vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, InsertsterError::Parse { .. }));
    }

    #[test]
    fn exclude_removes_matching_queries() {
        let mut catalog = QueryCatalog::from_queries(vec![
            Query::new("q1", vec![]),
            Query::new("q2", vec![]),
        ])
        .expect("catalog");

        let removed = catalog.exclude(|id| id.as_str() == "q1");
        assert_eq!(removed, vec![QueryId::from("q1")]);
        assert!(!catalog.contains(&QueryId::from("q1")));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn load_catalog_from_file() {
        let tmp = std::env::temp_dir().join(format!("insertster_q_{}.tsv", uuid::Uuid::now_v7()));
        std::fs::write(&tmp, "q1\ta\t95.6\nq1\td\t10.7\nq2\tf\t90.6\n").expect("write fixture");

        let registry = ParserRegistry::new();
        let parser = registry.get("tsv").expect("tsv parser");
        let catalog = load_catalog(&tmp, parser).expect("load");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(&QueryId::from("q1")).expect("q1").hits.len(), 2);

        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn load_catalog_missing_file_is_io_error() {
        let registry = ParserRegistry::new();
        let parser = registry.get("tsv").expect("tsv parser");
        let err = load_catalog(Path::new("/nonexistent/insertster/hits.tsv"), parser).unwrap_err();
        assert!(matches!(err, InsertsterError::Io { .. }));
    }
}
