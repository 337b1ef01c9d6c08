//! Query-result parser trait and built-in parsers.
//!
//! Parsers turn the text of an aligner/search output into [`Query`] records.
//! They are selected by name through the [`ParserRegistry`]; an unknown name
//! is a configuration error.

mod blast6;
mod sam;
mod tsv;

use std::collections::HashMap;

use insertster_shared::{Hit, InsertsterError, Query, QueryId, Result};

pub use blast6::Blast6Parser;
pub use sam::SamParser;
pub use tsv::TsvParser;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Trait for query-result parsers.
pub trait QueryParser: Send + Sync {
    /// Registry key (e.g., `"blast6"`).
    fn name(&self) -> &str;

    /// One-line description for `insertster list parsers`.
    fn description(&self) -> &str;

    /// Parse the full file content. Queries come back in first-seen order.
    fn parse(&self, input: &str) -> Result<Vec<Query>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds the registered parsers, keyed by name.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn QueryParser>>,
}

impl ParserRegistry {
    /// Create a registry with all built-in parsers.
    pub fn new() -> Self {
        Self {
            parsers: vec![
                Box::new(TsvParser),
                Box::new(Blast6Parser),
                Box::new(SamParser),
            ],
        }
    }

    /// Resolve a parser by name.
    pub fn get(&self, name: &str) -> Result<&dyn QueryParser> {
        self.parsers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                InsertsterError::config(format!(
                    "unknown query parser '{name}' (available: {})",
                    self.names().join(", ")
                ))
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn QueryParser> {
        self.parsers.iter().map(|p| p.as_ref())
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Accumulates per-record hits into queries, preserving first-seen order.
#[derive(Default)]
pub(crate) struct QueryBuilder {
    order: Vec<Query>,
    index: HashMap<QueryId, usize>,
}

impl QueryBuilder {
    /// The query named `query`, registered with no hits if unseen.
    pub(crate) fn entry(&mut self, query: &str) -> &mut Query {
        let id = QueryId::from(query);
        let slot = match self.index.get(&id) {
            Some(&slot) => slot,
            None => {
                self.order.push(Query::new(id.clone(), Vec::new()));
                self.index.insert(id, self.order.len() - 1);
                self.order.len() - 1
            }
        };
        &mut self.order[slot]
    }

    pub(crate) fn push(&mut self, query: &str, hit: Hit) {
        self.entry(query).hits.push(hit);
    }

    pub(crate) fn finish(self) -> Vec<Query> {
        self.order
    }
}

/// Tab-separated reader shared by the tabular formats.
pub(crate) fn tab_reader(input: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes())
}

/// Parse a numeric column, reporting the 1-based line on failure.
pub(crate) fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    column: usize,
    what: &str,
    format: &str,
) -> Result<T> {
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let raw = record.get(column).ok_or_else(|| {
        InsertsterError::parse(format!("{format} line {line}: missing {what} column"))
    })?;
    raw.parse().map_err(|_| {
        InsertsterError::parse(format!("{format} line {line}: invalid {what} '{raw}'"))
    })
}
