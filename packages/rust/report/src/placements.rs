//! `placements.tsv`: one row per processed query.

use serde::Serialize;

use insertster_shared::{Disposition, InsertionResult, InsertsterError, Result};
use insertster_tree::Tree;

/// Column layout of `placements.tsv`.
#[derive(Debug, Serialize)]
struct Row<'a> {
    query_id: &'a str,
    disposition: String,
    reason: Option<String>,
    edge_parent: Option<String>,
    edge_child: Option<String>,
    node_id: Option<usize>,
    branch_length: Option<f64>,
    score: Option<f64>,
}

impl<'a> Row<'a> {
    fn new(tree: &Tree, result: &'a InsertionResult) -> Self {
        let reason = match result.disposition {
            Disposition::Placed => None,
            Disposition::Unplaced { reason } => Some(reason.to_string()),
        };
        Self {
            query_id: result.query.as_str(),
            disposition: result.disposition.to_string(),
            reason,
            edge_parent: result
                .target_edge
                .and_then(|e| e.parent)
                .map(|id| tree.label(id)),
            edge_child: result.target_edge.map(|e| tree.label(e.child)),
            node_id: result.node.map(|id| id.index()),
            branch_length: result.branch_length,
            score: result.score,
        }
    }
}

/// Render results as tab-separated text with a header row.
pub fn render(tree: &Tree, results: &[InsertionResult]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());

    for result in results {
        writer
            .serialize(Row::new(tree, result))
            .map_err(|e| InsertsterError::validation(format!("placements serialization failed: {e}")))?;
    }

    // Header-only output when nothing was processed.
    if results.is_empty() {
        writer
            .write_record(HEADER)
            .map_err(|e| InsertsterError::validation(format!("placements serialization failed: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| InsertsterError::validation(format!("placements serialization failed: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| InsertsterError::validation(format!("placements are not valid UTF-8: {e}")))
}

const HEADER: [&str; 8] = [
    "query_id",
    "disposition",
    "reason",
    "edge_parent",
    "edge_child",
    "node_id",
    "branch_length",
    "score",
];
