//! Core domain types shared by the tree, parser, core and report crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a query sequence (the read/contig name in the hit file).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub String);

impl QueryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for QueryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for QueryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Arena index of a tree node. Ids are assigned in creation order and never
/// reused, so an id stays valid for the lifetime of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Query / Hit
// ---------------------------------------------------------------------------

/// A single query-to-reference hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Name of the reference node the query hit.
    pub target: String,
    /// Raw score supplied by the aligner (e.g., percent identity).
    pub score: f64,
    /// Alignment start on the reference, when the format provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<u64>,
}

impl Hit {
    pub fn new(target: impl Into<String>, score: f64) -> Self {
        Self {
            target: target.into(),
            score,
            coordinate: None,
        }
    }

    pub fn with_coordinate(mut self, coordinate: u64) -> Self {
        self.coordinate = Some(coordinate);
        self
    }
}

/// A parsed query with its hits, in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    /// Opaque sequence handle (kept when the input format carries one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    pub hits: Vec<Hit>,
}

impl Query {
    pub fn new(id: impl Into<QueryId>, hits: Vec<Hit>) -> Self {
        Self {
            id: id.into(),
            sequence: None,
            hits,
        }
    }
}

// ---------------------------------------------------------------------------
// Placement results
// ---------------------------------------------------------------------------

/// A tree edge identified by its endpoints. `parent` is `None` for the
/// (virtual) edge above the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub parent: Option<NodeId>,
    pub child: NodeId,
}

/// Why a query was not placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnplacedReason {
    /// No hit survived decoration, so no node carries evidence.
    NoEvidence,
    /// Candidates existed but none reached the insertion threshold.
    BelowThreshold,
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoEvidence => f.write_str("no-evidence"),
            Self::BelowThreshold => f.write_str("below-threshold"),
        }
    }
}

/// Final disposition of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Disposition {
    Placed,
    Unplaced { reason: UnplacedReason },
}

impl Disposition {
    pub fn is_placed(&self) -> bool {
        matches!(self, Self::Placed)
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placed => f.write_str("placed"),
            Self::Unplaced { .. } => f.write_str("unplaced"),
        }
    }
}

/// The per-query outcome of a run. Exactly one exists per processed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertionResult {
    pub query: QueryId,
    pub disposition: Disposition,
    /// Edge that received the query, as it was when the query was inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_edge: Option<Edge>,
    /// The new leaf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Node the new leaf hangs from (an existing node or a new split node).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_length: Option<f64>,
    /// Final score of the selected candidate, if one was selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl InsertionResult {
    /// Result for a query that was not inserted.
    pub fn unplaced(query: QueryId, reason: UnplacedReason, score: Option<f64>) -> Self {
        Self {
            query,
            disposition: Disposition::Unplaced { reason },
            target_edge: None,
            node: None,
            attached_to: None,
            branch_length: None,
            score,
        }
    }
}
