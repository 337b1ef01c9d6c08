//! `manifest.json`: provenance and counts for one placement run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use insertster_core::PlacementReport;
use insertster_shared::{InsertsterError, PlacementConfig, Result};

/// Current schema version for the run manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// An input file with its checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// What the file is (`tree`, `queries`).
    pub role: String,
    pub path: PathBuf,
    pub sha256: String,
}

impl InputFile {
    /// Hash `path` and record it under `role`.
    pub fn hash(role: impl Into<String>, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| InsertsterError::io(path, e))?;
        Ok(Self {
            role: role.into(),
            path: path.to_path_buf(),
            sha256: sha256_hex(&bytes),
        })
    }
}

/// An output file written by this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Placement tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementCounts {
    /// Queries that entered the pipeline.
    pub queries: usize,
    pub placed: usize,
    pub unplaced: usize,
    /// Queries left without a result by a halt or cancellation.
    pub unprocessed: usize,
    /// Queries dropped before the run (already present in the tree).
    pub excluded: usize,
    pub original_leaves: usize,
    pub final_leaves: usize,
}

impl PlacementCounts {
    pub fn from_report(report: &PlacementReport, excluded: usize) -> Self {
        Self {
            queries: report.stages.len(),
            placed: report.placed_count(),
            unplaced: report.unplaced_count(),
            unprocessed: report.stages.len().saturating_sub(report.results.len()),
            excluded,
            original_leaves: report.original_leaves,
            final_leaves: report.final_leaves,
        }
    }
}

/// The `manifest.json` written next to the placement outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Resolved placement configuration.
    pub config: PlacementConfig,
    pub inputs: Vec<InputFile>,
    pub outputs: Vec<OutputFile>,
    pub counts: PlacementCounts,
    pub cancelled: bool,
    /// The structural error that halted insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
