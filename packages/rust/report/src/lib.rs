//! Run outputs: placements table, placed tree and manifest.
//!
//! Creates the following layout:
//! ```text
//! <out_dir>/
//! ├── placements.tsv
//! ├── placed.nwk
//! └── manifest.json
//! ```
//! Every file is written to a temporary name and renamed into place.

pub mod manifest;
pub mod placements;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use insertster_core::PlacementReport;
use insertster_shared::{InsertsterError, PlacementConfig, Result};
use insertster_tree::{Tree, newick};

pub use manifest::{
    CURRENT_SCHEMA_VERSION, InputFile, OutputFile, PlacementCounts, RunId, RunManifest, sha256_hex,
};

pub const PLACEMENTS_FILE: &str = "placements.tsv";
pub const TREE_FILE: &str = "placed.nwk";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Run metadata that does not come from the pipeline itself.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub out_dir: PathBuf,
    pub tool_version: String,
    pub placement: PlacementConfig,
    pub inputs: Vec<InputFile>,
    /// Queries removed from the catalog before the run.
    pub excluded: usize,
    pub started_at: DateTime<Utc>,
}

/// Files written for one run.
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub out_dir: PathBuf,
    pub manifest: RunManifest,
}

/// Write `placements.tsv`, `placed.nwk` and `manifest.json` into
/// `config.out_dir`, creating it if needed.
#[instrument(skip_all, fields(out_dir = %config.out_dir.display(), results = report.results.len()))]
pub fn write_report(config: &ReportConfig, tree: &Tree, report: &PlacementReport) -> Result<ReportFiles> {
    std::fs::create_dir_all(&config.out_dir).map_err(|e| InsertsterError::io(&config.out_dir, e))?;

    let placements = placements::render(tree, &report.results)?;
    let newick = format!("{}\n", newick::write(tree));

    let outputs = vec![
        write_atomic(&config.out_dir, PLACEMENTS_FILE, placements.as_bytes())?,
        write_atomic(&config.out_dir, TREE_FILE, newick.as_bytes())?,
    ];

    let manifest = RunManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        run_id: RunId::new(),
        tool_version: config.tool_version.clone(),
        started_at: config.started_at,
        finished_at: Utc::now(),
        elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        config: config.placement.clone(),
        inputs: config.inputs.clone(),
        outputs,
        counts: PlacementCounts::from_report(report, config.excluded),
        cancelled: report.cancelled,
        halted: report.halted.as_ref().map(ToString::to_string),
    };

    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| InsertsterError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(&config.out_dir, MANIFEST_FILE, json.as_bytes())?;

    info!(
        run_id = %manifest.run_id,
        placed = manifest.counts.placed,
        unplaced = manifest.counts.unplaced,
        "report written"
    );

    Ok(ReportFiles {
        out_dir: config.out_dir.clone(),
        manifest,
    })
}

/// Write `bytes` to `dir/filename` via a temporary file and rename.
fn write_atomic(dir: &Path, filename: &str, bytes: &[u8]) -> Result<OutputFile> {
    let target = dir.join(filename);
    let temp = dir.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| InsertsterError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| InsertsterError::io(&target, e))?;

    debug!(file = %filename, size = bytes.len(), "wrote output");

    Ok(OutputFile {
        filename: filename.to_string(),
        sha256: sha256_hex(bytes),
        size_bytes: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use insertster_core::{Pipeline, SilentProgress, StrategyRegistry};
    use insertster_queries::QueryCatalog;
    use insertster_shared::{Hit, Query};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("insertster-report-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    fn placement_config() -> PlacementConfig {
        PlacementConfig {
            query_threshold: 0.5,
            insert_threshold: 0.0,
            query_parser: "tsv".into(),
            score_function: "f1-measure".into(),
            best_function: None,
            length_function: None,
            combine: "max".into(),
        }
    }

    fn run_fixture(catalog: &QueryCatalog) -> (Tree, PlacementReport) {
        let mut tree = newick::parse("(A:1,B:1)root;").expect("parse");
        let registry = StrategyRegistry::new();
        let pipeline = Pipeline::new(&registry, placement_config()).expect("pipeline");
        let report = pipeline.run(&mut tree, catalog, &SilentProgress).expect("run");
        (tree, report)
    }

    #[test]
    fn writes_all_outputs() {
        let root = temp_dir();
        let tree_path = root.join("tree.nwk");
        std::fs::write(&tree_path, "(A:1,B:1)root;\n").expect("write tree");

        let catalog = QueryCatalog::from_queries(vec![
            Query::new("Q1", vec![Hit::new("A", 0.9)]),
            Query::new("Q2", vec![Hit::new("B", 0.1)]),
        ])
        .expect("catalog");
        let (tree, report) = run_fixture(&catalog);

        let config = ReportConfig {
            out_dir: root.join("out"),
            tool_version: "0.1.0-test".into(),
            placement: placement_config(),
            inputs: vec![InputFile::hash("tree", &tree_path).expect("hash")],
            excluded: 0,
            started_at: Utc::now(),
        };
        let files = write_report(&config, &tree, &report).expect("write report");

        let out = root.join("out");
        let placements = std::fs::read_to_string(out.join(PLACEMENTS_FILE)).expect("placements");
        assert_eq!(placements.lines().count(), 3);
        assert!(placements.lines().nth(1).expect("row").starts_with("Q1\tplaced"));
        assert!(placements.lines().nth(2).expect("row").starts_with("Q2\tunplaced\tno-evidence"));

        let nwk = std::fs::read_to_string(out.join(TREE_FILE)).expect("tree");
        let placed = newick::parse(&nwk).expect("reparse");
        assert_eq!(placed.tip_count(), 3);
        assert!(placed.find("Q1").is_some());

        let manifest: RunManifest =
            serde_json::from_str(&std::fs::read_to_string(out.join(MANIFEST_FILE)).expect("manifest"))
                .expect("parse manifest");
        assert_eq!(manifest.run_id, files.manifest.run_id);
        assert_eq!(manifest.counts.placed, 1);
        assert_eq!(manifest.counts.unplaced, 1);
        assert_eq!(manifest.counts.final_leaves, 3);
        assert_eq!(manifest.inputs[0].sha256, sha256_hex(b"(A:1,B:1)root;\n"));
        assert_eq!(manifest.outputs.len(), 2);
        assert_eq!(manifest.outputs[0].sha256, sha256_hex(placements.as_bytes()));
        assert!(manifest.halted.is_none());

        // no temporary files left behind
        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn halted_runs_record_the_error() {
        let root = temp_dir();
        let catalog = QueryCatalog::from_queries(vec![Query::new("B", vec![Hit::new("A", 0.9)])])
            .expect("catalog");
        let (tree, report) = run_fixture(&catalog);
        assert!(report.halted.is_some());

        let config = ReportConfig {
            out_dir: root.clone(),
            tool_version: "0.1.0-test".into(),
            placement: placement_config(),
            inputs: Vec::new(),
            excluded: 0,
            started_at: Utc::now(),
        };
        let files = write_report(&config, &tree, &report).expect("write report");

        assert!(files.manifest.halted.as_deref().unwrap_or_default().contains("'B'"));
        assert_eq!(files.manifest.counts.unprocessed, 1);
        assert_eq!(files.manifest.counts.placed, 0);

        let _ = std::fs::remove_dir_all(&root);
    }
}
