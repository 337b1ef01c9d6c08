//! End-to-end placement: decorate → propagate → score → best → insert.
//!
//! The first four stages only read the tree and run per query in parallel.
//! Insertion is the single writer and runs one query at a time.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use insertster_queries::QueryCatalog;
use insertster_shared::{InsertionResult, InsertsterError, PlacementConfig, QueryId, Result};
use insertster_tree::{Tree, TreeStats};

use crate::best::{self, Selection};
use crate::decorate;
use crate::insert;
use crate::propagate;
use crate::registry::{Strategies, StrategyRegistry};
use crate::score;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each query leaves the insertion stage.
    fn query_inserted(&self, result: &InsertionResult, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, _report: &PlacementReport) {}
    /// Polled between insertions; returning true stops the run.
    fn cancelled(&self) -> bool {
        false
    }
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn query_inserted(&self, _result: &InsertionResult, _current: usize, _total: usize) {}
    fn done(&self, _report: &PlacementReport) {}
}

// ---------------------------------------------------------------------------
// Query lifecycle
// ---------------------------------------------------------------------------

/// Where a query is in the pipeline.
///
/// `Unprocessed → Decorated → PropagatedScored → Selected → Inserted | Skipped`.
/// A run that halts or is cancelled leaves later queries at `Selected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Unprocessed,
    Decorated,
    PropagatedScored,
    Selected { placed: bool },
    Inserted,
    Skipped,
}

impl QueryStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Inserted | Self::Skipped)
    }
}

/// Output of a pipeline run.
#[derive(Debug)]
pub struct PlacementReport {
    /// One result per processed query, ascending query id.
    pub results: Vec<InsertionResult>,
    /// Final stage of every query in the catalog.
    pub stages: BTreeMap<QueryId, QueryStage>,
    /// Structural error that stopped insertion, if any.
    pub halted: Option<InsertsterError>,
    pub cancelled: bool,
    pub original_leaves: usize,
    pub final_leaves: usize,
    pub elapsed: Duration,
}

impl PlacementReport {
    pub fn placed_count(&self) -> usize {
        self.results.iter().filter(|r| r.disposition.is_placed()).count()
    }

    pub fn unplaced_count(&self) -> usize {
        self.results.len() - self.placed_count()
    }

    /// Whether every query reached a terminal stage.
    pub fn is_complete(&self) -> bool {
        self.halted.is_none() && !self.cancelled && self.stages.values().all(|s| s.is_terminal())
    }
}

/// Read-only half of a run: what would be inserted, and where.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub selections: Vec<Selection>,
    pub stages: BTreeMap<QueryId, QueryStage>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A validated placement run.
pub struct Pipeline<'r> {
    strategies: Strategies<'r>,
    config: PlacementConfig,
}

impl<'r> Pipeline<'r> {
    /// Resolve every strategy named by `config`. Unknown names and invalid
    /// thresholds fail here, before any traversal.
    pub fn new(registry: &'r StrategyRegistry, config: PlacementConfig) -> Result<Self> {
        let strategies = registry.resolve(&config)?;
        Ok(Self { strategies, config })
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn strategies(&self) -> &Strategies<'r> {
        &self.strategies
    }

    /// Run the read-only stages against `tree`.
    #[instrument(skip_all, fields(queries = catalog.len(), score_function = self.strategies.score.name()))]
    pub fn analyze(
        &self,
        tree: &Tree,
        catalog: &QueryCatalog,
        progress: &dyn ProgressReporter,
    ) -> Result<Analysis> {
        let mut stages: BTreeMap<QueryId, QueryStage> = catalog
            .ids()
            .map(|id| (id.clone(), QueryStage::Unprocessed))
            .collect();

        progress.phase("Decorating tree");
        let decorations = decorate::decorate(tree, catalog, self.config.query_threshold)?;
        advance(&mut stages, QueryStage::Decorated);

        progress.phase("Propagating evidence");
        let propagated = propagate::propagate(tree, &decorations, self.strategies.combine);

        progress.phase("Scoring candidates");
        let stats = TreeStats::compute(tree);
        let candidates = score::score(tree, &stats, &propagated, self.strategies.score);
        advance(&mut stages, QueryStage::PropagatedScored);

        progress.phase("Selecting placements");
        let selections = best::best(
            tree,
            &stats,
            &candidates,
            self.strategies.best,
            self.config.insert_threshold,
        );
        for selection in &selections {
            stages.insert(
                selection.query.clone(),
                QueryStage::Selected {
                    placed: selection.is_placed(),
                },
            );
        }

        Ok(Analysis { selections, stages })
    }

    /// Analyze, then insert every placed query into `tree`.
    ///
    /// Configuration and parse errors return `Err` before the tree is
    /// touched. A structural error during insertion is carried in
    /// [`PlacementReport::halted`] alongside the partial results.
    #[instrument(skip_all, fields(queries = catalog.len(), leaves = tree.tip_count()))]
    pub fn run(
        &self,
        tree: &mut Tree,
        catalog: &QueryCatalog,
        progress: &dyn ProgressReporter,
    ) -> Result<PlacementReport> {
        let start = Instant::now();
        let original_leaves = tree.tip_count();

        info!(
            queries = catalog.len(),
            query_threshold = self.config.query_threshold,
            insert_threshold = self.config.insert_threshold,
            "starting placement"
        );

        let Analysis {
            selections,
            mut stages,
        } = self.analyze(tree, catalog, progress)?;

        progress.phase("Inserting queries");
        let outcome = insert::insert(
            tree,
            &selections,
            self.config.insert_threshold,
            self.strategies.length,
            progress,
        );

        for result in &outcome.results {
            let stage = if result.disposition.is_placed() {
                QueryStage::Inserted
            } else {
                QueryStage::Skipped
            };
            stages.insert(result.query.clone(), stage);
        }

        if let Some(error) = &outcome.halted {
            warn!(%error, processed = outcome.results.len(), "placement halted");
        }

        let report = PlacementReport {
            results: outcome.results,
            stages,
            halted: outcome.halted,
            cancelled: outcome.cancelled,
            original_leaves,
            final_leaves: tree.tip_count(),
            elapsed: start.elapsed(),
        };

        progress.done(&report);

        info!(
            placed = report.placed_count(),
            unplaced = report.unplaced_count(),
            leaves = report.final_leaves,
            elapsed_ms = report.elapsed.as_millis(),
            "placement complete"
        );

        Ok(report)
    }
}

fn advance(stages: &mut BTreeMap<QueryId, QueryStage>, next: QueryStage) {
    for stage in stages.values_mut() {
        *stage = next;
    }
}
