//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use insertster_core::{Combine, Pipeline, PlacementReport, ProgressReporter, StrategyRegistry};
use insertster_queries::{ParserRegistry, load_catalog};
use insertster_report::{InputFile, ReportConfig, write_report};
use insertster_shared::{AppConfig, InsertionResult, PlacementConfig, init_config, load_config};
use insertster_tree::load_tree;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// insertster: phylogenetic placement of query sequences.
#[derive(Parser)]
#[command(
    name = "insertster",
    version,
    about = "Place query sequences onto a reference tree from alignment or search hits.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Place queries onto a reference tree.
    Place(PlaceArgs),

    /// List the registered parsers and strategies.
    List {
        /// Which registry to list.
        #[arg(value_enum)]
        what: ListKind,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `insertster place`. Unset options fall back to the
/// `[defaults]` section of the config file.
#[derive(Args, Debug)]
pub(crate) struct PlaceArgs {
    /// Reference tree in Newick format.
    #[arg(long)]
    pub tree: PathBuf,

    /// Query results (aligner or search output).
    #[arg(long)]
    pub queries: PathBuf,

    /// Parser for the query results: tsv, blast6, sam.
    #[arg(long)]
    pub query_parser: Option<String>,

    /// Score function (see `insertster list score`).
    #[arg(long)]
    pub score_function: Option<String>,

    /// Hits scoring below this are discarded.
    #[arg(long)]
    pub query_threshold: Option<f64>,

    /// Candidates scoring below this are not inserted.
    #[arg(long)]
    pub insert_threshold: Option<f64>,

    /// Branch length function (see `insertster list length`).
    #[arg(long)]
    pub length_function: Option<String>,

    /// Selection policy (see `insertster list best`).
    #[arg(long)]
    pub best_function: Option<String>,

    /// Propagation combination rule: max, sum, count.
    #[arg(long)]
    pub combine: Option<String>,

    /// Output directory for placements, tree and manifest.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Skip queries whose id already names a node of the tree.
    #[arg(long)]
    pub skip_present: bool,
}

/// Registries that `insertster list` can print.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum ListKind {
    Parsers,
    Score,
    Best,
    Length,
    Combine,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "insertster=info",
        1 => "insertster=debug",
        _ => "insertster=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Place(args) => cmd_place(args),
        Command::List { what } => cmd_list(what),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// place
// ---------------------------------------------------------------------------

fn cmd_place(args: PlaceArgs) -> Result<()> {
    let app_config = load_config()?;
    let placement = placement_config(&app_config, &args);

    // Every name and threshold is checked before any input is read.
    let registry = StrategyRegistry::new();
    let pipeline = Pipeline::new(&registry, placement.clone())?;
    let parsers = ParserRegistry::new();
    let parser = parsers.get(&placement.query_parser)?;

    let started_at = Utc::now();
    let mut tree = load_tree(&args.tree)?;
    let mut catalog = load_catalog(&args.queries, parser)?;

    let excluded = if args.skip_present {
        catalog.exclude(|id| tree.find(id.as_str()).is_some())
    } else {
        Vec::new()
    };
    if !excluded.is_empty() {
        info!(count = excluded.len(), "skipping queries already present in the tree");
    }

    let inputs = vec![
        InputFile::hash("tree", &args.tree)?,
        InputFile::hash("queries", &args.queries)?,
    ];

    info!(
        tree = %args.tree.display(),
        queries = catalog.len(),
        score_function = %placement.score_function,
        "placing queries"
    );

    let progress = CliProgress::new();
    let outcome = pipeline.run(&mut tree, &catalog, &progress);
    progress.clear();
    let report = outcome?;

    let out_dir = args
        .out
        .unwrap_or_else(|| PathBuf::from(&app_config.defaults.output_dir));
    let report_config = ReportConfig {
        out_dir,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        placement,
        inputs,
        excluded: excluded.len(),
        started_at,
    };
    let files = write_report(&report_config, &tree, &report)?;

    print_summary(&report, &files.out_dir, excluded.len());

    if let Some(error) = &report.halted {
        return Err(eyre!(
            "placement halted after {} of {} queries: {error}",
            report.results.len(),
            report.stages.len()
        ));
    }

    Ok(())
}

/// Merge config file defaults with command-line overrides.
fn placement_config(app_config: &AppConfig, args: &PlaceArgs) -> PlacementConfig {
    let mut config = PlacementConfig::from_defaults(app_config);

    if let Some(parser) = &args.query_parser {
        config.query_parser = parser.clone();
    }
    if let Some(score) = &args.score_function {
        config.score_function = score.clone();
    }
    if let Some(threshold) = args.query_threshold {
        config.query_threshold = threshold;
    }
    if let Some(threshold) = args.insert_threshold {
        config.insert_threshold = threshold;
    }
    if args.length_function.is_some() {
        config.length_function = args.length_function.clone();
    }
    if args.best_function.is_some() {
        config.best_function = args.best_function.clone();
    }
    if let Some(combine) = &args.combine {
        config.combine = combine.clone();
    }

    config
}

fn print_summary(report: &PlacementReport, out_dir: &std::path::Path, excluded: usize) {
    println!();
    if report.halted.is_some() {
        println!("  Placement halted.");
    } else if report.cancelled {
        println!("  Placement cancelled.");
    } else {
        println!("  Placement complete.");
    }
    println!("  Placed:    {}", report.placed_count());
    println!("  Unplaced:  {}", report.unplaced_count());
    if excluded > 0 {
        println!("  Skipped:   {excluded} (already in the tree)");
    }
    println!(
        "  Leaves:    {} -> {}",
        report.original_leaves, report.final_leaves
    );
    println!("  Output:    {}", out_dir.display());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn query_inserted(&self, result: &InsertionResult, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Inserting [{current}/{total}] {} ({})",
            result.query, result.disposition
        ));
    }

    fn done(&self, _report: &PlacementReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// list / config
// ---------------------------------------------------------------------------

fn cmd_list(what: ListKind) -> Result<()> {
    let strategies = StrategyRegistry::new();
    let parsers = ParserRegistry::new();

    let rows: Vec<(String, String)> = match what {
        ListKind::Parsers => parsers
            .iter()
            .map(|p| (p.name().to_string(), p.description().to_string()))
            .collect(),
        ListKind::Score => strategies
            .score_functions()
            .map(|f| (f.name().to_string(), f.description().to_string()))
            .collect(),
        ListKind::Best => strategies
            .best_functions()
            .map(|f| (f.name().to_string(), f.description().to_string()))
            .collect(),
        ListKind::Length => strategies
            .length_functions()
            .map(|f| (f.name().to_string(), f.description().to_string()))
            .collect(),
        ListKind::Combine => Combine::ALL
            .iter()
            .map(|c| (c.name().to_string(), c.description().to_string()))
            .collect(),
    };

    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, description) in rows {
        println!("  {name:<width$}  {description}");
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> PlaceArgs {
        let cli = Cli::try_parse_from(args).expect("parse args");
        match cli.command {
            Command::Place(args) => args,
            _ => panic!("expected place"),
        }
    }

    #[test]
    fn flags_override_config_defaults() {
        let mut app = AppConfig::default();
        app.defaults.query_parser = Some("sam".into());
        app.defaults.score_function = Some("hit-count".into());
        app.defaults.query_threshold = 50.0;
        app.defaults.best_function = Some("first-above".into());

        let args = parse(&[
            "insertster",
            "place",
            "--tree",
            "t.nwk",
            "--queries",
            "q.tsv",
            "--score-function",
            "f1-measure",
            "--insert-threshold",
            "0.5",
        ]);
        let config = placement_config(&app, &args);

        assert_eq!(config.query_parser, "sam");
        assert_eq!(config.score_function, "f1-measure");
        assert_eq!(config.query_threshold, 50.0);
        assert_eq!(config.insert_threshold, 0.5);
        assert_eq!(config.best_function.as_deref(), Some("first-above"));
        assert_eq!(config.combine, "max");
    }

    #[test]
    fn missing_parser_fails_validation() {
        let args = parse(&["insertster", "place", "--tree", "t", "--queries", "q", "--score-function", "f1-measure"]);
        let config = placement_config(&AppConfig::default(), &args);
        assert!(config.validate().is_err());
    }

    #[test]
    fn list_kinds_parse() {
        let cli = Cli::try_parse_from(["insertster", "list", "combine"]).expect("parse");
        assert!(matches!(cli.command, Command::List { what: ListKind::Combine }));
        assert!(Cli::try_parse_from(["insertster", "list", "nothing"]).is_err());
    }
}
