//! Surrogate Bench CLI Module
//!
//! Command-line interface for comparing emulators on a CSV dataset and
//! listing the available model families.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::compare::{CompareConfig, CompareEngine};
use crate::cv::FoldStrategyKind;
use crate::data::load_csv;
use crate::registry::default_registry;
use crate::report::{
    accent, dim, format_failures, format_mean_scores, format_search_report, muted, ok,
    render_scatter, strip_ansi,
};
use crate::runner::Workers;
use crate::search::SearchStrategy;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "surrogate-bench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compare surrogate models (emulators) of a simulation with cross-validation")]
#[command(long_about = None)]
pub struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cross-validate emulators on a dataset and report their scores
    Compare(CompareArgs),

    /// List the available model families
    Models,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Input data file (CSV with a header row)
    #[arg(short, long)]
    pub data: PathBuf,

    /// Target column names, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub targets: Vec<String>,

    /// Feature column names; defaults to every non-target column
    #[arg(short, long, value_delimiter = ',')]
    pub features: Option<Vec<String>>,

    /// Models to compare, long or short names; defaults to the core models
    #[arg(short, long, value_delimiter = ',')]
    pub models: Option<Vec<String>>,

    /// Number of cross-validation folds
    #[arg(long)]
    pub folds: Option<usize>,

    /// Fold strategy (kfold, stratified_kfold)
    #[arg(long)]
    pub fold_strategy: Option<FoldStrategyKind>,

    /// Tune every model first (grid, random, bayes)
    #[arg(long)]
    pub search: Option<SearchStrategy>,

    /// Search iterations for random and bayes search
    #[arg(long)]
    pub n_iter: Option<usize>,

    /// Worker threads, or -1 for every core
    #[arg(short, long, allow_negative_numbers = true)]
    pub jobs: Option<Workers>,

    /// Skip input standardisation
    #[arg(long)]
    pub no_normalise: bool,

    /// Random seed for folds, search and seeded models
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the results store to this JSON file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Draw true-vs-predicted scatter panels for each model's best fold
    #[arg(long)]
    pub plot: bool,
}

impl CompareArgs {
    /// Config file (or defaults) with the command-line flags applied on top
    pub fn to_config(&self) -> anyhow::Result<CompareConfig> {
        let mut config = match &self.config {
            Some(path) => CompareConfig::from_json_file(path)?,
            None => CompareConfig::default(),
        };
        if let Some(folds) = self.folds {
            config.folds = folds;
        }
        if let Some(kind) = self.fold_strategy {
            config.fold_strategy = kind;
        }
        if let Some(strategy) = self.search {
            let iterations = self.n_iter.unwrap_or(config.search_iterations);
            config = config.with_search(strategy, iterations);
        } else if let Some(n_iter) = self.n_iter {
            config.search_iterations = n_iter;
        }
        if let Some(workers) = self.jobs {
            config.workers = workers;
        }
        if self.no_normalise {
            config.normalise = false;
        }
        if let Some(seed) = self.seed {
            config.random_state = Some(seed);
        }
        if let Some(models) = &self.models {
            config.models = Some(models.clone());
        }
        Ok(config)
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn print_settings(config: &CompareConfig, models: &[String]) {
    println!();
    line_box_top();
    line_box_center(&format!("{}", "Surrogate Bench".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_sep();
    line_box(&kv("Folds   ", &format!("{} ({})", config.folds, config.fold_strategy)));
    line_box(&kv("Seed    ", &config.random_state.map(|s| s.to_string()).unwrap_or_else(|| "none".into())));
    line_box(&kv("Workers ", &config.workers.to_string()));
    line_box(&kv("Metrics ", &config.metrics.join(", ")));
    let search = if config.hyperparameter_search {
        format!("{} ({} iterations)", config.search_strategy, config.search_iterations)
    } else {
        "off".to_string()
    };
    line_box(&kv("Search  ", &search));
    line_box_sep();
    for name in models {
        line_box(&format!("{} {}", accent("·"), name));
    }
    line_box_bottom();
}

pub fn cmd_compare(args: &CompareArgs) -> anyhow::Result<()> {
    section("Compare");

    step_run("Loading data");
    let start = Instant::now();
    let dataset = load_csv(&args.data, &args.targets, args.features.as_deref())?;
    step_done(&format!(
        "{} rows × {} features → {} targets in {:?}",
        dataset.n_samples(),
        dataset.n_features(),
        dataset.n_outputs(),
        start.elapsed()
    ));

    let config = args.to_config()?;
    let mut engine = CompareEngine::new(config);
    step_run("Setting up");
    engine.setup(dataset)?;
    step_done(&format!("{} models", engine.model_names().len()));
    print_settings(engine.config(), &engine.model_names());

    println!();
    step_run("Cross-validating");
    let summary = engine.compare()?;
    step_done(&format!("{:.2}s", summary.duration_secs));

    if !engine.search_reports().is_empty() {
        section("Search");
        for report in engine.search_reports() {
            println!("{}", format_search_report(report));
        }
    }

    section("Mean Scores");
    println!("{}", format_mean_scores(&engine.results().mean_scores()));

    if !summary.failures.is_empty() {
        section("Failures");
        println!("{}", format_failures(&summary.failures));
    }
    if summary.cancelled {
        println!();
        println!("  {}", "comparison cancelled, results are partial".yellow());
    }

    if args.plot {
        section("Predictions");
        for panel in engine.plot_predictions(None)? {
            for output in 0..panel.y_true.ncols() {
                println!("{}", render_scatter(&panel, output, 48, 16)?);
                println!();
            }
        }
    }

    if let Some(path) = &args.output {
        engine.results().save_json(path)?;
        println!();
        step_ok(&format!("Results saved → {}", path.display()));
    }

    println!();
    Ok(())
}

/// Subscriber writing to stderr, and also to `log_file` without colours when given
pub fn log_subscriber(log_file: Option<&Path>) -> anyhow::Result<impl tracing::Subscriber + Send + Sync> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "surrogate_bench=info".into());
    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(File::create(path)?)),
        ),
        None => None,
    };
    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer))
}

pub fn cmd_models() -> anyhow::Result<()> {
    section("Models");

    println!("  {:<28} {:<8} {}", muted("Model"), muted("Short"), muted("Core"));
    println!("  {}", dim(&"─".repeat(44)));
    for (long, short, core) in default_registry().listing() {
        let core = if core { ok("yes") } else { dim("no") };
        println!("  {:<28} {:<8} {}", long.white(), short.truecolor(120, 170, 255), core);
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "surrogate-bench",
            "compare",
            "--data",
            "runs.csv",
            "--targets",
            "lift,drag",
            "--models",
            "rf,gp",
            "--jobs",
            "-1",
            "--search",
            "bayes",
            "--n-iter",
            "8",
            "--no-normalise",
        ])
        .unwrap();
        let Commands::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.targets, vec!["lift", "drag"]);

        let config = args.to_config().unwrap();
        assert_eq!(config.workers, Workers::All);
        assert!(config.hyperparameter_search);
        assert_eq!(config.search_strategy, SearchStrategy::Bayes);
        assert_eq!(config.search_iterations, 8);
        assert!(!config.normalise);
        assert_eq!(config.models, Some(vec!["rf".to_string(), "gp".to_string()]));
        assert_eq!(config.folds, 5);
    }

    #[test]
    fn test_bad_search_strategy_is_rejected() {
        let parsed = Cli::try_parse_from([
            "surrogate-bench",
            "compare",
            "--data",
            "runs.csv",
            "--targets",
            "y",
            "--search",
            "annealing",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_log_file_receives_events() {
        let path = std::env::temp_dir().join(format!("surrogate-bench-{}.log", uuid::Uuid::new_v4()));
        let subscriber = log_subscriber(Some(&path)).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "surrogate_bench", folds = 3, "comparison set up");
        });
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(text.contains("comparison set up"), "{text}");
        assert!(!text.contains("\u{1b}["));
    }
}
