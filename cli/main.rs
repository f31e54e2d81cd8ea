#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, ValueEnum};
use sgcca_sigtest::config::{BatchConfig, InputLayout, Orientation};
use sgcca_sigtest::pipeline::{
    self, BatchReport, ExperimentFailure, StageReport, StatisticsReport,
};
use sgcca_sigtest::progress::{BatchProgressObserver, ConsoleBatchProgress, LogBatchProgress};
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OrientationCli {
    Row,
    Column,
    Auto,
}

impl From<OrientationCli> for Orientation {
    fn from(value: OrientationCli) -> Self {
        match value {
            OrientationCli::Row => Orientation::Row,
            OrientationCli::Column => Orientation::Column,
            OrientationCli::Auto => Orientation::Auto,
        }
    }
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory holding one sub-directory of SGCCA results per experiment
    #[arg(value_name = "RESULTS_DIR")]
    pub results_dir: Option<PathBuf>,

    /// TOML configuration file; command-line flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Experiment label (repeatable). Defaults to every sub-directory with results.
    /// Pass an empty string to treat RESULTS_DIR itself as the experiment.
    #[arg(long = "experiment", value_name = "LABEL")]
    pub experiments: Vec<String>,

    /// Number of permutations per experiment
    #[arg(long, value_name = "N")]
    pub permutations: Option<usize>,

    /// Fixed component count; inferred from the observed vector when absent
    #[arg(long, value_name = "K")]
    pub components: Option<usize>,

    /// Input files start with a header row
    #[arg(long)]
    pub header: bool,

    /// Input files start with a row-label column
    #[arg(long)]
    pub row_labels: bool,

    /// Layout of the statistic vectors in the input files
    #[arg(long, value_enum)]
    pub orientation: Option<OrientationCli>,

    /// File name prefix of the stacked summary tables
    #[arg(long, value_name = "PREFIX")]
    pub output_prefix: Option<String>,

    /// Report directory, relative to RESULTS_DIR unless absolute
    #[arg(long, value_name = "DIR")]
    pub summary_dir: Option<PathBuf>,

    /// Skip the null distribution histograms
    #[arg(long)]
    pub no_histograms: bool,

    /// Number of histogram bins
    #[arg(long, value_name = "N")]
    pub bins: Option<usize>,

    /// Process experiments one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Log per-experiment progress instead of drawing a progress bar
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct FdrArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Stem of a p-value table in the summary directory (repeatable).
    /// Defaults to the criterion and correlation p-value tables.
    #[arg(long = "table", value_name = "STEM")]
    pub tables: Vec<String>,
}

/// One or more experiments failed; the details were already logged.
#[derive(Debug)]
pub struct BatchFailed {
    pub failed: Vec<String>,
}

impl fmt::Display for BatchFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} experiment(s) failed: {}",
            self.failed.len(),
            self.failed.join(", ")
        )
    }
}

impl Error for BatchFailed {}

impl BatchArgs {
    /// Builds the effective configuration: file values first, then flags.
    pub fn to_config(&self) -> Result<BatchConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => BatchConfig::load(path)?,
            None => BatchConfig::default(),
        };
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        if !self.experiments.is_empty() {
            config.experiments = self.experiments.clone();
        }
        if let Some(n) = self.permutations {
            config.permutations = n;
        }
        if self.components.is_some() {
            config.components = self.components;
        }
        for layout in [&mut config.observed_layout, &mut config.permutation_layout] {
            self.apply_layout(layout);
        }
        if let Some(prefix) = &self.output_prefix {
            config.output_prefix = prefix.clone();
        }
        if let Some(dir) = &self.summary_dir {
            config.summary_dir = dir.clone();
        }
        if self.no_histograms {
            config.histograms = false;
        }
        if let Some(bins) = self.bins {
            config.histogram_bins = bins;
        }
        if self.sequential {
            config.parallel = false;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply_layout(&self, layout: &mut InputLayout) {
        if self.header {
            layout.has_header = true;
        }
        if self.row_labels {
            layout.has_row_labels = true;
        }
        if let Some(orientation) = self.orientation {
            layout.orientation = orientation.into();
        }
    }

    fn observer(&self) -> Box<dyn BatchProgressObserver> {
        if self.quiet {
            Box::new(LogBatchProgress::default())
        } else {
            Box::new(ConsoleBatchProgress::default())
        }
    }
}

fn check_failures<'a>(
    failures: impl Iterator<Item = &'a ExperimentFailure>,
) -> Result<(), Box<dyn Error>> {
    let failed: Vec<String> = failures.map(|f| f.experiment.clone()).collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(Box::new(BatchFailed { failed }))
    }
}

fn print_aggregation(report: &StageReport<pipeline::ExperimentAggregation>) {
    for aggregation in &report.succeeded {
        for outcome in &aggregation.outcomes {
            eprintln!(
                "> [{}] {}: {} / {} permutations -> {}",
                aggregation.experiment,
                outcome.kind,
                outcome.report.loaded.len(),
                outcome.report.requested,
                outcome.path.display()
            );
        }
    }
}

fn print_statistics(report: &StatisticsReport) {
    for path in &report.tables {
        eprintln!("> Wrote {}", path.display());
    }
}

pub fn aggregate(args: BatchArgs) -> Result<(), Box<dyn Error>> {
    let config = args.to_config()?;
    let observer = args.observer();
    let report = pipeline::run_aggregation(&config, observer.as_ref())?;
    print_aggregation(&report);
    check_failures(report.failures.iter())
}

pub fn stats(args: BatchArgs) -> Result<(), Box<dyn Error>> {
    let config = args.to_config()?;
    let observer = args.observer();
    let report = pipeline::run_statistics(&config, observer.as_ref())?;
    print_statistics(&report);
    check_failures(report.stage.failures.iter())
}

pub fn fdr(args: FdrArgs) -> Result<(), Box<dyn Error>> {
    let config = args.batch.to_config()?;
    for path in pipeline::run_fdr(&config, &args.tables)? {
        eprintln!("> Wrote {}", path.display());
    }
    Ok(())
}

pub fn run(args: BatchArgs) -> Result<(), Box<dyn Error>> {
    let config = args.to_config()?;
    let observer = args.observer();
    let report: BatchReport = pipeline::run_batch(&config, observer.as_ref())?;
    print_aggregation(&report.aggregation);
    print_statistics(&report.statistics);
    for path in &report.corrected_tables {
        eprintln!("> Wrote {}", path.display());
    }
    check_failures(report.failures())
}
