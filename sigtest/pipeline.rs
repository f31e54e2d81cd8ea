// ========================================================================================
//                                  Batch Orchestration
// ========================================================================================
//
// Drives the stages over every experiment of a batch:
//
//   1. Aggregation: permutation files -> `null_{crit|corr}_total.csv` per experiment.
//   2. Statistics:  observed vector + persisted null table -> summary records,
//                   histograms, per-experiment summaries, and the stacked tables.
//   3. Correction:  stacked p-value tables -> `_fdr_corrected` copies.
//
// Experiments are independent and write only inside their own directories, so stages
// 1 and 2 fan out with rayon. A failing experiment is logged and collected, never
// propagated past its own boundary.

use crate::aggregate::{AggregateError, AggregationOutcome, aggregate_statistic, load_null_table};
use crate::config::{BatchConfig, ConfigError};
use crate::io::{TableError, read_vector, write_labeled_table};
use crate::plot::{HistogramSpec, PlotError, render_histogram};
use crate::progress::{BatchProgressObserver, BatchStage};
use crate::report::{
    ReportError, correct_summary_file, experiment_summary_table, write_stacked_tables,
};
use crate::shared::files::{ExperimentPaths, discover_experiments, summary_table_stem};
use crate::stats::{StatisticSummary, StatsError, summarize};
use crate::types::{StatisticKind, SummaryMetric, ZStatistic, component_label};
use log::{error, info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// A fatal condition confined to one experiment. Every variant names the experiment.
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("[{experiment}] Missing {artifact}: {}", .path.display())]
    MissingArtifact {
        experiment: String,
        artifact: &'static str,
        path: PathBuf,
    },
    #[error("[{experiment}] No data in {artifact}: {}", .path.display())]
    NoData {
        experiment: String,
        artifact: &'static str,
        path: PathBuf,
    },
    #[error(
        "[{experiment}] The {kind} statistic has {found} components, but {configured} were configured."
    )]
    ComponentCount {
        experiment: String,
        kind: StatisticKind,
        configured: usize,
        found: usize,
    },
    #[error(
        "[{experiment}] The criterion has {criterion} components ({}) but the correlation has {correlation} ({}).",
        .criterion_path.display(),
        .correlation_path.display()
    )]
    StatisticLengthMismatch {
        experiment: String,
        criterion_path: PathBuf,
        criterion: usize,
        correlation_path: PathBuf,
        correlation: usize,
    },
    #[error("[{experiment}] Failed to read {artifact} ({}): {source}", .path.display())]
    Table {
        experiment: String,
        artifact: &'static str,
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("[{experiment}] Aggregating the {kind} null distribution failed: {source}")]
    Aggregation {
        experiment: String,
        kind: StatisticKind,
        #[source]
        source: AggregateError,
    },
    #[error("[{experiment}] {kind} statistics failed: {source}")]
    Statistics {
        experiment: String,
        kind: StatisticKind,
        #[source]
        source: StatsError,
    },
    #[error("[{experiment}] {source}")]
    Plot {
        experiment: String,
        #[source]
        source: PlotError,
    },
    #[error("[{experiment}] Failed to write report: {source}")]
    Report {
        experiment: String,
        #[source]
        source: ReportError,
    },
    #[error("[{experiment}] IO error at {}: {source}", .path.display())]
    Io {
        experiment: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExperimentError {
    /// Classifies a read failure of `path`: absent files and empty tables are
    /// structural conditions, anything else is a malformed artifact.
    fn from_table(experiment: &str, artifact: &'static str, path: &Path, error: TableError) -> Self {
        let experiment = experiment.to_string();
        match error {
            TableError::FileNotFound(path) => Self::MissingArtifact {
                experiment,
                artifact,
                path,
            },
            TableError::EmptyTable(path) => Self::NoData {
                experiment,
                artifact,
                path,
            },
            source => Self::Table {
                experiment,
                artifact,
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to list experiments in {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No experiments found in {}.", .0.display())]
    NoExperiments(PathBuf),
    #[error(transparent)]
    Report(#[from] ReportError),
}

#[derive(Debug)]
pub struct ExperimentFailure {
    pub experiment: String,
    pub error: ExperimentError,
}

/// Outcome of one stage: the experiments that succeeded, in batch order, and those
/// that did not.
#[derive(Debug)]
pub struct StageReport<T> {
    pub succeeded: Vec<T>,
    pub failures: Vec<ExperimentFailure>,
}

impl<T> StageReport<T> {
    fn collect(results: Vec<(String, Result<T, ExperimentError>)>) -> Self {
        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        for (experiment, result) in results {
            match result {
                Ok(value) => succeeded.push(value),
                Err(error) => failures.push(ExperimentFailure { experiment, error }),
            }
        }
        Self {
            succeeded,
            failures,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct ExperimentAggregation {
    pub experiment: String,
    pub outcomes: Vec<AggregationOutcome>,
}

#[derive(Debug)]
pub struct ExperimentAnalysis {
    pub experiment: String,
    pub summaries: Vec<StatisticSummary>,
}

impl ExperimentAnalysis {
    pub fn summary(&self, kind: StatisticKind) -> Option<&StatisticSummary> {
        self.summaries.iter().find(|summary| summary.kind == kind)
    }
}

#[derive(Debug)]
pub struct StatisticsReport {
    pub stage: StageReport<ExperimentAnalysis>,
    /// Stacked tables written for the successful experiments.
    pub tables: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub aggregation: StageReport<ExperimentAggregation>,
    pub statistics: StatisticsReport,
    pub corrected_tables: Vec<PathBuf>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &ExperimentFailure> {
        self.aggregation
            .failures
            .iter()
            .chain(&self.statistics.stage.failures)
    }

    pub fn is_success(&self) -> bool {
        self.aggregation.is_success() && self.statistics.stage.is_success()
    }
}

/// The configured experiment labels, or the discovered ones when none are configured.
pub fn resolve_experiments(config: &BatchConfig) -> Result<Vec<String>, PipelineError> {
    config.validate()?;
    if !config.experiments.is_empty() {
        return Ok(config.experiments.clone());
    }
    let labels = discover_experiments(&config.results_dir, &config.summary_root()).map_err(
        |source| PipelineError::Discovery {
            path: config.results_dir.clone(),
            source,
        },
    )?;
    if labels.is_empty() {
        return Err(PipelineError::NoExperiments(config.results_dir.clone()));
    }
    info!("Discovered {} experiment(s): {}", labels.len(), labels.join(", "));
    Ok(labels)
}

fn read_observed(
    config: &BatchConfig,
    paths: &ExperimentPaths,
    kind: StatisticKind,
) -> Result<Vec<f64>, ExperimentError> {
    let path = paths.observed(kind);
    let observed = read_vector(&path, &config.observed_layout)
        .map_err(|e| ExperimentError::from_table(&paths.label, "observed statistic", &path, e))?;
    match config.components {
        Some(configured) if configured != observed.len() => Err(ExperimentError::ComponentCount {
            experiment: paths.label.clone(),
            kind,
            configured,
            found: observed.len(),
        }),
        _ => Ok(observed),
    }
}

/// Both observed vectors of an experiment, in [`StatisticKind::ALL`] order. The
/// criterion and the correlation must describe the same components.
fn read_observed_pair(
    config: &BatchConfig,
    paths: &ExperimentPaths,
) -> Result<[(StatisticKind, Vec<f64>); 2], ExperimentError> {
    let criterion = read_observed(config, paths, StatisticKind::Criterion)?;
    let correlation = read_observed(config, paths, StatisticKind::Correlation)?;
    if criterion.len() != correlation.len() {
        return Err(ExperimentError::StatisticLengthMismatch {
            experiment: paths.label.clone(),
            criterion_path: paths.observed(StatisticKind::Criterion),
            criterion: criterion.len(),
            correlation_path: paths.observed(StatisticKind::Correlation),
            correlation: correlation.len(),
        });
    }
    Ok([
        (StatisticKind::Criterion, criterion),
        (StatisticKind::Correlation, correlation),
    ])
}

/// Loads and persists both null distributions of one experiment.
///
/// The observed vector fixes the component count every permutation must match.
pub fn aggregate_experiment(
    config: &BatchConfig,
    paths: &ExperimentPaths,
) -> Result<ExperimentAggregation, ExperimentError> {
    let mut outcomes = Vec::with_capacity(StatisticKind::ALL.len());
    for (kind, observed) in read_observed_pair(config, paths)? {
        let output = paths.null_table(kind);
        let outcome = aggregate_statistic(
            &paths.data_dir,
            kind,
            &config.permutation_layout,
            config.permutations,
            Some(observed.len()),
            &output,
        )
        .map_err(|source| match source {
            AggregateError::NoData(path) => ExperimentError::NoData {
                experiment: paths.label.clone(),
                artifact: "aggregated null table",
                path,
            },
            source => ExperimentError::Aggregation {
                experiment: paths.label.clone(),
                kind,
                source,
            },
        })?;
        outcomes.push(outcome);
    }
    Ok(ExperimentAggregation {
        experiment: paths.label.clone(),
        outcomes,
    })
}

/// Computes the summary records of one experiment from its persisted null tables and
/// writes its histograms and per-experiment summaries.
pub fn analyze_experiment(
    config: &BatchConfig,
    paths: &ExperimentPaths,
) -> Result<ExperimentAnalysis, ExperimentError> {
    fs::create_dir_all(&paths.report_dir).map_err(|source| ExperimentError::Io {
        experiment: paths.label.clone(),
        path: paths.report_dir.clone(),
        source,
    })?;

    let mut summaries = Vec::with_capacity(StatisticKind::ALL.len());
    for (kind, observed) in read_observed_pair(config, paths)? {
        let null_path = paths.null_table(kind);
        let null = load_null_table(&null_path)
            .map_err(|e| ExperimentError::from_table(&paths.label, "null table", &null_path, e))?;

        let summary = summarize(kind, &observed, &null, config.zero_std_tolerance).map_err(
            |source| ExperimentError::Statistics {
                experiment: paths.label.clone(),
                kind,
                source,
            },
        )?;

        for component in summary.undefined_z_components() {
            let reason = match summary.components[component].z_stat {
                ZStatistic::InsufficientDraws => "fewer than two null draws",
                _ => "zero null variance",
            };
            warn!(
                "[{}] {kind} {}: z-statistic undefined ({reason}).",
                paths.display_name(),
                component_label(component)
            );
        }

        if config.histograms {
            for (j, stats) in summary.components.iter().enumerate() {
                let draws = null.component(j).to_vec();
                let title = format!("{} - {}", component_label(j), paths.display_name());
                let spec = HistogramSpec {
                    title: &title,
                    x_label: kind.axis_label(),
                    draws: &draws,
                    observed: summary.observed[j],
                    p_value: stats.p_value,
                    bins: config.histogram_bins,
                };
                render_histogram(&paths.histogram(j, kind), &spec).map_err(|source| {
                    ExperimentError::Plot {
                        experiment: paths.label.clone(),
                        source,
                    }
                })?;
            }
        }

        let report_error = |source: ReportError| ExperimentError::Report {
            experiment: paths.label.clone(),
            source,
        };
        let table = experiment_summary_table(&summary).map_err(report_error)?;
        write_labeled_table(&paths.experiment_summary(kind), &table)
            .map_err(|e| report_error(ReportError::Table(e)))?;

        summaries.push(summary);
    }

    Ok(ExperimentAnalysis {
        experiment: paths.label.clone(),
        summaries,
    })
}

fn for_each_experiment<T, F>(
    config: &BatchConfig,
    labels: &[String],
    stage: BatchStage,
    observer: &dyn BatchProgressObserver,
    work: F,
) -> StageReport<T>
where
    T: Send,
    F: Fn(&ExperimentPaths) -> Result<T, ExperimentError> + Sync,
{
    observer.on_stage_start(stage, labels.len());
    let completed = AtomicUsize::new(0);
    let run_one = |label: &String| {
        let paths = ExperimentPaths::new(config, label);
        let result = work(&paths);
        if let Err(e) = &result {
            error!("{e}");
        }
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        observer.on_experiment_done(stage, &paths.display_name(), done);
        (label.clone(), result)
    };

    let results: Vec<_> = if config.parallel {
        labels.par_iter().map(&run_one).collect()
    } else {
        labels.iter().map(&run_one).collect()
    };
    observer.on_stage_finish(stage);
    StageReport::collect(results)
}

fn aggregate_labels(
    config: &BatchConfig,
    labels: &[String],
    observer: &dyn BatchProgressObserver,
) -> StageReport<ExperimentAggregation> {
    for_each_experiment(config, labels, BatchStage::Aggregation, observer, |paths| {
        aggregate_experiment(config, paths)
    })
}

fn analyze_labels(
    config: &BatchConfig,
    labels: &[String],
    observer: &dyn BatchProgressObserver,
) -> Result<StatisticsReport, PipelineError> {
    let stage = for_each_experiment(config, labels, BatchStage::Statistics, observer, |paths| {
        analyze_experiment(config, paths)
    });

    let mut tables = Vec::new();
    if !stage.succeeded.is_empty() {
        let root = config.summary_root();
        for kind in StatisticKind::ALL {
            let rows: Vec<(&str, &StatisticSummary)> = stage
                .succeeded
                .iter()
                .filter_map(|analysis| {
                    analysis
                        .summary(kind)
                        .map(|summary| (analysis.experiment.as_str(), summary))
                })
                .collect();
            tables.extend(write_stacked_tables(
                &root,
                &config.output_prefix,
                kind,
                &rows,
            )?);
        }
    } else {
        warn!("No experiment completed the statistics stage; stacked tables were not written.");
    }
    Ok(StatisticsReport { stage, tables })
}

/// Stage 1 over every experiment of the batch.
pub fn run_aggregation(
    config: &BatchConfig,
    observer: &dyn BatchProgressObserver,
) -> Result<StageReport<ExperimentAggregation>, PipelineError> {
    let labels = resolve_experiments(config)?;
    Ok(aggregate_labels(config, &labels, observer))
}

/// Stage 2 over every experiment of the batch, reading persisted null tables.
pub fn run_statistics(
    config: &BatchConfig,
    observer: &dyn BatchProgressObserver,
) -> Result<StatisticsReport, PipelineError> {
    let labels = resolve_experiments(config)?;
    analyze_labels(config, &labels, observer)
}

/// The p-value table stems corrected by default: one per statistic.
pub fn default_fdr_stems(config: &BatchConfig) -> Vec<String> {
    StatisticKind::ALL
        .iter()
        .map(|&kind| summary_table_stem(&config.output_prefix, kind, SummaryMetric::PValue))
        .collect()
}

/// Stage 3: corrects each named p-value table in the summary directory.
pub fn run_fdr(config: &BatchConfig, stems: &[String]) -> Result<Vec<PathBuf>, PipelineError> {
    config.validate()?;
    let root = config.summary_root();
    let stems = if stems.is_empty() {
        default_fdr_stems(config)
    } else {
        stems.to_vec()
    };
    let mut written = Vec::with_capacity(stems.len());
    for stem in &stems {
        written.push(correct_summary_file(&root, stem)?);
    }
    Ok(written)
}

/// All stages in order. Experiments failing aggregation are not analyzed, and
/// correction runs only when stacked tables were written.
pub fn run_batch(
    config: &BatchConfig,
    observer: &dyn BatchProgressObserver,
) -> Result<BatchReport, PipelineError> {
    let labels = resolve_experiments(config)?;
    let aggregation = aggregate_labels(config, &labels, observer);

    let aggregated: Vec<String> = aggregation
        .succeeded
        .iter()
        .map(|a| a.experiment.clone())
        .collect();
    let statistics = analyze_labels(config, &aggregated, observer)?;

    let corrected_tables = if statistics.tables.is_empty() {
        Vec::new()
    } else {
        run_fdr(config, &[])?
    };

    let report = BatchReport {
        aggregation,
        statistics,
        corrected_tables,
    };
    info!(
        "Batch finished: {} of {} experiment(s) fully processed, {} failed.",
        report.statistics.stage.succeeded.len(),
        labels.len(),
        report.failures().count()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopBatchProgress;
    use crate::shared::files::{observed_file_name, permutation_file_name};
    use tempfile::tempdir;

    fn write_experiment(dir: &Path, observed: &[f64], null: &[Vec<f64>]) {
        fs::create_dir_all(dir).unwrap();
        let column = |values: &[f64]| values.iter().map(|v| format!("{v}\n")).collect::<String>();
        for kind in StatisticKind::ALL {
            fs::write(dir.join(observed_file_name(kind)), column(observed)).unwrap();
            for (i, row) in null.iter().enumerate() {
                fs::write(dir.join(permutation_file_name(i + 1, kind)), column(row)).unwrap();
            }
        }
    }

    #[test]
    fn missing_observed_file_names_experiment_and_artifact() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("broken")).unwrap();
        let config = BatchConfig::new(root.path());
        let paths = ExperimentPaths::new(&config, "broken");

        match aggregate_experiment(&config, &paths) {
            Err(ExperimentError::MissingArtifact {
                experiment,
                artifact,
                path,
            }) => {
                assert_eq!(experiment, "broken");
                assert_eq!(artifact, "observed statistic");
                assert!(path.ends_with("broken/original_crit.csv"));
            }
            other => panic!("Expected MissingArtifact, got {other:?}"),
        }
    }

    #[test]
    fn no_permutations_is_a_no_data_failure() {
        let root = tempdir().unwrap();
        write_experiment(&root.path().join("empty"), &[0.5], &[]);
        let config = BatchConfig::new(root.path());
        let paths = ExperimentPaths::new(&config, "empty");

        assert!(matches!(
            aggregate_experiment(&config, &paths),
            Err(ExperimentError::NoData { .. })
        ));
    }

    #[test]
    fn configured_component_count_is_checked() {
        let root = tempdir().unwrap();
        write_experiment(&root.path().join("exp"), &[0.5, 0.3], &[vec![0.6, 0.2]]);
        let mut config = BatchConfig::new(root.path());
        config.components = Some(3);
        let paths = ExperimentPaths::new(&config, "exp");

        assert!(matches!(
            aggregate_experiment(&config, &paths),
            Err(ExperimentError::ComponentCount {
                configured: 3,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn criterion_and_correlation_must_agree_on_components() {
        let root = tempdir().unwrap();
        let dir = root.path().join("lopsided");
        write_experiment(&dir, &[0.5, 0.4, 0.3], &[vec![0.1, 0.2, 0.3]]);
        fs::write(
            dir.join(observed_file_name(StatisticKind::Criterion)),
            "0.9\n0.8\n0.7\n0.6\n0.5\n",
        )
        .unwrap();
        let config = BatchConfig::new(root.path());
        let paths = ExperimentPaths::new(&config, "lopsided");

        for result in [
            aggregate_experiment(&config, &paths).map(|_| ()),
            analyze_experiment(&config, &paths).map(|_| ()),
        ] {
            match result {
                Err(ExperimentError::StatisticLengthMismatch {
                    experiment,
                    criterion_path,
                    criterion,
                    correlation_path,
                    correlation,
                }) => {
                    assert_eq!(experiment, "lopsided");
                    assert_eq!((criterion, correlation), (5, 3));
                    assert!(criterion_path.ends_with("lopsided/original_crit.csv"));
                    assert!(correlation_path.ends_with("lopsided/original_corr.csv"));
                }
                other => panic!("Expected StatisticLengthMismatch, got {other:?}"),
            }
        }
        assert!(!dir.join("null_crit_total.csv").exists());
    }

    #[test]
    fn batch_isolates_failing_experiments() {
        let root = tempdir().unwrap();
        let null = vec![vec![0.6, 0.2], vec![0.4, 0.5], vec![0.7, 0.1]];
        write_experiment(&root.path().join("good"), &[0.5, 0.3], &null);
        fs::create_dir_all(root.path().join("bad")).unwrap();

        let mut config = BatchConfig::new(root.path());
        config.experiments = vec!["good".into(), "bad".into()];
        config.permutations = 3;
        config.histograms = false;
        config.parallel = false;

        let report = run_batch(&config, &NoopBatchProgress).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.aggregation.failures.len(), 1);
        assert_eq!(report.aggregation.failures[0].experiment, "bad");
        assert_eq!(report.statistics.stage.succeeded.len(), 1);
        assert_eq!(report.statistics.tables.len(), 8);
        assert_eq!(report.corrected_tables.len(), 2);

        let analysis = &report.statistics.stage.succeeded[0];
        let crit = analysis.summary(StatisticKind::Criterion).unwrap();
        assert_eq!(crit.p_values(), vec![2.0 / 3.0, 1.0 / 3.0]);
    }

    #[test]
    fn duplicate_experiments_stop_the_batch_before_any_work() {
        let root = tempdir().unwrap();
        write_experiment(&root.path().join("exp"), &[0.5], &[vec![0.4]]);
        let mut config = BatchConfig::new(root.path());
        config.experiments = vec!["exp".into(), "exp".into()];
        config.permutations = 1;

        assert!(matches!(
            run_batch(&config, &NoopBatchProgress),
            Err(PipelineError::Config(ConfigError::DuplicateExperiment(_)))
        ));
        assert!(!root.path().join("exp/null_crit_total.csv").exists());
    }

    #[test]
    fn flat_results_directory_runs_as_one_experiment() {
        let root = tempdir().unwrap();
        let null = vec![vec![0.6, 0.2], vec![0.4, 0.5], vec![0.7, 0.1]];
        write_experiment(root.path(), &[0.5, 0.3], &null);
        let mut config = BatchConfig::new(root.path());
        config.permutations = 3;
        config.histograms = false;

        let report = run_batch(&config, &NoopBatchProgress).unwrap();
        assert!(report.is_success());
        assert_eq!(report.statistics.stage.succeeded.len(), 1);
        assert!(root.path().join("null_crit_total.csv").is_file());
        let summary = root.path().join("perm_summary");
        assert!(summary.join("crit_perm_result_summary.csv").is_file());
        assert!(summary.join("2block_SGCCA_perm_res_corr_fdr_corrected.csv").is_file());
    }

    #[test]
    fn discovery_failure_without_experiments() {
        let root = tempdir().unwrap();
        let config = BatchConfig::new(root.path());
        assert!(matches!(
            resolve_experiments(&config),
            Err(PipelineError::NoExperiments(_))
        ));
    }
}
