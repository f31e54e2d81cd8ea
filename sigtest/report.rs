//! # Result Reporter
//!
//! Turns per-experiment [`StatisticSummary`] values into the CSV artifacts consumed
//! downstream:
//!
//! - four experiment-indexed tables per statistic, one per [`SummaryMetric`], with
//!   columns `{j}_comp{suffix}`;
//! - a component-indexed summary per experiment and statistic;
//! - Benjamini–Hochberg corrected copies of p-value tables.
//!
//! Undefined cells (a missing standard deviation, an undefined z-statistic) are carried
//! as `NaN` in memory and written as empty fields.

use crate::fdr::{FdrError, benjamini_hochberg, correct_table};
use crate::io::{LabeledTable, TableError, read_labeled_table, write_labeled_table};
use crate::shared::files::{
    COMPONENT_ROW_KEY, SUMMARY_ROW_KEY, csv_file_name, fdr_table_stem, summary_table_stem,
};
use crate::stats::StatisticSummary;
use crate::types::{ComponentStats, StatisticKind, SummaryMetric, component_label, component_labels};
use log::info;
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EXPERIMENT_SUMMARY_COLUMNS: [&str; 6] = [
    "original",
    "null_mean",
    "null_std",
    "z_stat",
    "p_uncorrected",
    "p_fdr",
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("FDR correction failed: {0}")]
    Fdr(#[from] FdrError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "Experiment '{experiment}' has {found} components, but the batch table has {expected}."
    )]
    InconsistentComponents {
        experiment: String,
        expected: usize,
        found: usize,
    },
    #[error("No experiment produced results; nothing to report.")]
    NoExperiments,
}

/// The value of `metric` in one summary record, `NaN` where it is undefined.
pub fn metric_value(stats: &ComponentStats, metric: SummaryMetric) -> f64 {
    match metric {
        SummaryMetric::PValue => stats.p_value,
        SummaryMetric::NullMean => stats.null_mean,
        SummaryMetric::NullStd => stats.null_std.unwrap_or(f64::NAN),
        SummaryMetric::ZStat => stats.z_stat.value().unwrap_or(f64::NAN),
    }
}

/// Stacks one metric of every experiment into an experiments x components table.
pub fn stack_metric(
    metric: SummaryMetric,
    results: &[(&str, &StatisticSummary)],
) -> Result<LabeledTable, ReportError> {
    let Some((_, first)) = results.first() else {
        return Err(ReportError::NoExperiments);
    };
    let width = first.n_components();

    let mut values = Array2::zeros((results.len(), width));
    for (row, (experiment, summary)) in results.iter().enumerate() {
        if summary.n_components() != width {
            return Err(ReportError::InconsistentComponents {
                experiment: experiment.to_string(),
                expected: width,
                found: summary.n_components(),
            });
        }
        for (col, stats) in summary.components.iter().enumerate() {
            values[[row, col]] = metric_value(stats, metric);
        }
    }

    let columns = (0..width)
        .map(|j| format!("{}{}", component_label(j), metric.suffix()))
        .collect();
    let labels = results.iter().map(|(label, _)| label.to_string()).collect();
    Ok(LabeledTable::new(SUMMARY_ROW_KEY, labels, columns, values)?)
}

/// Writes the four stacked tables of one statistic into `directory`.
pub fn write_stacked_tables(
    directory: &Path,
    prefix: &str,
    kind: StatisticKind,
    results: &[(&str, &StatisticSummary)],
) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(directory)?;
    let mut written = Vec::with_capacity(SummaryMetric::ALL.len());
    for metric in SummaryMetric::ALL {
        let table = stack_metric(metric, results)?;
        let path = directory.join(csv_file_name(&summary_table_stem(prefix, kind, metric)));
        write_labeled_table(&path, &table)?;
        written.push(path);
    }
    info!(
        "Wrote {} stacked {kind} tables for {} experiment(s) to {}",
        written.len(),
        results.len(),
        directory.display()
    );
    Ok(written)
}

/// Component-indexed summary of one experiment, with an FDR column corrected across
/// that experiment's components only.
pub fn experiment_summary_table(summary: &StatisticSummary) -> Result<LabeledTable, ReportError> {
    let p_fdr = benjamini_hochberg(&summary.p_values())?;
    let mut values = Array2::zeros((summary.n_components(), EXPERIMENT_SUMMARY_COLUMNS.len()));
    for (row, (stats, observed)) in summary
        .components
        .iter()
        .zip(&summary.observed)
        .enumerate()
    {
        let cells = [
            *observed,
            stats.null_mean,
            metric_value(stats, SummaryMetric::NullStd),
            metric_value(stats, SummaryMetric::ZStat),
            stats.p_value,
            p_fdr[row],
        ];
        for (col, cell) in cells.into_iter().enumerate() {
            values[[row, col]] = cell;
        }
    }
    Ok(LabeledTable::new(
        COMPONENT_ROW_KEY,
        component_labels(summary.n_components()),
        EXPERIMENT_SUMMARY_COLUMNS.iter().map(|c| c.to_string()).collect(),
        values,
    )?)
}

/// Reads `{stem}.csv` from `directory` and writes its corrected copy as
/// `{stem}_fdr_corrected.csv`.
pub fn correct_summary_file(directory: &Path, stem: &str) -> Result<PathBuf, ReportError> {
    let table = read_labeled_table(&directory.join(csv_file_name(stem)))?;
    let corrected = correct_table(&table)?;
    let path = directory.join(csv_file_name(&fdr_table_stem(stem)));
    write_labeled_table(&path, &corrected)?;
    info!(
        "FDR-corrected {} p-values from {stem} into {}",
        table.nrows() * table.ncols(),
        path.display()
    );
    Ok(path)
}
