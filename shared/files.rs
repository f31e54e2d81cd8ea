//! Artifact naming and experiment directory resolution.
//!
//! Every file the pipeline reads or writes is named here, so the upstream SGCCA
//! contract and the downstream report contract live in one place.

use crate::config::BatchConfig;
use crate::types::{StatisticKind, SummaryMetric};
use log::{debug, info, warn};
use natord::compare;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const NULL_TABLE_ROW_KEY: &str = "permutation";
pub const SUMMARY_ROW_KEY: &str = "experiment";
pub const COMPONENT_ROW_KEY: &str = "component";

/// `original_{crit|corr}.csv`, written by the upstream SGCCA fit.
pub fn observed_file_name(kind: StatisticKind) -> String {
    format!("original_{}.csv", kind.file_tag())
}

/// `{index}-th_permutation_{crit|corr}.csv`, one per permuted re-fit.
pub fn permutation_file_name(index: usize, kind: StatisticKind) -> String {
    format!("{index}-th_permutation_{}.csv", kind.file_tag())
}

pub fn permutation_row_label(index: usize) -> String {
    format!("{index}-th_null")
}

pub fn null_table_file_name(kind: StatisticKind) -> String {
    format!("null_{}_total.csv", kind.file_tag())
}

/// Stem of a stacked summary table, e.g. `2block_SGCCA_perm_res_crit_null_mean`.
pub fn summary_table_stem(prefix: &str, kind: StatisticKind, metric: SummaryMetric) -> String {
    format!("{prefix}_{}{}", kind.file_tag(), metric.suffix())
}

pub fn fdr_table_stem(stem: &str) -> String {
    format!("{stem}_fdr_corrected")
}

pub fn csv_file_name(stem: &str) -> String {
    format!("{stem}.csv")
}

/// Histogram for a zero-based component index, e.g. `1_crit_hist.svg`.
pub fn histogram_file_name(component: usize, kind: StatisticKind) -> String {
    format!("{}_{}_hist.svg", component + 1, kind.file_tag())
}

pub fn experiment_summary_file_name(kind: StatisticKind) -> String {
    format!("{}_perm_result_summary.csv", kind.file_tag())
}

/// Resolved locations of one experiment's inputs and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentPaths {
    pub label: String,
    /// Holds the upstream vectors and the persisted null tables.
    pub data_dir: PathBuf,
    /// Holds the histograms and per-experiment summaries.
    pub report_dir: PathBuf,
}

impl ExperimentPaths {
    /// An empty label designates the results directory itself.
    pub fn new(config: &BatchConfig, label: &str) -> Self {
        let (data_dir, report_dir) = if label.is_empty() {
            (config.results_dir.clone(), config.summary_root())
        } else {
            (
                config.results_dir.join(label),
                config.summary_root().join(label),
            )
        };
        Self {
            label: label.to_string(),
            data_dir,
            report_dir,
        }
    }

    /// Human-readable name for logs; the empty label reads as the directory.
    pub fn display_name(&self) -> String {
        if self.label.is_empty() {
            self.data_dir.display().to_string()
        } else {
            self.label.clone()
        }
    }

    pub fn observed(&self, kind: StatisticKind) -> PathBuf {
        self.data_dir.join(observed_file_name(kind))
    }

    pub fn null_table(&self, kind: StatisticKind) -> PathBuf {
        self.data_dir.join(null_table_file_name(kind))
    }

    pub fn histogram(&self, component: usize, kind: StatisticKind) -> PathBuf {
        self.report_dir.join(histogram_file_name(component, kind))
    }

    pub fn experiment_summary(&self, kind: StatisticKind) -> PathBuf {
        self.report_dir.join(experiment_summary_file_name(kind))
    }
}

/// Lists sub-directories of `results_dir` that hold an observed criterion file,
/// in natural order (`exp2` before `exp10`). The report directory is skipped.
///
/// When no sub-directory qualifies but `results_dir` itself holds the observed
/// criterion, the single empty label is returned: the directory is one experiment.
pub fn discover_experiments(results_dir: &Path, summary_root: &Path) -> io::Result<Vec<String>> {
    let mut labels = Vec::new();
    for entry in fs::read_dir(results_dir)? {
        let path = entry?.path();
        if !path.is_dir() || path == summary_root {
            continue;
        }
        if !path.join(observed_file_name(StatisticKind::Criterion)).is_file() {
            debug!(
                "Skipping {} during discovery: no observed statistic file.",
                path.display()
            );
            continue;
        }
        match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => labels.push(name.to_string()),
            None => warn!(
                "Skipping experiment directory with a non UTF-8 name: {}",
                path.display()
            ),
        }
    }
    let flat = results_dir.join(observed_file_name(StatisticKind::Criterion));
    if labels.is_empty() && flat.is_file() {
        info!(
            "{} holds the observed statistics directly; treating it as a single experiment.",
            results_dir.display()
        );
        labels.push(String::new());
    }
    labels.sort_by(|a, b| compare(a, b));
    Ok(labels)
}
