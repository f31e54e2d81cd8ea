//! # Null Distribution Aggregator
//!
//! Persists an assembled [`NullTable`] so later stages read one file per statistic
//! instead of hundreds of permutation files. The written table is keyed by the
//! permutation label, so every value can be traced back to the run it came from.

use crate::config::InputLayout;
use crate::io::{LabeledTable, TableError, read_labeled_table, write_labeled_table};
use crate::permutation::{LoadReport, PermutationError, PermutationLoader};
use crate::shared::files::NULL_TABLE_ROW_KEY;
use crate::types::{NullTable, StatisticKind, component_labels};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error(transparent)]
    Permutation(#[from] PermutationError),
    #[error("Failed to write null table: {0}")]
    Table(#[from] TableError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No permutation produced data; refusing to write an empty null table to {}.", .0.display())]
    NoData(PathBuf),
}

/// What one aggregation produced for one statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOutcome {
    pub kind: StatisticKind,
    pub path: PathBuf,
    pub n_components: usize,
    pub report: LoadReport,
}

/// Converts a null table to its on-disk form with `"{j}_comp"` column labels.
pub fn null_table_to_labeled(table: &NullTable) -> Result<LabeledTable, TableError> {
    LabeledTable::new(
        NULL_TABLE_ROW_KEY,
        table.labels.clone(),
        component_labels(table.n_components()),
        table.values.clone(),
    )
}

/// Writes `table` to `path`, overwriting whatever was there.
pub fn persist_null_table(table: &NullTable, path: &Path) -> Result<(), AggregateError> {
    if table.is_empty() {
        return Err(AggregateError::NoData(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_labeled_table(path, &null_table_to_labeled(table)?)?;
    Ok(())
}

/// Reads a persisted null table back. Columns are taken positionally.
pub fn load_null_table(path: &Path) -> Result<NullTable, TableError> {
    let table = read_labeled_table(path)?;
    Ok(NullTable {
        labels: table.row_labels,
        values: table.values,
    })
}

/// Loads permutations `1..=count` from `directory` and persists them to `output`.
pub fn aggregate_statistic(
    directory: &Path,
    kind: StatisticKind,
    layout: &InputLayout,
    count: usize,
    expected_components: Option<usize>,
    output: &Path,
) -> Result<AggregationOutcome, AggregateError> {
    let loader = PermutationLoader::new(directory, kind, layout);
    let load = loader.load(count, expected_components)?;
    persist_null_table(&load.table, output)?;
    info!(
        "Wrote {kind} null table ({} permutations x {} components) to {}",
        load.table.n_permutations(),
        load.table.n_components(),
        output.display()
    );
    Ok(AggregationOutcome {
        kind,
        path: output.to_path_buf(),
        n_components: load.table.n_components(),
        report: load.report,
    })
}
