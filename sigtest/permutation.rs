//! # Permutation Loader
//!
//! Reads the per-permutation statistic vectors of one experiment and stacks them into
//! a [`NullTable`]. Permutation runs fail upstream from time to time, so a missing
//! file is an expected outcome: every index yields an explicit
//! [`PermutationAttempt`], and the gaps are collected in a [`LoadReport`] instead of
//! being swallowed. A vector of the wrong length is a different matter; it means the
//! files of one experiment disagree about the component count, and loading stops.

use crate::config::InputLayout;
use crate::io::{TableError, read_vector};
use crate::shared::files::{permutation_file_name, permutation_row_label};
use crate::types::{NullTable, StatisticKind};
use itertools::Itertools;
use log::{info, warn};
use ndarray::Array2;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PermutationError {
    #[error(
        "Permutation {index} ({}) has {found} components, but {expected} were expected.",
        .path.display()
    )]
    ComponentMismatch {
        index: usize,
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("Failed to read permutation {index} ({}): {source}", .path.display())]
    Unreadable {
        index: usize,
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("Failed to inspect permutation {index} ({}): {source}", .path.display())]
    Io {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to assemble the null table: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Why a permutation index contributed no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Missing(PathBuf),
    /// The file exists but is zero bytes long (an interrupted upstream run).
    Empty(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "file missing: {}", path.display()),
            Self::Empty(path) => write!(f, "file empty: {}", path.display()),
        }
    }
}

/// The outcome of trying to load one permutation index.
#[derive(Debug, Clone, PartialEq)]
pub enum PermutationAttempt {
    Loaded { index: usize, values: Vec<f64> },
    Skipped { index: usize, reason: SkipReason },
}

/// Completeness summary of one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub requested: usize,
    pub loaded: Vec<usize>,
    pub skipped: Vec<(usize, SkipReason)>,
}

impl LoadReport {
    pub fn missing_indices(&self) -> Vec<usize> {
        self.skipped.iter().map(|(index, _)| *index).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PermutationLoad {
    pub table: NullTable,
    pub report: LoadReport,
}

/// Loader for the permutation files of one statistic in one experiment directory.
#[derive(Debug, Clone, Copy)]
pub struct PermutationLoader<'a> {
    directory: &'a Path,
    kind: StatisticKind,
    layout: &'a InputLayout,
}

impl<'a> PermutationLoader<'a> {
    pub fn new(directory: &'a Path, kind: StatisticKind, layout: &'a InputLayout) -> Self {
        Self {
            directory,
            kind,
            layout,
        }
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.directory.join(permutation_file_name(index, self.kind))
    }

    /// Tries to read permutation `index`. Only a missing or zero-length file is
    /// skippable; a present but malformed file is an error.
    pub fn attempt(&self, index: usize) -> Result<PermutationAttempt, PermutationError> {
        let path = self.path_for(index);
        if !path.is_file() {
            return Ok(PermutationAttempt::Skipped {
                index,
                reason: SkipReason::Missing(path),
            });
        }
        let metadata = fs::metadata(&path).map_err(|source| PermutationError::Io {
            index,
            path: path.clone(),
            source,
        })?;
        if metadata.len() == 0 {
            return Ok(PermutationAttempt::Skipped {
                index,
                reason: SkipReason::Empty(path),
            });
        }

        let values = read_vector(&path, self.layout)
            .map_err(|source| PermutationError::Unreadable { index, path, source })?;
        Ok(PermutationAttempt::Loaded { index, values })
    }

    /// Loads permutations `1..=count` into a null table.
    ///
    /// The component count is `expected_components` when given, otherwise the length
    /// of the first vector that loads. Every loaded vector must match it.
    pub fn load(
        &self,
        count: usize,
        expected_components: Option<usize>,
    ) -> Result<PermutationLoad, PermutationError> {
        let mut report = LoadReport {
            requested: count,
            ..LoadReport::default()
        };
        let mut width = expected_components;
        let mut labels = Vec::with_capacity(count);
        let mut flat = Vec::new();

        for index in 1..=count {
            match self.attempt(index)? {
                PermutationAttempt::Loaded { index, values } => {
                    let expected = *width.get_or_insert(values.len());
                    if values.len() != expected {
                        return Err(PermutationError::ComponentMismatch {
                            index,
                            path: self.path_for(index),
                            expected,
                            found: values.len(),
                        });
                    }
                    labels.push(permutation_row_label(index));
                    flat.extend(values);
                    report.loaded.push(index);
                }
                PermutationAttempt::Skipped { index, reason } => {
                    warn!("Skipping {} permutation {index}: {reason}", self.kind);
                    report.skipped.push((index, reason));
                }
            }
        }

        if !report.is_complete() {
            info!(
                "{} null distribution in {}: {} of {} permutations loaded, missing [{}].",
                self.kind,
                self.directory.display(),
                report.loaded.len(),
                count,
                report.missing_indices().iter().join(", ")
            );
        }

        let values = Array2::from_shape_vec((labels.len(), width.unwrap_or(0)), flat)?;

        Ok(PermutationLoad {
            table: NullTable { labels, values },
            report,
        })
    }
}
