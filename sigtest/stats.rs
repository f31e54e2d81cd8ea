//! # Empirical Statistics Engine
//!
//! Compares an observed SGCCA statistic vector against its permutation null, one
//! component at a time. The test is one-sided: the p-value is the share of null draws
//! that *strictly exceed* the observed value.

use crate::types::{ComponentStats, NullTable, StatisticKind, ZStatistic};
use ndarray::ArrayView1;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StatsError {
    #[error("The null table has no permutations.")]
    EmptyNullTable,
    #[error("The observed statistic vector is empty.")]
    EmptyObserved,
    #[error(
        "The observed vector has {observed} components but the null table has {null} columns."
    )]
    DimensionMismatch { observed: usize, null: usize },
}

/// Engine output for one statistic of one experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticSummary {
    pub kind: StatisticKind,
    pub observed: Vec<f64>,
    pub n_permutations: usize,
    pub components: Vec<ComponentStats>,
}

impl StatisticSummary {
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn p_values(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.p_value).collect()
    }

    /// Zero-based indices of components whose z-statistic is undefined.
    pub fn undefined_z_components(&self) -> Vec<usize> {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.z_stat.is_defined())
            .map(|(index, _)| index)
            .collect()
    }
}

/// Share of `null` draws strictly greater than `observed`. `None` for an empty null.
pub fn empirical_p_value(observed: f64, null: ArrayView1<f64>) -> Option<f64> {
    if null.is_empty() {
        return None;
    }
    let exceeding = null.iter().filter(|&&draw| observed < draw).count();
    Some(exceeding as f64 / null.len() as f64)
}

/// Sample mean and sample (ddof = 1) standard deviation of one null column.
/// The standard deviation is `None` with fewer than two draws.
pub fn null_moments(null: ArrayView1<f64>) -> Option<(f64, Option<f64>)> {
    let mean = null.mean()?;
    let std = (null.len() >= 2).then(|| null.std(1.0));
    Some((mean, std))
}

/// `(observed - mean) / std`, unless the null is degenerate.
///
/// A standard deviation at or below `tolerance * max(1, |mean|)` counts as zero.
pub fn z_statistic(observed: f64, mean: f64, std: Option<f64>, tolerance: f64) -> ZStatistic {
    match std {
        None => ZStatistic::InsufficientDraws,
        Some(std) if !std.is_finite() || std <= tolerance * mean.abs().max(1.0) => {
            ZStatistic::ZeroVariance
        }
        Some(std) => ZStatistic::Defined((observed - mean) / std),
    }
}

/// Computes the summary record of every component.
pub fn summarize(
    kind: StatisticKind,
    observed: &[f64],
    null: &NullTable,
    tolerance: f64,
) -> Result<StatisticSummary, StatsError> {
    if observed.is_empty() {
        return Err(StatsError::EmptyObserved);
    }
    if null.is_empty() {
        return Err(StatsError::EmptyNullTable);
    }
    if observed.len() != null.n_components() {
        return Err(StatsError::DimensionMismatch {
            observed: observed.len(),
            null: null.n_components(),
        });
    }

    let mut components = Vec::with_capacity(observed.len());
    for (index, &value) in observed.iter().enumerate() {
        let column = null.component(index);
        let p_value = empirical_p_value(value, column).ok_or(StatsError::EmptyNullTable)?;
        let (null_mean, null_std) = null_moments(column).ok_or(StatsError::EmptyNullTable)?;
        components.push(ComponentStats {
            p_value,
            null_mean,
            null_std,
            z_stat: z_statistic(value, null_mean, null_std, tolerance),
        });
    }

    Ok(StatisticSummary {
        kind,
        observed: observed.to_vec(),
        n_permutations: null.n_permutations(),
        components,
    })
}
