// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use ndarray::{Array2, ArrayView1};
use std::fmt;

/// The two SGCCA statistics that are tested against their permutation nulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatisticKind {
    /// The SGCCA convergence criterion.
    Criterion,
    /// The between-block canonical correlation.
    Correlation,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 2] = [Self::Criterion, Self::Correlation];

    /// The short tag embedded in every artifact file name (`crit` / `corr`).
    pub fn file_tag(self) -> &'static str {
        match self {
            Self::Criterion => "crit",
            Self::Correlation => "corr",
        }
    }

    pub fn axis_label(self) -> &'static str {
        match self {
            Self::Criterion => "SGCCA convergence criteria",
            Self::Correlation => "SGCCA correlation coefficient",
        }
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Criterion => f.write_str("criterion"),
            Self::Correlation => f.write_str("correlation"),
        }
    }
}

/// One metric of the stacked, experiment-indexed summary tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryMetric {
    PValue,
    NullMean,
    NullStd,
    ZStat,
}

impl SummaryMetric {
    pub const ALL: [SummaryMetric; 4] = [
        Self::PValue,
        Self::NullMean,
        Self::NullStd,
        Self::ZStat,
    ];

    /// Suffix appended to both the component column names and the table file stem.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::PValue => "",
            Self::NullMean => "_null_mean",
            Self::NullStd => "_null_std",
            Self::ZStat => "_zstat",
        }
    }
}

/// Column label for a zero-based component index: `"{index + 1}_comp"`.
pub fn component_label(index: usize) -> String {
    format!("{}_comp", index + 1)
}

pub fn component_labels(count: usize) -> Vec<String> {
    (0..count).map(component_label).collect()
}

/// The standardized deviation of an observed value from its null distribution.
///
/// A degenerate null never yields a number: the undefined cases are explicit
/// variants so they cannot leak into later arithmetic as `inf` or `NaN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZStatistic {
    Defined(f64),
    /// The null standard deviation is zero (or within tolerance of zero).
    ZeroVariance,
    /// Fewer than two null draws, so the sample standard deviation is undefined.
    InsufficientDraws,
}

impl ZStatistic {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Defined(z) => Some(z),
            Self::ZeroVariance | Self::InsufficientDraws => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Self::Defined(_))
    }
}

/// The per-component summary record produced by the empirical statistics engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentStats {
    /// Proportion of null draws strictly exceeding the observed value.
    pub p_value: f64,
    pub null_mean: f64,
    /// Sample (ddof = 1) standard deviation; `None` with fewer than two draws.
    pub null_std: Option<f64>,
    pub z_stat: ZStatistic,
}

/// The assembled null distribution of one statistic for one experiment.
///
/// Rows are permutations (labelled `"{i}-th_null"`), columns are components in
/// positional order.
#[derive(Debug, Clone, PartialEq)]
pub struct NullTable {
    pub labels: Vec<String>,
    pub values: Array2<f64>,
}

impl NullTable {
    pub fn n_permutations(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn component(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.column(index)
    }
}
