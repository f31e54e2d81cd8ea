//! # Benjamini–Hochberg Correction
//!
//! Step-up false discovery rate adjustment. A matrix of p-values is corrected as one
//! family: every cell counts towards `m`, and the adjusted values are put back in
//! the cell they came from.

use crate::io::LabeledTable;
use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FdrError {
    #[error("Cannot correct an empty set of p-values.")]
    Empty,
    #[error("Entry {index} is not a p-value: {value}")]
    InvalidPValue { index: usize, value: f64 },
    #[error("Failed to restore the matrix shape: {0}")]
    Shape(String),
}

/// Benjamini–Hochberg adjusted p-values, in input order.
///
/// `q_(i) = min_{k >= i} (p_(k) * m / k)`, capped at 1.
pub fn benjamini_hochberg(p_values: &[f64]) -> Result<Vec<f64>, FdrError> {
    if p_values.is_empty() {
        return Err(FdrError::Empty);
    }
    if let Some((index, &value)) = p_values
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(FdrError::InvalidPValue { index, value });
    }

    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; m];
    let mut running_min = 1.0_f64;
    for (position, &index) in order.iter().enumerate().rev() {
        let rank = (position + 1) as f64;
        running_min = running_min.min(p_values[index] * m as f64 / rank);
        adjusted[index] = running_min;
    }
    Ok(adjusted)
}

/// Corrects a matrix jointly across all of its cells.
pub fn correct_matrix(p_values: &Array2<f64>) -> Result<Array2<f64>, FdrError> {
    let flat: Vec<f64> = p_values.iter().copied().collect();
    let adjusted = benjamini_hochberg(&flat)?;
    Array2::from_shape_vec(p_values.dim(), adjusted).map_err(|e| FdrError::Shape(e.to_string()))
}

/// Corrects a labelled p-value table, keeping its labels.
pub fn correct_table(table: &LabeledTable) -> Result<LabeledTable, FdrError> {
    Ok(LabeledTable {
        key: table.key.clone(),
        row_labels: table.row_labels.clone(),
        columns: table.columns.clone(),
        values: correct_matrix(&table.values)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn matches_reference_adjustment() {
        // Sorted: 0.01, 0.02, 0.03, 0.04, 0.05 with m = 5 -> all 0.05.
        let adjusted = benjamini_hochberg(&[0.05, 0.01, 0.04, 0.02, 0.03]).unwrap();
        for q in adjusted {
            assert_abs_diff_eq!(q, 0.05, epsilon = 1e-12);
        }

        let adjusted = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.2]).unwrap();
        let expected = [0.04, 0.053_333_333_333_333_33, 0.053_333_333_333_333_33, 0.2];
        for (q, e) in adjusted.iter().zip(expected) {
            assert_abs_diff_eq!(*q, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn identical_small_p_values_stay_valid() {
        let adjusted = benjamini_hochberg(&[0.01; 10]).unwrap();
        for q in &adjusted {
            assert!(*q >= 0.01 - 1e-15 && *q <= 1.0);
            assert_abs_diff_eq!(*q, 0.01, epsilon = 1e-12);
        }
    }

    #[test]
    fn adjusted_values_are_capped_at_one() {
        let adjusted = benjamini_hochberg(&[0.9, 0.95, 1.0]).unwrap();
        assert!(adjusted.iter().all(|q| *q <= 1.0));
        assert_abs_diff_eq!(adjusted[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn matrix_is_corrected_as_one_family() {
        let matrix = array![[0.01, 0.2, 0.04], [0.03, 0.5, 0.002]];
        let corrected = correct_matrix(&matrix).unwrap();
        let flat = benjamini_hochberg(&[0.01, 0.2, 0.04, 0.03, 0.5, 0.002]).unwrap();

        assert_eq!(corrected.dim(), (2, 3));
        for (cell, expected) in corrected.iter().zip(flat) {
            assert_abs_diff_eq!(*cell, expected, epsilon = 1e-15);
        }
    }

    #[test]
    fn table_labels_survive_correction() {
        let table = LabeledTable::new(
            "experiment",
            vec!["EA_sMRI".into(), "EA_dMRI".into()],
            vec!["1_comp".into()],
            array![[0.02], [0.04]],
        )
        .unwrap();
        let corrected = correct_table(&table).unwrap();
        assert_eq!(corrected.row_labels, table.row_labels);
        assert_eq!(corrected.columns, table.columns);
        assert_abs_diff_eq!(corrected.values[[0, 0]], 0.04, epsilon = 1e-12);
    }

    #[test]
    fn rejects_empty_and_out_of_range_input() {
        assert_eq!(benjamini_hochberg(&[]), Err(FdrError::Empty));
        assert_eq!(
            benjamini_hochberg(&[0.1, 1.5]),
            Err(FdrError::InvalidPValue {
                index: 1,
                value: 1.5
            })
        );
        assert!(matches!(
            benjamini_hochberg(&[f64::NAN]),
            Err(FdrError::InvalidPValue { index: 0, .. })
        ));
    }

    #[test]
    fn random_inputs_keep_order_and_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let n = rng.gen_range(1..200);
            let p: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..=1.0)).collect();
            let q = benjamini_hochberg(&p).unwrap();

            let mut pairs: Vec<(f64, f64)> = p.iter().copied().zip(q.iter().copied()).collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            for window in pairs.windows(2) {
                assert!(window[0].1 <= window[1].1 + 1e-15);
            }
            for (raw, adjusted) in p.iter().zip(&q) {
                assert!(*adjusted >= *raw - 1e-15);
                assert!(*adjusted <= 1.0);
            }
        }
    }
}
