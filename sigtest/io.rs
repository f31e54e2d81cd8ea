//! # Tabular Artifact I/O
//!
//! This module is the only place that touches CSV files. Upstream SGCCA runs hand us
//! small statistic vectors whose layout varies between runs; we hand downstream
//! consumers row-keyed tables with deterministic column names.
//!
//! - Vectors are read according to an [`InputLayout`] and validated to be complete,
//!   numeric and finite.
//! - Tables always carry a leading row-key column followed by numeric columns.
//!   Non-finite cells are written as empty fields, never as `inf`/`NaN` text.

use crate::config::{InputLayout, Orientation};
use ndarray::{Array2, ShapeBuilder};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("The file {} contains no data.", .0.display())]
    EmptyTable(PathBuf),
    #[error(
        "Column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in column '{0}'.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error(
        "Cannot infer the orientation of {}: expected a single row or a single column, found {rows} rows x {columns} columns.",
        .path.display()
    )]
    AmbiguousOrientation {
        path: PathBuf,
        rows: usize,
        columns: usize,
    },
    #[error(
        "{} holds {rows} rows x {columns} columns, more than one statistic vector in the configured orientation.",
        .path.display()
    )]
    ExtraData {
        path: PathBuf,
        rows: usize,
        columns: usize,
    },
    #[error("The table {} has a row-key column but no value columns.", .0.display())]
    NoValueColumns(PathBuf),
    #[error("Table shape mismatch: {rows} row labels and {columns} column names for a {shape:?} value matrix.")]
    ShapeMismatch {
        rows: usize,
        columns: usize,
        shape: (usize, usize),
    },
    #[error("Failed to assemble value matrix: {0}")]
    MatrixShape(#[from] ndarray::ShapeError),
}

/// A table with a named row-key column, labelled rows and named numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    pub key: String,
    pub row_labels: Vec<String>,
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl LabeledTable {
    pub fn new(
        key: impl Into<String>,
        row_labels: Vec<String>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, TableError> {
        if values.nrows() != row_labels.len() || values.ncols() != columns.len() {
            return Err(TableError::ShapeMismatch {
                rows: row_labels.len(),
                columns: columns.len(),
                shape: values.dim(),
            });
        }
        Ok(Self {
            key: key.into(),
            row_labels,
            columns,
            values,
        })
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }
}

/// Reads one statistic vector (length K) from `path` according to `layout`.
pub fn read_vector(path: &Path, layout: &InputLayout) -> Result<Vec<f64>, TableError> {
    let mut df = read_frame(path, layout.has_header)?;
    if layout.has_row_labels && df.width() > 0 {
        let label_column = df.get_columns()[0].name().to_string();
        df = df.drop(&label_column)?;
    }
    if df.height() == 0 || df.width() == 0 {
        return Err(TableError::EmptyTable(path.to_path_buf()));
    }

    let orientation = match layout.orientation {
        Orientation::Auto if df.width() == 1 => Orientation::Column,
        Orientation::Auto if df.height() == 1 => Orientation::Row,
        Orientation::Auto => {
            return Err(TableError::AmbiguousOrientation {
                path: path.to_path_buf(),
                rows: df.height(),
                columns: df.width(),
            });
        }
        fixed => fixed,
    };
    let extra = match orientation {
        Orientation::Column => df.width() > 1,
        _ => df.height() > 1,
    };
    if extra {
        return Err(TableError::ExtraData {
            path: path.to_path_buf(),
            rows: df.height(),
            columns: df.width(),
        });
    }

    match orientation {
        Orientation::Column => extract_numeric_column(&df.get_columns()[0]),
        _ => {
            let mut values = Vec::with_capacity(df.width());
            for column in df.get_columns() {
                values.extend(extract_numeric_column(column)?);
            }
            Ok(values)
        }
    }
}

/// Reads a table written by [`write_labeled_table`] (or any CSV with a header whose
/// first column holds row labels). Value columns are taken positionally.
pub fn read_labeled_table(path: &Path) -> Result<LabeledTable, TableError> {
    let df = read_frame(path, true)?;
    if df.width() < 2 {
        return Err(TableError::NoValueColumns(path.to_path_buf()));
    }
    if df.height() == 0 {
        return Err(TableError::EmptyTable(path.to_path_buf()));
    }

    let columns = df.get_columns();
    let key = columns[0].name().to_string();
    let labels_column = columns[0].cast(&DataType::String)?;
    let row_labels: Vec<String> = labels_column
        .str()?
        .into_iter()
        .map(|label| label.unwrap_or_default().to_string())
        .collect();

    let value_columns = &columns[1..];
    let names: Vec<String> = value_columns
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let mut buffer = Vec::with_capacity(df.height() * value_columns.len());
    for column in value_columns {
        buffer.extend(extract_numeric_column(column)?);
    }
    let values = Array2::from_shape_vec((df.height(), value_columns.len()).f(), buffer)?;

    LabeledTable::new(key, row_labels, names, values)
}

/// Writes `table` as a comma-separated file, replacing any existing file.
pub fn write_labeled_table(path: &Path, table: &LabeledTable) -> Result<(), TableError> {
    let mut columns: Vec<Column> = Vec::with_capacity(table.ncols() + 1);
    columns.push(Series::new(table.key.as_str().into(), table.row_labels.clone()).into());
    for (name, values) in table.columns.iter().zip(table.values.columns()) {
        let cells: Vec<Option<f64>> = values
            .iter()
            .map(|&value| value.is_finite().then_some(value))
            .collect();
        columns.push(Series::new(name.as_str().into(), cells).into());
    }
    let mut df = DataFrame::new(columns)?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}

fn read_frame(path: &Path, has_header: bool) -> Result<DataFrame, TableError> {
    if !path.is_file() {
        return Err(TableError::FileNotFound(path.to_path_buf()));
    }
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(has_header)
                .with_parse_options(CsvParseOptions::default().with_separator(b',')),
        )
        .finish()?;
    Ok(df)
}

fn extract_numeric_column(column: &Column) -> Result<Vec<f64>, TableError> {
    let column_name = column.name().to_string();
    if column.null_count() > 0 {
        return Err(TableError::MissingValuesFound(column_name));
    }

    let casted = match column.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(TableError::ColumnWrongType {
                column_name,
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", column.dtype()),
            });
        }
    };

    if casted.null_count() > 0 {
        return Err(TableError::ColumnWrongType {
            column_name,
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        });
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(TableError::NonFiniteValuesFound(column_name));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::fs;
    use tempfile::tempdir;

    fn layout(has_header: bool, has_row_labels: bool, orientation: Orientation) -> InputLayout {
        InputLayout {
            has_header,
            has_row_labels,
            orientation,
        }
    }

    #[test]
    fn reads_headerless_row_vector() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("original_crit.csv");
        fs::write(&path, "0.5,0.3,0.25\n").unwrap();

        let values = read_vector(&path, &InputLayout::default()).unwrap();
        assert_eq!(values, vec![0.5, 0.3, 0.25]);
    }

    #[test]
    fn reads_headerless_column_vector() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1-th_permutation_crit.csv");
        fs::write(&path, "0.6\n0.2\n0.15\n").unwrap();

        let values = read_vector(&path, &layout(false, false, Orientation::Column)).unwrap();
        assert_eq!(values, vec![0.6, 0.2, 0.15]);
    }

    #[test]
    fn reads_r_style_vector_with_header_and_row_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("original_corr.csv");
        fs::write(&path, "\"\",\"x\"\n\"1\",0.81\n\"2\",0.42\n").unwrap();

        let values = read_vector(&path, &layout(true, true, Orientation::Auto)).unwrap();
        assert_eq!(values.len(), 2);
        assert_abs_diff_eq!(values[0], 0.81, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 0.42, epsilon = 1e-12);
    }

    #[test]
    fn row_orientation_rejects_extra_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.csv");
        fs::write(&path, "1.0,2.0\n3.0,4.0\n").unwrap();

        match read_vector(&path, &layout(false, false, Orientation::Row)) {
            Err(TableError::ExtraData { rows, columns, .. }) => {
                assert_eq!((rows, columns), (2, 2));
            }
            other => panic!("Expected ExtraData, got {other:?}"),
        }
    }

    #[test]
    fn column_orientation_rejects_unstripped_row_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("original_corr.csv");
        fs::write(&path, "\"\",\"x\"\n\"1\",0.81\n\"2\",0.42\n").unwrap();

        match read_vector(&path, &layout(true, false, Orientation::Column)) {
            Err(TableError::ExtraData { rows, columns, .. }) => {
                assert_eq!((rows, columns), (2, 2));
            }
            other => panic!("Expected ExtraData, got {other:?}"),
        }
    }

    #[test]
    fn auto_orientation_rejects_matrices() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("matrix.csv");
        fs::write(&path, "1.0,2.0\n3.0,4.0\n").unwrap();

        match read_vector(&path, &InputLayout::default()) {
            Err(TableError::AmbiguousOrientation { rows, columns, .. }) => {
                assert_eq!((rows, columns), (2, 2));
            }
            other => panic!("Expected AmbiguousOrientation, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_reported_by_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        match read_vector(&path, &InputLayout::default()) {
            Err(TableError::FileNotFound(reported)) => assert_eq!(reported, path),
            other => panic!("Expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "0.5\nnot_a_number\n").unwrap();

        let err = read_vector(&path, &layout(false, false, Orientation::Column)).unwrap_err();
        assert!(
            matches!(err, TableError::ColumnWrongType { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn labeled_table_survives_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("null_crit_total.csv");
        let table = LabeledTable::new(
            "permutation",
            vec!["1-th_null".into(), "2-th_null".into(), "3-th_null".into()],
            vec!["1_comp".into(), "2_comp".into()],
            array![[0.6, 0.2], [0.4, 0.5], [0.7, 0.1]],
        )
        .unwrap();

        write_labeled_table(&path, &table).unwrap();
        let restored = read_labeled_table(&path).unwrap();

        assert_eq!(restored.key, "permutation");
        assert_eq!(restored.row_labels, table.row_labels);
        assert_eq!(restored.columns, table.columns);
        for (a, b) in restored.values.iter().zip(table.values.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn non_finite_cells_are_written_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zstat.csv");
        let table = LabeledTable::new(
            "experiment",
            vec!["exp_a".into()],
            vec!["1_comp_zstat".into(), "2_comp_zstat".into()],
            array![[1.25, f64::NAN]],
        )
        .unwrap();

        write_labeled_table(&path, &table).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "experiment,1_comp_zstat,2_comp_zstat");
        assert_eq!(lines[1], "exp_a,1.25,");
        assert!(!text.contains("NaN"));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = LabeledTable::new(
            "experiment",
            vec!["a".into()],
            vec!["1_comp".into()],
            array![[0.1, 0.2]],
        )
        .unwrap_err();
        assert!(matches!(err, TableError::ShapeMismatch { .. }));
    }
}
