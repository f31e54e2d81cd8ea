//! # Batch Configuration
//!
//! Everything a batch run needs is carried in one explicit [`BatchConfig`] value:
//! the results directory, the experiment labels, the permutation count and the
//! layout of the upstream CSV files. It can be deserialized from a TOML file and
//! is then refined by command-line overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PERMUTATIONS: usize = 100;
pub const DEFAULT_HISTOGRAM_BINS: usize = 30;
pub const DEFAULT_OUTPUT_PREFIX: &str = "2block_SGCCA_perm_res";
pub const DEFAULT_SUMMARY_DIR: &str = "perm_summary";
pub const DEFAULT_ZERO_STD_TOLERANCE: f64 = 1e-12;

/// How a statistic vector is laid out inside its CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// The K values are the single row of the file.
    Row,
    /// The K values are a single column of the file.
    Column,
    /// Whichever of the two the file's shape allows.
    #[default]
    Auto,
}

/// Descriptor for the upstream file format, which is not fixed across SGCCA runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputLayout {
    /// The first line holds column names rather than values.
    pub has_header: bool,
    /// The first column holds row names rather than values.
    pub has_row_labels: bool,
    pub orientation: Orientation,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("A results directory must be provided.")]
    MissingResultsDir,
    #[error("The permutation count must be at least 1.")]
    ZeroPermutations,
    #[error("A fixed component count must be at least 1.")]
    ZeroComponents,
    #[error("Histograms need at least one bin.")]
    ZeroHistogramBins,
    #[error("The zero-variance tolerance must be finite and non-negative, got {0}.")]
    InvalidTolerance(f64),
    #[error("Experiment '{0}' is listed more than once.")]
    DuplicateExperiment(String),
}

/// The full configuration surface of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Root directory holding one sub-directory per experiment.
    pub results_dir: PathBuf,
    /// Experiment labels. Empty means "discover them"; a single `""` means the
    /// results directory itself is the experiment directory.
    pub experiments: Vec<String>,
    pub permutations: usize,
    /// Fixed component count. When absent it is inferred from the observed vector.
    pub components: Option<usize>,
    pub observed_layout: InputLayout,
    pub permutation_layout: InputLayout,
    pub output_prefix: String,
    /// Report directory; relative paths are resolved against `results_dir`.
    pub summary_dir: PathBuf,
    pub histograms: bool,
    pub histogram_bins: usize,
    pub parallel: bool,
    pub zero_std_tolerance: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::new(),
            experiments: Vec::new(),
            permutations: DEFAULT_PERMUTATIONS,
            components: None,
            observed_layout: InputLayout::default(),
            permutation_layout: InputLayout::default(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            summary_dir: PathBuf::from(DEFAULT_SUMMARY_DIR),
            histograms: true,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            parallel: true,
            zero_std_tolerance: DEFAULT_ZERO_STD_TOLERANCE,
        }
    }
}

impl BatchConfig {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration from a TOML file. The result is not yet validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.results_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingResultsDir);
        }
        if self.permutations == 0 {
            return Err(ConfigError::ZeroPermutations);
        }
        if self.components == Some(0) {
            return Err(ConfigError::ZeroComponents);
        }
        if self.histogram_bins == 0 {
            return Err(ConfigError::ZeroHistogramBins);
        }
        if !self.zero_std_tolerance.is_finite() || self.zero_std_tolerance < 0.0 {
            return Err(ConfigError::InvalidTolerance(self.zero_std_tolerance));
        }
        let mut seen = HashSet::with_capacity(self.experiments.len());
        for label in &self.experiments {
            if !seen.insert(label.as_str()) {
                return Err(ConfigError::DuplicateExperiment(label.clone()));
            }
        }
        Ok(())
    }

    /// The directory that receives the stacked tables and per-experiment reports.
    pub fn summary_root(&self) -> PathBuf {
        if self.summary_dir.is_absolute() {
            self.summary_dir.clone()
        } else {
            self.results_dir.join(&self.summary_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_reference_batch() {
        let config = BatchConfig::new("/data/results");
        assert_eq!(config.permutations, 100);
        assert_eq!(config.histogram_bins, 30);
        assert_eq!(config.components, None);
        assert_eq!(config.observed_layout.orientation, Orientation::Auto);
        assert_eq!(
            config.summary_root(),
            PathBuf::from("/data/results/perm_summary")
        );
        config.validate().unwrap();
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
results_dir = "/data/3block"
experiments = ["EA_sMRI_BS1000", "EA_dMRI_BS1000"]
components = 5
output_prefix = "3block_SGCCA_perm_res"

[permutation_layout]
has_header = true
has_row_labels = true
orientation = "column"
"#
        )
        .unwrap();

        let config = BatchConfig::load(file.path()).unwrap();
        assert_eq!(config.experiments.len(), 2);
        assert_eq!(config.components, Some(5));
        assert_eq!(config.permutations, 100);
        assert!(config.permutation_layout.has_header);
        assert_eq!(config.permutation_layout.orientation, Orientation::Column);
        assert!(!config.observed_layout.has_header);
    }

    #[test]
    fn rejects_unknown_keys() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "results_dir = \"/x\"\npermutation = 5").unwrap();
        let err = BatchConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError(_)));
    }

    #[test]
    fn repeated_experiment_labels_are_rejected() {
        let config = BatchConfig {
            experiments: vec!["EA_sMRI".into(), "EA_dMRI".into(), "EA_sMRI".into()],
            ..BatchConfig::new("/x")
        };
        match config.validate() {
            Err(ConfigError::DuplicateExperiment(label)) => assert_eq!(label, "EA_sMRI"),
            other => panic!("Expected DuplicateExperiment, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        assert!(matches!(
            BatchConfig::default().validate(),
            Err(ConfigError::MissingResultsDir)
        ));

        let zero_perms = BatchConfig {
            permutations: 0,
            ..BatchConfig::new("/x")
        };
        assert!(matches!(
            zero_perms.validate(),
            Err(ConfigError::ZeroPermutations)
        ));

        let zero_components = BatchConfig {
            components: Some(0),
            ..BatchConfig::new("/x")
        };
        assert!(matches!(
            zero_components.validate(),
            Err(ConfigError::ZeroComponents)
        ));

        let bad_tolerance = BatchConfig {
            zero_std_tolerance: f64::NAN,
            ..BatchConfig::new("/x")
        };
        assert!(matches!(
            bad_tolerance.validate(),
            Err(ConfigError::InvalidTolerance(_))
        ));
    }
}
