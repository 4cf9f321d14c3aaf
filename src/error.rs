// error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failure to read a matrix or annotation table. Always fatal.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Input file not found or unreadable: {path}: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input file {path} is empty ({detail})")]
    Empty { path: PathBuf, detail: String },

    #[error("Input file {path} is malformed at line {line}: {detail}")]
    Malformed {
        path: PathBuf,
        line: u64,
        detail: String,
    },

    #[error("Input file {path} has duplicate row identifier '{row_id}' (line {line})")]
    DuplicateRowId {
        path: PathBuf,
        row_id: String,
        line: u64,
    },

    #[error("Input file {path} has duplicate column '{column}' after header cleaning")]
    DuplicateColumn { path: PathBuf, column: String },

    #[error("Input file {path} lacks required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },
}

/// Failure while filling missing values of a sample column.
#[derive(Debug, Error)]
pub enum ImputationError {
    #[error(
        "Cannot impute column '{column}': 0 observed values among {rows} rows (mean/std undefined)"
    )]
    EmptyColumn { column: String, rows: usize },

    #[error("Cannot build imputation distribution for column '{column}' (loc={loc}, scale={scale}): {detail}")]
    Distribution {
        column: String,
        loc: f64,
        scale: f64,
        detail: String,
    },
}

/// Failure of the 2-component decomposition.
#[derive(Debug, Error)]
pub enum ReductionError {
    #[error("PCA requires at least 2 samples, found {found}")]
    TooFewSamples { found: usize },

    #[error("PCA requires at least 2 features, found {found}")]
    TooFewFeatures { found: usize },

    #[error("PCA input still contains {count} missing or non-finite values (first in sample '{sample}')")]
    NonFinite { count: usize, sample: String },

    #[error("Singular value decomposition of the {rows}x{cols} standardized matrix failed")]
    Decomposition { rows: usize, cols: usize },
}

/// Invalid configuration values, detected before any stage runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validity threshold must lie in (0, 1], got {0}")]
    Threshold(f64),

    #[error("imputation {name} must be finite and non-negative, got {value}")]
    ImputationParam { name: &'static str, value: f64 },

    #[error("invalid annotation field '{input}': expected SOURCE=COLUMN[=LABEL]")]
    AnnotationField { input: String },

    #[error("invalid header cleaning pattern '{pattern}': {detail}")]
    HeaderPattern { pattern: String, detail: String },
}

/// Any failure of a full pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Imputation(#[from] ImputationError),

    #[error(transparent)]
    Reduction(#[from] ReductionError),
}
