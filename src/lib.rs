//! Preprocessing of label-free proteomics abundance matrices.
//!
//! A run loads a protein x sample intensity table (DIA-NN style TSV), cleans
//! acquisition prefixes off the sample headers, summarizes missingness,
//! log-transforms the intensities, joins functional annotations, drops
//! proteins observed in too few samples, fills the remaining gaps from a
//! down-shifted normal distribution and projects the samples onto two
//! principal components.
//!
//! [`pipeline::run`] drives the stages; [`export::Artifact`] writes the results.

pub mod annotation;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod impute;
pub mod loader;
pub mod matrix;
pub mod pipeline;
pub mod presence;
pub mod reduce;
pub mod report;
pub mod transform;

pub use config::{AnnotationField, PipelineConfig};
pub use error::{ConfigError, ImputationError, LoadError, PipelineError, ReductionError};
pub use loader::{AnnotationSource, ColumnCleaner, MatrixSource, TsvAnnotationFile, TsvMatrixFile};
pub use matrix::{AbundanceMatrix, RawMatrix};
pub use pipeline::{run, PipelineOutputs};
