// impute.rs
//
// Left-shifted normal imputation: missing abundances are assumed to sit below
// the detection limit, so each column's gaps are drawn from a narrowed normal
// shifted down from the observed distribution.

use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use statrs::statistics::Statistics;

use crate::error::{ConfigError, ImputationError};
use crate::matrix::AbundanceMatrix;

pub const DEFAULT_SHIFT: f64 = 1.5;
pub const DEFAULT_SCALE: f64 = 0.5;

/// What to do with a column that has missing cells but no observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyColumnPolicy {
    #[default]
    Fail,
    /// Leave the column's missing cells in place and log a warning.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImputationParams {
    /// Downshift of the draw mean, in observed standard deviations.
    pub shift: f64,
    /// Width of the draw distribution, as a fraction of the observed standard deviation.
    pub scale: f64,
    pub on_empty_column: EmptyColumnPolicy,
}

impl Default for ImputationParams {
    fn default() -> Self {
        Self {
            shift: DEFAULT_SHIFT,
            scale: DEFAULT_SCALE,
            on_empty_column: EmptyColumnPolicy::Fail,
        }
    }
}

impl ImputationParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("shift", self.shift), ("scale", self.scale)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ImputationParam { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImputationMethod {
    /// Nothing was missing.
    Untouched,
    /// Observed std was zero or undefined; gaps filled with the observed mean.
    ConstantMean,
    ShiftedNormal,
    /// No observed values and the skip policy was active.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnImputation {
    pub sample: String,
    pub observed: usize,
    pub imputed: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1) of the observed values.
    pub std: f64,
    pub method: ImputationMethod,
}

#[derive(Debug, Clone)]
pub struct Imputed {
    pub matrix: AbundanceMatrix,
    /// rows x samples, true where a value was filled in.
    pub imputed_mask: Array2<bool>,
    pub columns: Vec<ColumnImputation>,
}

/// Column-wise imputer over an injected random source.
pub struct Imputer<R: Rng> {
    params: ImputationParams,
    rng: R,
}

impl Imputer<ChaCha8Rng> {
    pub fn seeded(params: ImputationParams, seed: u64) -> Self {
        Self::new(params, ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> Imputer<R> {
    pub fn new(params: ImputationParams, rng: R) -> Self {
        Self { params, rng }
    }

    /// Fill missing cells column by column (left to right, top to bottom).
    /// Observed cells are copied unchanged.
    pub fn impute(&mut self, matrix: &AbundanceMatrix) -> Result<Imputed, ImputationError> {
        let mut out = matrix.clone();
        let imputed_mask = matrix.values.mapv(f64::is_nan);
        let mut columns = Vec::with_capacity(matrix.nsamples());

        for (j, mut column) in out.values.axis_iter_mut(Axis(1)).enumerate() {
            let sample = &matrix.samples[j];
            let observed: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
            let n_missing = column.len() - observed.len();

            if n_missing == 0 {
                columns.push(ColumnImputation {
                    sample: sample.clone(),
                    observed: observed.len(),
                    imputed: 0,
                    mean: observed.iter().mean(),
                    std: observed.iter().std_dev(),
                    method: ImputationMethod::Untouched,
                });
                continue;
            }

            if observed.is_empty() {
                match self.params.on_empty_column {
                    EmptyColumnPolicy::Fail => {
                        return Err(ImputationError::EmptyColumn {
                            column: sample.clone(),
                            rows: column.len(),
                        });
                    }
                    EmptyColumnPolicy::Skip => {
                        warn!(
                            "Column '{}' has no observed values among {} rows; leaving it unimputed.",
                            sample,
                            column.len()
                        );
                        columns.push(ColumnImputation {
                            sample: sample.clone(),
                            observed: 0,
                            imputed: 0,
                            mean: f64::NAN,
                            std: f64::NAN,
                            method: ImputationMethod::Skipped,
                        });
                        continue;
                    }
                }
            }

            let mean = observed.iter().mean();
            let std = observed.iter().std_dev();

            let method = if std == 0.0 || std.is_nan() {
                column
                    .iter_mut()
                    .filter(|v| v.is_nan())
                    .for_each(|v| *v = mean);
                ImputationMethod::ConstantMean
            } else {
                let loc = mean - self.params.shift * std;
                let scale = self.params.scale * std;
                let normal =
                    Normal::new(loc, scale).map_err(|e| ImputationError::Distribution {
                        column: sample.clone(),
                        loc,
                        scale,
                        detail: e.to_string(),
                    })?;
                for v in column.iter_mut().filter(|v| v.is_nan()) {
                    *v = normal.sample(&mut self.rng);
                }
                ImputationMethod::ShiftedNormal
            };

            debug!(
                "Imputed {} cells in '{}' ({:?}; mean={:.4}, std={:.4}).",
                n_missing, sample, method, mean, std
            );
            columns.push(ColumnImputation {
                sample: sample.clone(),
                observed: observed.len(),
                imputed: n_missing,
                mean,
                std,
                method,
            });
        }

        let filled: usize = columns.iter().map(|c| c.imputed).sum();
        info!(
            "Imputed {} missing values across {} columns (shift={}, scale={}).",
            filled,
            columns.iter().filter(|c| c.imputed > 0).count(),
            self.params.shift,
            self.params.scale
        );

        Ok(Imputed {
            matrix: out,
            imputed_mask,
            columns,
        })
    }
}
