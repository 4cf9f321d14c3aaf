// reduce.rs
//
// Two-component PCA of samples over standardized protein abundances.

use log::{debug, info, warn};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};

use crate::error::ReductionError;
use crate::matrix::AbundanceMatrix;

pub const N_COMPONENTS: usize = 2;

/// Per-sample PCA coordinates plus the fitted components.
#[derive(Debug, Clone)]
pub struct Projection {
    pub samples: Vec<String>,
    /// samples x 2 (PC1, PC2).
    pub coordinates: Array2<f64>,
    pub explained_variance: [f64; N_COMPONENTS],
    pub explained_variance_ratio: [f64; N_COMPONENTS],
    /// Protein identifiers, one per loading column.
    pub features: Vec<String>,
    /// 2 x features, orthonormal rows.
    pub loadings: Array2<f64>,
}

impl Projection {
    pub fn pc(&self, sample: &str) -> Option<(f64, f64)> {
        let idx = self.samples.iter().position(|s| s == sample)?;
        Some((self.coordinates[[idx, 0]], self.coordinates[[idx, 1]]))
    }
}

/// Column-wise z-scores with population statistics. Constant columns map to 0.
pub fn standardize(x: &Array2<f64>) -> Array2<f64> {
    let n = x.nrows() as f64;
    let mut z = x.clone();
    for mut column in z.axis_iter_mut(Axis(1)) {
        let mean = column.sum() / n;
        let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        let scale = if std > 0.0 { std } else { 1.0 };
        column.mapv_inplace(|v| (v - mean) / scale);
    }
    z
}

/// Project every sample (column of `matrix`) onto the top two principal components.
pub fn reduce(matrix: &AbundanceMatrix) -> Result<Projection, ReductionError> {
    let n_samples = matrix.nsamples();
    let n_features = matrix.nrows();
    if n_samples < 2 {
        return Err(ReductionError::TooFewSamples { found: n_samples });
    }
    if n_features < 2 {
        return Err(ReductionError::TooFewFeatures { found: n_features });
    }

    let non_finite = matrix.values.iter().filter(|v| !v.is_finite()).count();
    if non_finite > 0 {
        let first_col = matrix
            .values
            .axis_iter(Axis(1))
            .position(|col| col.iter().any(|v| !v.is_finite()))
            .unwrap_or(0);
        return Err(ReductionError::NonFinite {
            count: non_finite,
            sample: matrix.samples[first_col].clone(),
        });
    }

    info!(
        "Running PCA on {} samples x {} proteins (standardized).",
        n_samples, n_features
    );

    // samples become rows
    let z = standardize(&matrix.values.t().to_owned());
    let zm = DMatrix::from_fn(n_samples, n_features, |i, j| z[[i, j]]);
    let svd = zm.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(ReductionError::Decomposition {
                rows: n_samples,
                cols: n_features,
            })
        }
    };
    let singular = svd.singular_values;

    let mut order: Vec<usize> = (0..singular.len()).collect();
    order.sort_by(|&a, &b| singular[b].total_cmp(&singular[a]));

    let mut coordinates = Array2::<f64>::zeros((n_samples, N_COMPONENTS));
    let mut loadings = Array2::<f64>::zeros((N_COMPONENTS, n_features));
    let mut explained_variance = [0.0; N_COMPONENTS];
    let dof = (n_samples - 1) as f64;

    for (pc, &k) in order.iter().take(N_COMPONENTS).enumerate() {
        // sign convention: largest |u| entry of each component is positive
        let u_col: Array1<f64> = (0..n_samples).map(|i| u[(i, k)]).collect();
        let pivot = u_col
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };

        for i in 0..n_samples {
            coordinates[[i, pc]] = sign * u_col[i] * singular[k];
        }
        for j in 0..n_features {
            loadings[[pc, j]] = sign * v_t[(k, j)];
        }
        explained_variance[pc] = singular[k].powi(2) / dof;
    }

    let total_variance: f64 = singular.iter().map(|s| s.powi(2) / dof).sum();
    let mut explained_variance_ratio = [0.0; N_COMPONENTS];
    if total_variance > 0.0 {
        for pc in 0..N_COMPONENTS {
            explained_variance_ratio[pc] = explained_variance[pc] / total_variance;
        }
    } else {
        warn!("All proteins are constant across samples; PCA coordinates are all zero.");
    }

    debug!(
        "Singular values (sorted, first {}): {:?}",
        N_COMPONENTS,
        order
            .iter()
            .take(N_COMPONENTS)
            .map(|&k| singular[k])
            .collect::<Vec<_>>()
    );
    info!(
        "PCA complete: PC1 explains {:.1}%, PC2 explains {:.1}% of variance.",
        explained_variance_ratio[0] * 100.0,
        explained_variance_ratio[1] * 100.0
    );

    Ok(Projection {
        samples: matrix.samples.clone(),
        coordinates,
        explained_variance,
        explained_variance_ratio,
        features: matrix.row_ids.clone(),
        loadings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// proteins x samples, like the pipeline hands over.
    fn matrix(values: Array2<f64>) -> AbundanceMatrix {
        AbundanceMatrix {
            index_name: "id".into(),
            row_ids: (0..values.nrows()).map(|i| format!("P{i}")).collect(),
            samples: (0..values.ncols()).map(|j| format!("S{j}")).collect(),
            values,
            metadata: Vec::new(),
            annotations: Vec::new(),
        }
    }

    fn varied(n_proteins: usize, n_samples: usize) -> Array2<f64> {
        Array2::from_shape_fn((n_proteins, n_samples), |(i, j)| {
            ((i * 7 + j * 13 + i * j * 3) % 17) as f64 + 0.25 * j as f64 + 0.1 * i as f64
        })
    }

    fn squared_residual(z: &Array2<f64>, basis: &Array2<f64>) -> f64 {
        // basis: features x 2, orthonormal columns
        let recon = z.dot(basis).dot(&basis.t());
        (z - &recon).mapv(|v| v * v).sum()
    }

    #[test]
    fn standardize_uses_population_stats() {
        let x = ndarray::array![[1.0, 5.0], [3.0, 5.0]];
        let z = standardize(&x);
        assert_abs_diff_eq!(z[[0, 0]], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[[1, 0]], 1.0, epsilon = 1e-12);
        assert_eq!(z[[0, 1]], 0.0);
        assert_eq!(z[[1, 1]], 0.0);
    }

    #[test]
    fn two_samples_put_everything_on_pc1() {
        let values = ndarray::array![[1.0, 2.0], [10.0, 4.0], [3.0, 3.5]];
        let p = reduce(&matrix(values)).unwrap();
        let (a1, a2) = p.pc("S0").unwrap();
        let (b1, b2) = p.pc("S1").unwrap();
        // every standardized feature is +-1, so the samples sit at +-sqrt(3)
        assert_abs_diff_eq!(a1.abs(), 3f64.sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(a1, -b1, epsilon = 1e-9);
        assert_abs_diff_eq!(a2, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b2, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.explained_variance_ratio[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn loadings_are_orthonormal_and_project_samples() {
        let values = varied(8, 6);
        let p = reduce(&matrix(values.clone())).unwrap();
        let gram = p.loadings.dot(&p.loadings.t());
        assert_abs_diff_eq!(gram[[0, 0]], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gram[[1, 1]], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gram[[0, 1]], 0.0, epsilon = 1e-9);

        let z = standardize(&values.t().to_owned());
        let projected = z.dot(&p.loadings.t());
        for i in 0..6 {
            for c in 0..2 {
                assert_abs_diff_eq!(projected[[i, c]], p.coordinates[[i, c]], epsilon = 1e-8);
            }
        }
        assert!(p.explained_variance[0] >= p.explained_variance[1]);
        assert!(p.explained_variance_ratio.iter().sum::<f64>() <= 1.0 + 1e-12);
    }

    #[test]
    fn pca_minimizes_reconstruction_error() {
        let values = varied(5, 7);
        let p = reduce(&matrix(values.clone())).unwrap();
        let z = standardize(&values.t().to_owned());
        let best = squared_residual(&z, &p.loadings.t().to_owned());

        let n_features = z.ncols();
        // every pair of coordinate axes, plus rotated pairs
        for a in 0..n_features {
            for b in (a + 1)..n_features {
                for angle in [0.0_f64, 0.3, 0.9, 1.4] {
                    let mut basis = Array2::<f64>::zeros((n_features, 2));
                    basis[[a, 0]] = angle.cos();
                    basis[[b, 0]] = angle.sin();
                    basis[[a, 1]] = -angle.sin();
                    basis[[b, 1]] = angle.cos();
                    assert!(best <= squared_residual(&z, &basis) + 1e-9);
                }
            }
        }
    }

    #[test]
    fn sign_convention_is_stable() {
        let values = varied(6, 5);
        let p1 = reduce(&matrix(values.clone())).unwrap();
        let p2 = reduce(&matrix(values)).unwrap();
        assert_eq!(p1.coordinates, p2.coordinates);
        for c in 0..2 {
            let col = p1.coordinates.column(c);
            let pivot = col
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            assert!(pivot >= 0.0);
        }
    }

    #[test]
    fn under_determined_inputs_fail() {
        assert!(matches!(
            reduce(&matrix(varied(5, 1))),
            Err(ReductionError::TooFewSamples { found: 1 })
        ));
        assert!(matches!(
            reduce(&matrix(varied(1, 4))),
            Err(ReductionError::TooFewFeatures { found: 1 })
        ));
        let mut values = varied(3, 3);
        values[[1, 2]] = f64::NAN;
        assert!(matches!(
            reduce(&matrix(values)),
            Err(ReductionError::NonFinite { count: 1, ref sample }) if sample == "S2"
        ));
    }
}
