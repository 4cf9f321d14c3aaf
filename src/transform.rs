// transform.rs

use log::{info, warn};
use ndarray::Array2;

use crate::matrix::{AbundanceMatrix, RawMatrix, TextColumn};

/// `ln(1 + x)` of a parsed cell. Unparseable text and non-finite results are missing.
#[inline]
pub fn log1p_cell(cell: Option<&str>) -> f64 {
    match cell.and_then(|c| c.trim().parse::<f64>().ok()) {
        Some(x) => {
            let y = x.ln_1p();
            if y.is_finite() {
                y
            } else {
                f64::NAN
            }
        }
        None => f64::NAN,
    }
}

/// Split the raw matrix into metadata text columns and log-transformed sample columns.
pub fn log_transform(matrix: &RawMatrix, exclude_cols: &[String]) -> AbundanceMatrix {
    let sample_idx = matrix.sample_column_indices(exclude_cols);
    let samples: Vec<String> = sample_idx
        .iter()
        .map(|&j| matrix.columns[j].clone())
        .collect();

    let metadata: Vec<TextColumn> = matrix
        .columns
        .iter()
        .enumerate()
        .filter(|(j, _)| !sample_idx.contains(j))
        .map(|(j, name)| TextColumn::new(name.clone(), matrix.cells.column(j).to_vec()))
        .collect();

    let mut coerced = 0usize;
    let values = Array2::from_shape_fn((matrix.nrows(), sample_idx.len()), |(i, k)| {
        let cell = matrix.cells[[i, sample_idx[k]]].as_deref();
        let y = log1p_cell(cell);
        if y.is_nan() && cell.is_some() {
            coerced += 1;
        }
        y
    });

    if coerced > 0 {
        warn!(
            "{} non-empty cells were not valid non-negative numbers and became missing during log transform.",
            coerced
        );
    }
    info!(
        "Log-transformed {} sample columns ({} metadata columns passed through).",
        samples.len(),
        metadata.len()
    );

    AbundanceMatrix {
        index_name: matrix.index_name.clone(),
        row_ids: matrix.row_ids.clone(),
        samples,
        values,
        metadata,
        annotations: Vec::new(),
    }
}
