// presence.rs
//
// Missingness overview of the cleaned, untransformed matrix. Read-only; the
// results only feed the report.

use log::info;
use ndarray::{Array2, Axis};

use crate::matrix::RawMatrix;

/// Whole-matrix cell counts, over every data column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixOverview {
    pub rows: usize,
    pub columns: usize,
    pub total: usize,
    pub present: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSummary {
    pub overview: MatrixOverview,
    /// (sample, non-missing count), highest count first. Equal counts keep column order.
    pub per_sample: Vec<(String, usize)>,
    /// Row identifiers of `grid`.
    pub row_ids: Vec<String>,
    /// Column order of `grid` (file order, metadata excluded).
    pub samples: Vec<String>,
    /// rows x samples, 1 = present, 0 = missing.
    pub grid: Array2<u8>,
}

pub fn overview(matrix: &RawMatrix) -> MatrixOverview {
    let total = matrix.cells.len();
    let present = matrix.cells.iter().filter(|c| c.is_some()).count();
    MatrixOverview {
        rows: matrix.nrows(),
        columns: matrix.ncols(),
        total,
        present,
        missing: total - present,
    }
}

/// Presence statistics with the `exclude_cols` metadata columns left out.
pub fn analyze(matrix: &RawMatrix, exclude_cols: &[String]) -> PresenceSummary {
    let overview = overview(matrix);
    info!(
        "Matrix dimensions: {} rows x {} columns; {} cells, {} present, {} missing.",
        overview.rows, overview.columns, overview.total, overview.present, overview.missing
    );

    let sample_idx = matrix.sample_column_indices(exclude_cols);
    let samples: Vec<String> = sample_idx
        .iter()
        .map(|&j| matrix.columns[j].clone())
        .collect();

    let grid = Array2::from_shape_fn((matrix.nrows(), sample_idx.len()), |(i, k)| {
        u8::from(matrix.cells[[i, sample_idx[k]]].is_some())
    });

    let mut per_sample: Vec<(String, usize)> = samples
        .iter()
        .zip(grid.axis_iter(Axis(1)))
        .map(|(name, col)| (name.clone(), col.iter().map(|&v| v as usize).sum()))
        .collect();
    per_sample.sort_by(|a, b| b.1.cmp(&a.1));

    if let (Some(first), Some(last)) = (per_sample.first(), per_sample.last()) {
        info!(
            "Proteins detected per sample range from {} ({}) to {} ({}).",
            last.1, last.0, first.1, first.0
        );
    }

    PresenceSummary {
        overview,
        per_sample,
        row_ids: matrix.row_ids.clone(),
        samples,
        grid,
    }
}
