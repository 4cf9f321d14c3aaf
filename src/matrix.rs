// matrix.rs

use ndarray::{Array2, Axis};

/// Cell spellings that load as missing, in addition to the empty cell.
pub const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
    "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "1.#IND", "1.#QNAN",
];

#[inline]
pub fn is_missing_marker(cell: &str) -> bool {
    let trimmed = cell.trim();
    MISSING_MARKERS.iter().any(|m| *m == trimmed)
}

/// The matrix exactly as loaded: cleaned headers, text cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatrix {
    pub index_name: String,
    pub row_ids: Vec<String>,
    pub columns: Vec<String>,
    /// rows x columns; `None` marks a missing cell.
    pub cells: Array2<Option<String>>,
}

impl RawMatrix {
    pub fn nrows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Indices of the columns not named in `exclude_cols`, in file order.
    pub fn sample_column_indices(&self, exclude_cols: &[String]) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !exclude_cols.iter().any(|ex| ex == *name))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// A named free-text column carried alongside the numeric grid.
#[derive(Debug, Clone, PartialEq)]
pub struct TextColumn {
    pub name: String,
    pub values: Vec<Option<String>>,
}

impl TextColumn {
    pub fn new(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            values: rows.iter().map(|&r| self.values[r].clone()).collect(),
        }
    }
}

/// Numeric abundance matrix. `values` is rows x samples with `NaN` as missing.
///
/// Metadata and annotation columns never take part in numeric operations;
/// they follow the rows through filtering.
#[derive(Debug, Clone)]
pub struct AbundanceMatrix {
    pub index_name: String,
    pub row_ids: Vec<String>,
    pub samples: Vec<String>,
    pub values: Array2<f64>,
    pub metadata: Vec<TextColumn>,
    pub annotations: Vec<TextColumn>,
}

impl AbundanceMatrix {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn nsamples(&self) -> usize {
        self.values.ncols()
    }

    /// Non-missing sample values per row.
    pub fn valid_counts(&self) -> Vec<usize> {
        self.values
            .axis_iter(Axis(0))
            .map(|row| row.iter().filter(|v| !v.is_nan()).count())
            .collect()
    }

    /// Missing sample values per column, in column order.
    pub fn missing_per_sample(&self) -> Vec<(String, usize)> {
        self.samples
            .iter()
            .zip(self.values.axis_iter(Axis(1)))
            .map(|(name, col)| (name.clone(), col.iter().filter(|v| v.is_nan()).count()))
            .collect()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// New matrix holding only `rows`, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            index_name: self.index_name.clone(),
            row_ids: rows.iter().map(|&r| self.row_ids[r].clone()).collect(),
            samples: self.samples.clone(),
            values: self.values.select(Axis(0), rows),
            metadata: self.metadata.iter().map(|c| c.select_rows(rows)).collect(),
            annotations: self.annotations.iter().map(|c| c.select_rows(rows)).collect(),
        }
    }

    pub fn annotation(&self, name: &str) -> Option<&TextColumn> {
        self.annotations.iter().find(|c| c.name == name)
    }
}
