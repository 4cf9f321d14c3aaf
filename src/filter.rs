// filter.rs

use log::{info, warn};

use crate::error::ConfigError;
use crate::matrix::AbundanceMatrix;

/// Samples listed in the missing-value log line.
pub const MISSING_REPORT_LIMIT: usize = 60;

/// Keeps rows observed in at least a fraction of the sample columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidityFilter {
    threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterReport {
    pub threshold: f64,
    pub min_valid: usize,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Missing values per sample of the unfiltered input, most missing first.
    pub missing_by_sample: Vec<(String, usize)>,
}

impl ValidityFilter {
    pub fn new(threshold: f64) -> Result<Self, ConfigError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Threshold(threshold));
        }
        Ok(Self { threshold })
    }

    /// `ceil(n * threshold)`, tolerant of binary representation error
    /// (`10 * 0.7` must give 7, not 8).
    pub fn min_valid(&self, n_samples: usize) -> usize {
        let raw = n_samples as f64 * self.threshold;
        let nearest = raw.round();
        if (raw - nearest).abs() < 1e-9 {
            nearest as usize
        } else {
            raw.ceil() as usize
        }
    }

    /// New matrix holding the rows that pass, in input order.
    pub fn apply(&self, matrix: &AbundanceMatrix) -> (AbundanceMatrix, FilterReport) {
        let n = matrix.nsamples();
        if n == 0 {
            warn!("No sample columns present; validity filter keeps every row.");
        }
        let min_valid = self.min_valid(n);

        let keep: Vec<usize> = matrix
            .valid_counts()
            .into_iter()
            .enumerate()
            .filter(|&(_, valid)| valid >= min_valid)
            .map(|(row, _)| row)
            .collect();
        let filtered = matrix.select_rows(&keep);

        let mut missing_by_sample = matrix.missing_per_sample();
        missing_by_sample.sort_by(|a, b| b.1.cmp(&a.1));
        info!(
            "Missing values per sample before filtering (top {}):",
            MISSING_REPORT_LIMIT.min(missing_by_sample.len())
        );
        for (sample, missing) in missing_by_sample.iter().take(MISSING_REPORT_LIMIT) {
            info!("  {:<40} {}", sample, missing);
        }

        info!(
            "Filtered from {} to {} rows based on {:.0}% valid sample values (min_valid = {} of {}).",
            matrix.nrows(),
            filtered.nrows(),
            self.threshold * 100.0,
            min_valid,
            n
        );

        let report = FilterReport {
            threshold: self.threshold,
            min_valid,
            rows_before: matrix.nrows(),
            rows_after: filtered.nrows(),
            missing_by_sample,
        };
        (filtered, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::TextColumn;
    use ndarray::Array2;

    /// Row `i` has exactly `valid[i]` observed values out of `n`.
    fn matrix_with_valid_counts(n: usize, valid: &[usize]) -> AbundanceMatrix {
        let values = Array2::from_shape_fn((valid.len(), n), |(i, j)| {
            if j < valid[i] {
                1.0 + j as f64
            } else {
                f64::NAN
            }
        });
        AbundanceMatrix {
            index_name: "id".into(),
            row_ids: (0..valid.len()).map(|i| format!("P{i}")).collect(),
            samples: (0..n).map(|j| format!("s{j}")).collect(),
            values,
            metadata: Vec::new(),
            annotations: vec![TextColumn::new(
                "KEGG_Pathway",
                (0..valid.len()).map(|i| Some(format!("path{i}"))).collect(),
            )],
        }
    }

    #[test]
    fn threshold_bounds() {
        assert!(ValidityFilter::new(0.0).is_err());
        assert!(ValidityFilter::new(1.01).is_err());
        assert!(ValidityFilter::new(f64::NAN).is_err());
        assert!(ValidityFilter::new(1.0).is_ok());
    }

    #[test]
    fn min_valid_rounds_up() {
        let f = ValidityFilter::new(0.7).unwrap();
        assert_eq!(f.min_valid(10), 7);
        assert_eq!(f.min_valid(4), 3);
        assert_eq!(f.min_valid(3), 3);
        assert_eq!(f.min_valid(0), 0);
        assert_eq!(ValidityFilter::new(0.5).unwrap().min_valid(5), 3);
    }

    #[test]
    fn seven_of_ten_kept_six_dropped() {
        let m = matrix_with_valid_counts(10, &[7, 6, 10, 0]);
        let (kept, report) = ValidityFilter::new(0.7).unwrap().apply(&m);
        assert_eq!(report.min_valid, 7);
        assert_eq!(kept.row_ids, vec!["P0", "P2"]);
        assert_eq!(report.rows_before, 4);
        assert_eq!(report.rows_after, 2);
        // annotation columns follow the rows and are not counted
        assert_eq!(
            kept.annotations[0].values,
            vec![Some("path0".to_string()), Some("path2".to_string())]
        );
        assert_eq!(kept.samples.len(), 10);
    }

    #[test]
    fn full_threshold_needs_complete_rows() {
        let m = matrix_with_valid_counts(4, &[4, 3, 4]);
        let (kept, _) = ValidityFilter::new(1.0).unwrap().apply(&m);
        assert_eq!(kept.row_ids, vec!["P0", "P2"]);
        assert_eq!(kept.missing_count(), 0);
    }

    #[test]
    fn missing_by_sample_is_descending() {
        let m = matrix_with_valid_counts(3, &[1, 2, 3]);
        let (_, report) = ValidityFilter::new(0.5).unwrap().apply(&m);
        assert_eq!(report.missing_by_sample[0], ("s2".to_string(), 2));
        assert_eq!(report.missing_by_sample[2], ("s0".to_string(), 0));
    }

    #[test]
    fn missing_by_sample_covers_every_sample_and_is_stable_on_ties() {
        let m = matrix_with_valid_counts(MISSING_REPORT_LIMIT + 5, &[2, 2, 0]);
        let (kept, report) = ValidityFilter::new(0.5).unwrap().apply(&m);
        assert!(kept.row_ids.is_empty());
        assert_eq!(report.missing_by_sample.len(), MISSING_REPORT_LIMIT + 5);
        // s0 and s1 miss only row P2; the rest miss all three rows
        assert_eq!(report.missing_by_sample[0], ("s2".to_string(), 3));
        assert_eq!(report.missing_by_sample[MISSING_REPORT_LIMIT + 3], ("s0".to_string(), 1));
        assert_eq!(report.missing_by_sample[MISSING_REPORT_LIMIT + 4], ("s1".to_string(), 1));
    }
}
