// loader.rs
//
// Tab-delimited readers for the abundance matrix and the annotation table.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ndarray::Array2;
use regex::{Regex, RegexBuilder};

use crate::annotation::{AnnotationRecord, AnnotationTable};
use crate::error::{ConfigError, LoadError};
use crate::matrix::{is_missing_marker, RawMatrix};

/// Run/instrument naming artifacts stripped from sample headers.
pub const DEFAULT_HEADER_PATTERNS: &[&str] = &[
    r"F:\\WOSP00101-",
    r"DIA_",
    r"DIA-",
    r"DIANN\\",
    r"WOSP00101_",
    r"CAD20211212chenc_",
    r"N20211212chenc_",
    r"60min_",
    r"\.d$",
];

/// Something that yields the raw abundance matrix.
pub trait MatrixSource {
    fn load(&self) -> Result<RawMatrix, LoadError>;
}

/// Something that yields the annotation table.
pub trait AnnotationSource {
    fn load(&self) -> Result<AnnotationTable, LoadError>;
}

// --- Column header cleaning ---

/// Removes every case-insensitive match of a fixed pattern set from headers.
#[derive(Debug, Clone)]
pub struct ColumnCleaner {
    pattern: Regex,
}

impl ColumnCleaner {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        // validate each piece on its own so the error names the culprit
        for p in patterns {
            RegexBuilder::new(p.as_ref())
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::HeaderPattern {
                    pattern: p.as_ref().to_string(),
                    detail: e.to_string(),
                })?;
        }
        let joined = if patterns.is_empty() {
            // matches nothing
            r"[^\s\S]".to_string()
        } else {
            patterns
                .iter()
                .map(|p| format!("(?:{})", p.as_ref()))
                .collect::<Vec<_>>()
                .join("|")
        };
        let pattern = RegexBuilder::new(&joined)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::HeaderPattern {
                pattern: joined.clone(),
                detail: e.to_string(),
            })?;
        Ok(Self { pattern })
    }

    pub fn with_default_patterns() -> Result<Self, ConfigError> {
        Self::new(DEFAULT_HEADER_PATTERNS)
    }

    pub fn clean(&self, header: &str) -> String {
        self.pattern.replace_all(header, "").into_owned()
    }
}

// --- Shared csv plumbing ---

fn open_tsv(path: &Path, flexible: bool) -> Result<csv::Reader<File>, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Missing {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(flexible)
        .from_reader(file))
}

fn csv_error(path: &Path, err: csv::Error) -> LoadError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let detail = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {} fields, found {}", expected_len, len),
        csv::ErrorKind::Io(io_err) => format!("I/O error: {}", io_err),
        _ => err.to_string(),
    };
    LoadError::Malformed {
        path: path.to_path_buf(),
        line,
        detail,
    }
}

fn cell_value(raw: &str) -> Option<String> {
    if is_missing_marker(raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

// --- Matrix file ---

/// A tab-delimited matrix whose first column holds the row identifier.
#[derive(Debug, Clone)]
pub struct TsvMatrixFile {
    pub path: PathBuf,
    pub cleaner: ColumnCleaner,
}

impl TsvMatrixFile {
    pub fn new(path: impl Into<PathBuf>, cleaner: ColumnCleaner) -> Self {
        Self {
            path: path.into(),
            cleaner,
        }
    }
}

impl MatrixSource for TsvMatrixFile {
    fn load(&self) -> Result<RawMatrix, LoadError> {
        let path = self.path.as_path();
        info!("Loading abundance matrix from {}", path.display());
        let mut reader = open_tsv(path, false)?;

        let header = reader.headers().map_err(|e| csv_error(path, e))?.clone();
        if header.is_empty() || (header.len() == 1 && header[0].trim().is_empty()) {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
                detail: "no header line".into(),
            });
        }
        if header.len() < 2 {
            return Err(LoadError::Malformed {
                path: path.to_path_buf(),
                line: 1,
                detail: "no data columns after the row identifier".into(),
            });
        }

        let index_name = header[0].to_string();
        let mut columns = Vec::with_capacity(header.len() - 1);
        let mut seen_columns = HashSet::new();
        for raw_name in header.iter().skip(1) {
            let cleaned = self.cleaner.clean(raw_name);
            if cleaned != raw_name {
                debug!("Cleaned column header '{}' -> '{}'", raw_name, cleaned);
            }
            if !seen_columns.insert(cleaned.clone()) {
                return Err(LoadError::DuplicateColumn {
                    path: path.to_path_buf(),
                    column: cleaned,
                });
            }
            columns.push(cleaned);
        }

        let ncols = columns.len();
        let mut row_ids = Vec::new();
        let mut seen_rows = HashSet::new();
        let mut flat_cells: Vec<Option<String>> = Vec::new();

        for result in reader.records() {
            let record = result.map_err(|e| csv_error(path, e))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let row_id = record[0].to_string();
            if !seen_rows.insert(row_id.clone()) {
                return Err(LoadError::DuplicateRowId {
                    path: path.to_path_buf(),
                    row_id,
                    line,
                });
            }
            row_ids.push(row_id);
            flat_cells.extend(record.iter().skip(1).map(cell_value));
        }

        if row_ids.is_empty() {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
                detail: "header present but no data rows".into(),
            });
        }

        let nrows = row_ids.len();
        let cells = Array2::from_shape_vec((nrows, ncols), flat_cells).map_err(|e| {
            LoadError::Malformed {
                path: path.to_path_buf(),
                line: 0,
                detail: format!("cell grid does not match {}x{}: {}", nrows, ncols, e),
            }
        })?;

        info!(
            "Loaded matrix with {} rows x {} columns (index column '{}').",
            nrows, ncols, index_name
        );
        Ok(RawMatrix {
            index_name,
            row_ids,
            columns,
            cells,
        })
    }
}

// --- Annotation file ---

/// A tab-delimited annotation table with a join-key column and named value columns.
#[derive(Debug, Clone)]
pub struct TsvAnnotationFile {
    pub path: PathBuf,
    pub key_column: String,
    pub fields: Vec<String>,
}

impl TsvAnnotationFile {
    pub fn new(path: impl Into<PathBuf>, key_column: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            path: path.into(),
            key_column: key_column.into(),
            fields,
        }
    }
}

impl AnnotationSource for TsvAnnotationFile {
    fn load(&self) -> Result<AnnotationTable, LoadError> {
        let path = self.path.as_path();
        info!("Loading annotation table from {}", path.display());
        let mut reader = open_tsv(path, true)?;

        let header = reader.headers().map_err(|e| csv_error(path, e))?.clone();
        if header.is_empty() || (header.len() == 1 && header[0].trim().is_empty()) {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
                detail: "no header line".into(),
            });
        }

        let find = |name: &str| -> Result<usize, LoadError> {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| LoadError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };
        let key_idx = find(&self.key_column)?;
        let field_idx = self
            .fields
            .iter()
            .map(|f| find(f))
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::new();
        let mut short_rows = 0usize;
        for result in reader.records() {
            let record = result.map_err(|e| csv_error(path, e))?;
            if record.len() < header.len() {
                short_rows += 1;
            }
            records.push(AnnotationRecord {
                key: record.get(key_idx).and_then(cell_value),
                values: field_idx
                    .iter()
                    .map(|&i| record.get(i).and_then(cell_value))
                    .collect(),
            });
        }
        if short_rows > 0 {
            warn!(
                "{} annotation rows in {} had fewer fields than the header; absent fields read as missing.",
                short_rows,
                path.display()
            );
        }

        info!(
            "Loaded {} annotation records (key '{}', fields {:?}).",
            records.len(),
            self.key_column,
            self.fields
        );
        Ok(AnnotationTable {
            key_column: self.key_column.clone(),
            fields: self.fields.clone(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn tsv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn cleaner_strips_patterns_case_insensitively() {
        let cleaner = ColumnCleaner::with_default_patterns().unwrap();
        assert_eq!(cleaner.clean(r"F:\WOSP00101-Sample1.d"), "Sample1");
        assert_eq!(cleaner.clean("dia_60MIN_ctrl_1"), "ctrl_1");
        assert_eq!(cleaner.clean(r"diann\run7.D"), "run7");
        assert_eq!(cleaner.clean("cad20211212CHENC_x"), "x");
        // ".d" only at the end
        assert_eq!(cleaner.clean("a.dose"), "a.dose");
        assert_eq!(cleaner.clean("Genes"), "Genes");
    }

    #[test]
    fn cleaner_rejects_bad_pattern() {
        let err = ColumnCleaner::new(&["ok", "(unclosed"]).unwrap_err();
        assert!(matches!(err, ConfigError::HeaderPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn empty_pattern_list_is_identity() {
        let cleaner = ColumnCleaner::new::<&str>(&[]).unwrap();
        assert_eq!(cleaner.clean("DIA_x.d"), "DIA_x.d");
    }

    #[test]
    fn loads_matrix_and_cleans_headers() {
        let f = tsv("Protein.Group\tGenes\tDIA_s1.d\tDIA_s2.d\nP1\tG1\t10\t\nP2\tG2\tNaN\t5.5\n");
        let source = TsvMatrixFile::new(f.path(), ColumnCleaner::with_default_patterns().unwrap());
        let m = source.load().unwrap();
        assert_eq!(m.index_name, "Protein.Group");
        assert_eq!(m.columns, vec!["Genes", "s1", "s2"]);
        assert_eq!(m.row_ids, vec!["P1", "P2"]);
        assert_eq!(m.cells[[0, 1]], Some("10".to_string()));
        assert_eq!(m.cells[[0, 2]], None);
        assert_eq!(m.cells[[1, 1]], None);
    }

    #[test]
    fn missing_file_is_load_error() {
        let source = TsvMatrixFile::new(
            "/definitely/not/here.tsv",
            ColumnCleaner::with_default_patterns().unwrap(),
        );
        assert!(matches!(source.load(), Err(LoadError::Missing { .. })));
    }

    #[test]
    fn empty_and_header_only_files_are_load_errors() {
        let cleaner = ColumnCleaner::with_default_patterns().unwrap();
        let empty = tsv("");
        assert!(matches!(
            TsvMatrixFile::new(empty.path(), cleaner.clone()).load(),
            Err(LoadError::Empty { .. })
        ));
        let header_only = tsv("id\ts1\ts2\n");
        assert!(matches!(
            TsvMatrixFile::new(header_only.path(), cleaner).load(),
            Err(LoadError::Empty { .. })
        ));
    }

    #[test]
    fn ragged_rows_are_malformed() {
        let f = tsv("id\ts1\ts2\nP1\t1\t2\nP2\t3\n");
        let err = TsvMatrixFile::new(f.path(), ColumnCleaner::with_default_patterns().unwrap())
            .load()
            .unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }), "{err:?}");
    }

    #[test]
    fn duplicate_rows_and_columns_are_rejected() {
        let cleaner = ColumnCleaner::with_default_patterns().unwrap();
        let rows = tsv("id\ts1\nP1\t1\nP1\t2\n");
        assert!(matches!(
            TsvMatrixFile::new(rows.path(), cleaner.clone()).load(),
            Err(LoadError::DuplicateRowId { ref row_id, .. }) if row_id == "P1"
        ));
        let cols = tsv("id\tDIA_s1\ts1\nP1\t1\t2\n");
        assert!(matches!(
            TsvMatrixFile::new(cols.path(), cleaner).load(),
            Err(LoadError::DuplicateColumn { ref column, .. }) if column == "s1"
        ));
    }

    #[test]
    fn loads_annotation_table() {
        let f = tsv("UniProt\tKEGG name\tGOCC name\nP1;P2\tPathway A\t\nP1\tPathway B\tnucleus\n");
        let source = TsvAnnotationFile::new(
            f.path(),
            "UniProt",
            vec!["KEGG name".to_string(), "GOCC name".to_string()],
        );
        let table = source.load().unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].key.as_deref(), Some("P1;P2"));
        assert_eq!(table.records[0].values, vec![Some("Pathway A".into()), None]);
        assert_eq!(table.records[1].values[1].as_deref(), Some("nucleus"));
    }

    #[test]
    fn annotation_table_requires_columns() {
        let f = tsv("UniProt\tKEGG name\nP1\tA\n");
        let source = TsvAnnotationFile::new(f.path(), "UniProt", vec!["GOMF name".to_string()]);
        assert!(matches!(
            source.load(),
            Err(LoadError::MissingColumn { ref column, .. }) if column == "GOMF name"
        ));
    }
}
