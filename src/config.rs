// config.rs

use std::str::FromStr;

use crate::error::ConfigError;
use crate::impute::{EmptyColumnPolicy, ImputationParams, DEFAULT_SCALE, DEFAULT_SHIFT};

pub const DEFAULT_VALIDITY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_ANNOTATION_KEY: &str = "UniProt";

/// DIA-NN protein-group metadata columns.
pub const DEFAULT_EXCLUDE_COLS: &[&str] = &[
    "Protein.Ids",
    "Protein.Names",
    "Genes",
    "First.Protein.Description",
];

/// One annotation field to map: table column, output column, display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationField {
    pub source: String,
    pub column: String,
    pub label: String,
}

impl AnnotationField {
    pub fn new(source: &str, column: &str, label: &str) -> Self {
        Self {
            source: source.to_string(),
            column: column.to_string(),
            label: label.to_string(),
        }
    }

    /// KEGG pathway, GO cellular component and GO molecular function.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("KEGG name", "KEGG_Pathway", "KEGG Pathway"),
            Self::new("GOCC name", "GO_CC", "GO Cellular Component"),
            Self::new("GOMF name", "GO_MF", "GO Molecular Function"),
        ]
    }
}

/// `SOURCE=COLUMN` or `SOURCE=COLUMN=LABEL`; the label defaults to the column name.
impl FromStr for AnnotationField {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split('=').map(str::trim).collect();
        let bad = || ConfigError::AnnotationField {
            input: input.to_string(),
        };
        match parts.as_slice() {
            [source, column] if !source.is_empty() && !column.is_empty() => {
                Ok(Self::new(source, column, column))
            }
            [source, column, label]
                if !source.is_empty() && !column.is_empty() && !label.is_empty() =>
            {
                Ok(Self::new(source, column, label))
            }
            _ => Err(bad()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub validity_threshold: f64,
    pub imputation: ImputationParams,
    /// Metadata columns never treated as sample data.
    pub exclude_cols: Vec<String>,
    pub annotation_fields: Vec<AnnotationField>,
    /// Imputation seed; `None` draws one at run time.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validity_threshold: DEFAULT_VALIDITY_THRESHOLD,
            imputation: ImputationParams {
                shift: DEFAULT_SHIFT,
                scale: DEFAULT_SCALE,
                on_empty_column: EmptyColumnPolicy::Fail,
            },
            exclude_cols: DEFAULT_EXCLUDE_COLS.iter().map(|s| s.to_string()).collect(),
            annotation_fields: AnnotationField::defaults(),
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.validity_threshold > 0.0 && self.validity_threshold <= 1.0) {
            return Err(ConfigError::Threshold(self.validity_threshold));
        }
        self.imputation.validate()
    }

    /// Output column names of the annotation stage; excluded from every numeric step.
    pub fn annotation_columns(&self) -> Vec<String> {
        self.annotation_fields.iter().map(|f| f.column.clone()).collect()
    }
}
