// pipeline.rs
//
// Runs every stage in order over one input matrix. Nothing is written here;
// the caller decides what to export once the whole run has succeeded.

use std::time::Instant;

use log::{debug, info, warn};
use rand::Rng;

use crate::annotation::{self, AnnotationCount, AnnotationMap, TOP_N};
use crate::config::{AnnotationField, PipelineConfig};
use crate::error::PipelineError;
use crate::filter::{FilterReport, ValidityFilter};
use crate::impute::{Imputed, Imputer};
use crate::loader::{AnnotationSource, MatrixSource};
use crate::matrix::{AbundanceMatrix, RawMatrix};
use crate::presence::{self, PresenceSummary};
use crate::reduce::{self, Projection};
use crate::report::{self, SummaryReport};
use crate::transform;

pub const REPORT_TITLE: &str = "Summary Report: Proteomics Data";

/// Every intermediate artifact of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub config: PipelineConfig,
    /// Seed actually used for imputation.
    pub seed: u64,
    pub raw: RawMatrix,
    pub presence: PresenceSummary,
    pub log_matrix: AbundanceMatrix,
    pub annotated: AbundanceMatrix,
    /// Whether an annotation table was joined at all.
    pub annotations_loaded: bool,
    pub top_annotations: Vec<(AnnotationField, Vec<AnnotationCount>)>,
    pub filtered: AbundanceMatrix,
    pub filter_report: FilterReport,
    pub imputed: Imputed,
    pub projection: Projection,
}

pub fn run(
    config: &PipelineConfig,
    matrix_source: &dyn MatrixSource,
    annotation_source: Option<&dyn AnnotationSource>,
) -> Result<PipelineOutputs, PipelineError> {
    config.validate()?;
    let filter = ValidityFilter::new(config.validity_threshold)?;
    let seed = config
        .seed
        .unwrap_or_else(|| rand::rng().random::<u64>());
    info!("Imputation seed: {} (pass --seed {} to reproduce).", seed, seed);

    // --- 1. Load ---
    let stage_start = Instant::now();
    let raw = matrix_source.load()?;
    debug!("Matrix load took {:.2?}.", stage_start.elapsed());
    debug!("Cleaned column names: {:?}", raw.columns);

    // --- 2. Presence ---
    let presence = presence::analyze(&raw, &config.exclude_cols);

    // --- 3. Log transform ---
    let log_matrix = transform::log_transform(&raw, &config.exclude_cols);

    // --- 4. Annotation ---
    let (annotated, annotations_loaded) = match annotation_source {
        Some(source) => {
            let table = source.load()?;
            info!(
                "Loaded annotation table: {} records keyed on '{}'.",
                table.records.len(),
                table.key_column
            );
            let maps: Vec<(String, AnnotationMap)> = config
                .annotation_fields
                .iter()
                .map(|f| (f.column.clone(), AnnotationMap::build(&table, &f.source)))
                .collect();
            (annotation::annotate(&log_matrix, &maps), true)
        }
        None => {
            warn!("No annotation table given; annotation columns and term counts are skipped.");
            (log_matrix.clone(), false)
        }
    };
    let top_annotations: Vec<(AnnotationField, Vec<AnnotationCount>)> = config
        .annotation_fields
        .iter()
        .filter_map(|f| {
            annotated
                .annotation(&f.column)
                .map(|col| (f.clone(), annotation::top_counts(col, &f.label, TOP_N)))
        })
        .collect();

    // --- 5. Filter ---
    let (filtered, filter_report) = filter.apply(&annotated);
    if filtered.nrows() == 0 {
        warn!(
            "No rows have at least {} valid values; downstream stages receive an empty matrix.",
            filter_report.min_valid
        );
    }

    // --- 6. Impute ---
    let imputed = Imputer::seeded(config.imputation, seed).impute(&filtered)?;

    // --- 7. Reduce ---
    let projection = reduce::reduce(&imputed.matrix)?;

    Ok(PipelineOutputs {
        config: config.clone(),
        seed,
        raw,
        presence,
        log_matrix,
        annotated,
        annotations_loaded,
        top_annotations,
        filtered,
        filter_report,
        imputed,
        projection,
    })
}

impl PipelineOutputs {
    /// One section per figure, in pipeline order.
    pub fn summary_report(&self) -> SummaryReport {
        let mut report = SummaryReport::new(REPORT_TITLE);
        report.push(
            "Data Overview",
            report::overview_table(&self.presence.overview),
        );
        report.push(
            "Protein Count per Sample",
            report::protein_count_bar(&self.presence),
        );
        report.push(
            "Missing Data Heatmap",
            report::presence_heatmap(&self.presence),
        );
        report.push(
            "Log-Transformed Data Distribution",
            report::log_histograms(&self.log_matrix),
        );
        report.push(
            "Missing Values per Sample",
            report::missing_table(&self.filter_report.missing_by_sample),
        );
        for (field, counts) in &self.top_annotations {
            report.push(
                format!("Top {} {}", TOP_N, field.label),
                report::top_annotation_bar(counts),
            );
        }
        report.push(
            "Imputed vs Observed Values",
            report::observed_vs_imputed(&self.imputed),
        );
        report.push(
            "PCA of Samples (PC1 vs PC2)",
            report::pca_scatter(&self.projection),
        );
        report
    }
}
