// export.rs
//
// CSV and HTML artifacts of a finished run. Every file goes through a
// temporary file in the destination directory and is renamed into place.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::debug;
use tempfile::NamedTempFile;

use crate::matrix::{AbundanceMatrix, RawMatrix};
use crate::pipeline::PipelineOutputs;
use crate::report::{HtmlReportRenderer, ReportRenderer};

/// Write to a temporary sibling of `path`, then rename it over `path`.
pub fn write_atomically<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut writer = BufWriter::new(NamedTempFile::new_in(dir)?);
    write(&mut writer)?;
    let tmp = writer.into_inner().map_err(|e| e.into_error())?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!("Persisted {}", path.display());
    Ok(())
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

pub fn write_raw_matrix(out: &mut dyn Write, matrix: &RawMatrix) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_field(&matrix.index_name)?;
    wtr.write_record(&matrix.columns)?;
    for (i, row_id) in matrix.row_ids.iter().enumerate() {
        wtr.write_field(row_id)?;
        wtr.write_record(matrix.cells.row(i).iter().map(|c| c.as_deref().unwrap_or("")))?;
    }
    wtr.flush()
}

/// Index, metadata, samples, then annotation columns. Missing values are empty fields.
pub fn write_abundance(out: &mut dyn Write, matrix: &AbundanceMatrix) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    let header = std::iter::once(matrix.index_name.as_str())
        .chain(matrix.metadata.iter().map(|c| c.name.as_str()))
        .chain(matrix.samples.iter().map(String::as_str))
        .chain(matrix.annotations.iter().map(|c| c.name.as_str()));
    wtr.write_record(header)?;

    for (i, row_id) in matrix.row_ids.iter().enumerate() {
        let mut record: Vec<String> =
            Vec::with_capacity(1 + matrix.metadata.len() + matrix.nsamples() + matrix.annotations.len());
        record.push(row_id.clone());
        record.extend(matrix.metadata.iter().map(|c| c.values[i].clone().unwrap_or_default()));
        record.extend(matrix.values.row(i).iter().map(|&v| format_value(v)));
        record.extend(matrix.annotations.iter().map(|c| c.values[i].clone().unwrap_or_default()));
        wtr.write_record(&record)?;
    }
    wtr.flush()
}

/// Every file a run produces, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    CleanedMatrix,
    SampleCounts,
    LogTransformed,
    Annotated,
    TopAnnotations,
    MissingBySample,
    Filtered,
    Imputed,
    PcaCoordinates,
    PcaExplainedVariance,
    PcaLoadings,
    Report,
}

impl Artifact {
    pub const ALL: [Artifact; 12] = [
        Artifact::CleanedMatrix,
        Artifact::SampleCounts,
        Artifact::LogTransformed,
        Artifact::Annotated,
        Artifact::TopAnnotations,
        Artifact::MissingBySample,
        Artifact::Filtered,
        Artifact::Imputed,
        Artifact::PcaCoordinates,
        Artifact::PcaExplainedVariance,
        Artifact::PcaLoadings,
        Artifact::Report,
    ];

    /// Artifacts that exist for this run; the annotation files need an annotation table.
    pub fn for_run(outputs: &PipelineOutputs) -> Vec<Artifact> {
        Self::ALL
            .into_iter()
            .filter(|a| {
                outputs.annotations_loaded
                    || !matches!(a, Artifact::Annotated | Artifact::TopAnnotations)
            })
            .collect()
    }

    pub fn file_name(&self, validity_threshold: f64) -> String {
        match self {
            Artifact::CleanedMatrix => "step_1_raw_data_cleaned_columns.csv".into(),
            Artifact::SampleCounts => "step_2_sample_protein_counts.csv".into(),
            Artifact::LogTransformed => "step_3_log_transformed.csv".into(),
            Artifact::Annotated => "step_4_with_annotations.csv".into(),
            Artifact::TopAnnotations => "step_4_top20_annotations.csv".into(),
            Artifact::MissingBySample => "step_5_missing_by_sample.csv".into(),
            Artifact::Filtered => format!(
                "step_5_filtered_{}percent.csv",
                (validity_threshold * 100.0).round() as u32
            ),
            Artifact::Imputed => "step_6_imputed.csv".into(),
            Artifact::PcaCoordinates => "step_7_pca_coordinates.csv".into(),
            Artifact::PcaExplainedVariance => "step_7_pca_explained_variance.csv".into(),
            Artifact::PcaLoadings => "step_7_pca_loadings.csv".into(),
            Artifact::Report => "summary_report_all_plots.html".into(),
        }
    }

    pub fn write(&self, outputs: &PipelineOutputs, path: &Path) -> io::Result<()> {
        match self {
            Artifact::CleanedMatrix => write_atomically(path, |w| write_raw_matrix(w, &outputs.raw)),
            Artifact::SampleCounts => write_atomically(path, |w| {
                let mut wtr = csv::Writer::from_writer(w);
                wtr.write_record(["Sample", "Protein Count"])?;
                for (sample, count) in &outputs.presence.per_sample {
                    wtr.write_record([sample.as_str(), count.to_string().as_str()])?;
                }
                wtr.flush()
            }),
            Artifact::LogTransformed => {
                write_atomically(path, |w| write_abundance(w, &outputs.log_matrix))
            }
            Artifact::Annotated => write_atomically(path, |w| write_abundance(w, &outputs.annotated)),
            Artifact::TopAnnotations => write_atomically(path, |w| {
                let mut wtr = csv::Writer::from_writer(w);
                wtr.write_record(["Annotation", "Count", "Type"])?;
                for (_, counts) in &outputs.top_annotations {
                    for c in counts {
                        wtr.write_record([
                            c.annotation.as_str(),
                            c.count.to_string().as_str(),
                            c.field_label.as_str(),
                        ])?;
                    }
                }
                wtr.flush()
            }),
            Artifact::MissingBySample => write_atomically(path, |w| {
                let mut wtr = csv::Writer::from_writer(w);
                wtr.write_record(["Sample", "Missing"])?;
                for (sample, missing) in &outputs.filter_report.missing_by_sample {
                    wtr.write_record([sample.as_str(), missing.to_string().as_str()])?;
                }
                wtr.flush()
            }),
            Artifact::Filtered => write_atomically(path, |w| write_abundance(w, &outputs.filtered)),
            Artifact::Imputed => {
                write_atomically(path, |w| write_abundance(w, &outputs.imputed.matrix))
            }
            Artifact::PcaCoordinates => write_atomically(path, |w| {
                let p = &outputs.projection;
                let mut wtr = csv::Writer::from_writer(w);
                wtr.write_record(["Sample", "PC1", "PC2"])?;
                for (i, sample) in p.samples.iter().enumerate() {
                    wtr.write_record([
                        sample.clone(),
                        p.coordinates[[i, 0]].to_string(),
                        p.coordinates[[i, 1]].to_string(),
                    ])?;
                }
                wtr.flush()
            }),
            Artifact::PcaExplainedVariance => write_atomically(path, |w| {
                let p = &outputs.projection;
                let mut wtr = csv::Writer::from_writer(w);
                wtr.write_record(["Component", "ExplainedVariance", "ExplainedVarianceRatio"])?;
                for pc in 0..p.explained_variance.len() {
                    wtr.write_record([
                        format!("PC{}", pc + 1),
                        p.explained_variance[pc].to_string(),
                        p.explained_variance_ratio[pc].to_string(),
                    ])?;
                }
                wtr.flush()
            }),
            Artifact::PcaLoadings => write_atomically(path, |w| {
                let p = &outputs.projection;
                let mut wtr = csv::Writer::from_writer(w);
                wtr.write_record([outputs.imputed.matrix.index_name.as_str(), "PC1", "PC2"])?;
                for (j, feature) in p.features.iter().enumerate() {
                    wtr.write_record([
                        feature.clone(),
                        p.loadings[[0, j]].to_string(),
                        p.loadings[[1, j]].to_string(),
                    ])?;
                }
                wtr.flush()
            }),
            Artifact::Report => HtmlReportRenderer.render(&outputs.summary_report(), path),
        }
    }
}
