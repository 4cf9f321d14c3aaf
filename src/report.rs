// report.rs
//
// Plot data for the summary report, and an HTML renderer built on plotly.

use std::io;
use std::path::Path;

use log::info;
use ndarray::{Array2, Axis as ArrayAxis};
use plotly::common::{ColorScale, ColorScaleElement, Marker, Mode, Position, Visible};
use plotly::layout::update_menu::{Button, ButtonMethod, UpdateMenu, UpdateMenuDirection};
use plotly::layout::{Axis, BarMode};
use plotly::{Bar, HeatMap, Histogram, Layout, Plot, Scatter};
use serde_json::json;

use crate::annotation::AnnotationCount;
use crate::export::write_atomically;
use crate::impute::Imputed;
use crate::matrix::AbundanceMatrix;
use crate::presence::{MatrixOverview, PresenceSummary};
use crate::reduce::Projection;

pub const HISTOGRAM_BINS: usize = 50;
/// Heatmaps taller than this are drawn as row bands shaded by presence fraction.
pub const MAX_HEATMAP_ROWS: usize = 400;
pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const TEAL: &str = "teal";
const RED: &str = "#d62728";
const STEELBLUE: &str = "steelblue";

// --- Plot data ---

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSeries {
    pub name: String,
    pub color: &'static str,
    /// Finite values only.
    pub values: Vec<f64>,
}

impl HistogramSeries {
    fn new(
        name: impl Into<String>,
        color: &'static str,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        Self {
            name: name.into(),
            color,
            values: values.into_iter().filter(|v| v.is_finite()).collect(),
        }
    }
}

/// One dropdown entry: the series shown together for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramPanel {
    pub title: String,
    pub series: Vec<HistogramSeries>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Figure {
    Bar {
        labels: Vec<String>,
        values: Vec<f64>,
        y_label: String,
    },
    Heatmap {
        samples: Vec<String>,
        /// One label per row band (a protein id, or the first and last id of the band).
        row_labels: Vec<String>,
        /// Fraction present per (row band, sample).
        fractions: Array2<f64>,
        rows_per_band: usize,
        total_rows: usize,
    },
    /// Overlaid histograms with a dropdown switching between panels.
    Histograms {
        title: String,
        x_label: String,
        panels: Vec<HistogramPanel>,
    },
    Scatter {
        points: Vec<(String, f64, f64)>,
        x_label: String,
        y_label: String,
    },
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub title: String,
    pub figure: Figure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    pub title: String,
    pub sections: Vec<ReportSection>,
}

impl SummaryReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sections: Vec::new(),
        }
    }

    pub fn push(&mut self, title: impl Into<String>, figure: Figure) {
        self.sections.push(ReportSection {
            title: title.into(),
            figure,
        });
    }
}

// --- Figure builders ---

pub fn overview_table(overview: &MatrixOverview) -> Figure {
    Figure::Table {
        header: vec!["Statistic".into(), "Value".into()],
        rows: vec![
            vec!["Rows (protein groups)".into(), overview.rows.to_string()],
            vec!["Columns".into(), overview.columns.to_string()],
            vec!["Total items".into(), overview.total.to_string()],
            vec!["Non-missing values".into(), overview.present.to_string()],
            vec!["Missing values".into(), overview.missing.to_string()],
        ],
    }
}

/// Per-sample missing counts, as ranked by the validity filter.
pub fn missing_table(missing_by_sample: &[(String, usize)]) -> Figure {
    Figure::Table {
        header: vec!["Sample".into(), "Missing values".into()],
        rows: missing_by_sample
            .iter()
            .map(|(sample, n)| vec![sample.clone(), n.to_string()])
            .collect(),
    }
}

pub fn protein_count_bar(presence: &PresenceSummary) -> Figure {
    Figure::Bar {
        labels: presence.per_sample.iter().map(|(s, _)| s.clone()).collect(),
        values: presence.per_sample.iter().map(|(_, c)| *c as f64).collect(),
        y_label: "Protein Count".into(),
    }
}

pub fn presence_heatmap(presence: &PresenceSummary) -> Figure {
    let total_rows = presence.grid.nrows();
    let rows_per_band = total_rows.div_ceil(MAX_HEATMAP_ROWS).max(1);
    let bands = total_rows.div_ceil(rows_per_band);
    let mut fractions = Array2::<f64>::zeros((bands, presence.grid.ncols()));
    let mut row_labels = Vec::with_capacity(bands);
    for (band, chunk) in presence
        .grid
        .axis_chunks_iter(ArrayAxis(0), rows_per_band)
        .enumerate()
    {
        let first = band * rows_per_band;
        let last = first + chunk.nrows() - 1;
        row_labels.push(if first == last {
            presence.row_ids[first].clone()
        } else {
            format!("{}..{}", presence.row_ids[first], presence.row_ids[last])
        });
        let n = chunk.nrows() as f64;
        for (j, col) in chunk.axis_iter(ArrayAxis(1)).enumerate() {
            fractions[[band, j]] = col.iter().map(|&v| v as f64).sum::<f64>() / n;
        }
    }
    Figure::Heatmap {
        samples: presence.samples.clone(),
        row_labels,
        fractions,
        rows_per_band,
        total_rows,
    }
}

pub fn log_histograms(matrix: &AbundanceMatrix) -> Figure {
    let panels = matrix
        .samples
        .iter()
        .zip(matrix.values.axis_iter(ArrayAxis(1)))
        .map(|(sample, col)| HistogramPanel {
            title: sample.clone(),
            series: vec![HistogramSeries::new(sample.clone(), TEAL, col.iter().copied())],
        })
        .collect();
    Figure::Histograms {
        title: "Log-Transformed Expression".into(),
        x_label: "Log(Expression)".into(),
        panels,
    }
}

pub fn top_annotation_bar(counts: &[AnnotationCount]) -> Figure {
    Figure::Bar {
        labels: counts.iter().map(|c| c.annotation.clone()).collect(),
        values: counts.iter().map(|c| c.count as f64).collect(),
        y_label: "Number of Genes".into(),
    }
}

/// Observed values vs. filled-in values per sample.
pub fn observed_vs_imputed(imputed: &Imputed) -> Figure {
    let values = &imputed.matrix.values;
    let panels = imputed
        .matrix
        .samples
        .iter()
        .enumerate()
        .map(|(j, sample)| {
            let cells: Vec<(f64, bool)> = values
                .column(j)
                .iter()
                .copied()
                .zip(imputed.imputed_mask.column(j).iter().copied())
                .collect();
            let observed = cells.iter().filter(|(_, m)| !m).map(|(v, _)| *v);
            let filled = cells.iter().filter(|(_, m)| *m).map(|(v, _)| *v);
            HistogramPanel {
                title: sample.clone(),
                series: vec![
                    HistogramSeries::new("Observed", TEAL, observed),
                    HistogramSeries::new("Imputed", RED, filled),
                ],
            }
        })
        .collect();
    Figure::Histograms {
        title: "Histogram of Observed and Imputed Values".into(),
        x_label: "Log(Expression)".into(),
        panels,
    }
}

pub fn pca_scatter(projection: &Projection) -> Figure {
    let pct = |r: f64| format!("{:.1}%", r * 100.0);
    Figure::Scatter {
        points: projection
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                (
                    s.clone(),
                    projection.coordinates[[i, 0]],
                    projection.coordinates[[i, 1]],
                )
            })
            .collect(),
        x_label: format!(
            "Principal Component 1 ({})",
            pct(projection.explained_variance_ratio[0])
        ),
        y_label: format!(
            "Principal Component 2 ({})",
            pct(projection.explained_variance_ratio[1])
        ),
    }
}

// --- Plotly figures ---

fn bar_plot(labels: &[String], values: &[f64], y_label: &str) -> Plot {
    let mut plot = Plot::new();
    plot.add_trace(
        Bar::new(labels.to_vec(), values.to_vec()).marker(Marker::new().color(STEELBLUE)),
    );
    plot.set_layout(
        Layout::new()
            .x_axis(Axis::new().tick_angle(45.0))
            .y_axis(Axis::new().title(y_label))
            .height(500),
    );
    plot
}

fn heatmap_plot(samples: &[String], row_labels: &[String], fractions: &Array2<f64>) -> Plot {
    let z: Vec<Vec<f64>> = fractions
        .axis_iter(ArrayAxis(0))
        .map(|row| row.to_vec())
        .collect();
    let mut plot = Plot::new();
    plot.add_trace(
        HeatMap::new(samples.to_vec(), row_labels.to_vec(), z)
            .color_scale(ColorScale::Vector(vec![
                ColorScaleElement(0.0, "lightgrey".to_string()),
                ColorScaleElement(1.0, "steelblue".to_string()),
            ]))
            .show_scale(false),
    );
    plot.set_layout(
        Layout::new()
            .x_axis(Axis::new().title("Samples").tick_angle(45.0))
            .y_axis(Axis::new().title("Proteins").show_tick_labels(false))
            .height(600),
    );
    plot
}

/// Every panel's traces go into one plot; only the first panel starts visible
/// and the dropdown swaps the visibility mask.
fn histogram_plot(title: &str, x_label: &str, panels: &[HistogramPanel]) -> Plot {
    let mut plot = Plot::new();
    let mut owners = Vec::new();
    for (p, panel) in panels.iter().enumerate() {
        for series in &panel.series {
            plot.add_trace(
                Histogram::new(series.values.clone())
                    .name(series.name.as_str())
                    .n_bins_x(HISTOGRAM_BINS)
                    .opacity(0.7)
                    .marker(Marker::new().color(series.color))
                    .visible(if p == 0 { Visible::True } else { Visible::False }),
            );
            owners.push(p);
        }
    }

    let buttons: Vec<Button> = panels
        .iter()
        .enumerate()
        .map(|(p, panel)| {
            let visible: Vec<bool> = owners.iter().map(|&o| o == p).collect();
            Button::new()
                .label(panel.title.as_str())
                .method(ButtonMethod::Update)
                .args(json!([
                    { "visible": visible },
                    { "title": format!("{} - {}", title, panel.title) }
                ]))
        })
        .collect();

    let first_title = panels
        .first()
        .map(|p| format!("{} - {}", title, p.title))
        .unwrap_or_else(|| title.to_string());
    let multi_series = panels.iter().any(|p| p.series.len() > 1);
    plot.set_layout(
        Layout::new()
            .title(first_title.as_str())
            .x_axis(Axis::new().title(x_label))
            .y_axis(Axis::new().title("Frequency"))
            .bar_mode(BarMode::Overlay)
            .bar_gap(0.1)
            .show_legend(multi_series)
            .update_menus(vec![UpdateMenu::new()
                .buttons(buttons)
                .direction(UpdateMenuDirection::Down)
                .show_active(true)
                .x(1.05)
                .y(1.0)]),
    );
    plot
}

fn scatter_plot(points: &[(String, f64, f64)], x_label: &str, y_label: &str) -> Plot {
    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(
            points.iter().map(|p| p.1).collect::<Vec<_>>(),
            points.iter().map(|p| p.2).collect::<Vec<_>>(),
        )
        .mode(Mode::MarkersText)
        .text_array(points.iter().map(|p| p.0.clone()).collect::<Vec<_>>())
        .text_position(Position::TopCenter)
        .marker(Marker::new().size(10).color(STEELBLUE)),
    );
    plot.set_layout(
        Layout::new()
            .x_axis(Axis::new().title(x_label))
            .y_axis(Axis::new().title(y_label))
            .show_legend(false)
            .width(800)
            .height(600),
    );
    plot
}

/// The plotly figure for `figure`; tables have none.
pub fn to_plot(figure: &Figure) -> Option<Plot> {
    match figure {
        Figure::Bar {
            labels,
            values,
            y_label,
        } => Some(bar_plot(labels, values, y_label)),
        Figure::Heatmap {
            samples,
            row_labels,
            fractions,
            ..
        } => Some(heatmap_plot(samples, row_labels, fractions)),
        Figure::Histograms {
            title,
            x_label,
            panels,
        } => Some(histogram_plot(title, x_label, panels)),
        Figure::Scatter {
            points,
            x_label,
            y_label,
        } => Some(scatter_plot(points, x_label, y_label)),
        Figure::Table { .. } => None,
    }
}

// --- Rendering ---

/// Turns a report into a document at `path`.
pub trait ReportRenderer {
    fn render(&self, report: &SummaryReport, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct HtmlReportRenderer;

impl ReportRenderer for HtmlReportRenderer {
    fn render(&self, report: &SummaryReport, path: &Path) -> io::Result<()> {
        let html = render_html(report);
        write_atomically(path, |w| io::Write::write_all(w, html.as_bytes()))?;
        info!(
            "Wrote summary report with {} sections to {}",
            report.sections.len(),
            path.display()
        );
        Ok(())
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn html_table(header: &[String], rows: &[Vec<String>]) -> String {
    let cells = |row: &[String], tag: &str| -> String {
        row.iter()
            .map(|c| format!("<{tag}>{}</{tag}>", escape(c)))
            .collect()
    };
    let mut out = format!("<table>\n<tr>{}</tr>\n", cells(header, "th"));
    for row in rows {
        out.push_str(&format!("<tr>{}</tr>\n", cells(row, "td")));
    }
    out.push_str("</table>\n");
    out
}

/// plotly.js is loaded once from the CDN; each figure is an inline div.
pub fn render_html(report: &SummaryReport) -> String {
    let mut body = String::new();
    for (i, section) in report.sections.iter().enumerate() {
        body.push_str(&format!("<h2>{}</h2>\n", escape(&section.title)));
        if let Figure::Heatmap {
            rows_per_band,
            total_rows,
            ..
        } = &section.figure
        {
            body.push_str(&format!(
                "<p>Blue = present, grey = missing. {} protein groups{}.</p>\n",
                total_rows,
                if *rows_per_band > 1 {
                    format!(", shaded in bands of {} rows by fraction present", rows_per_band)
                } else {
                    String::new()
                }
            ));
        }
        match (&section.figure, to_plot(&section.figure)) {
            (_, Some(plot)) => {
                let div_id = format!("figure-{i}");
                body.push_str(&plot.to_inline_html(Some(div_id.as_str())));
            }
            (Figure::Table { header, rows }, None) => body.push_str(&html_table(header, rows)),
            (_, None) => {}
        }
        body.push_str("\n<hr style='margin:40px 0;'>\n");
    }
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <script src="{cdn}"></script>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        h1 {{ text-align: center; }}
        h2 {{ margin-top: 50px; }}
        table {{ border-collapse: collapse; }}
        td, th {{ border: 1px solid #ccc; padding: 4px 10px; text-align: left; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
{body}
</body>
</html>
"#,
        title = escape(&report.title),
        cdn = PLOTLY_CDN,
        body = body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn presence(rows: usize) -> PresenceSummary {
        PresenceSummary {
            overview: MatrixOverview {
                rows,
                columns: 2,
                total: rows * 2,
                present: rows,
                missing: rows,
            },
            per_sample: vec![("a".into(), rows), ("b".into(), 0)],
            row_ids: (0..rows).map(|i| format!("P{i}")).collect(),
            samples: vec!["a".into(), "b".into()],
            grid: Array2::from_shape_fn((rows, 2), |(_, j)| u8::from(j == 0)),
        }
    }

    #[test]
    fn heatmap_bands_large_grids() {
        match presence_heatmap(&presence(1000)) {
            Figure::Heatmap {
                fractions,
                rows_per_band,
                row_labels,
                ..
            } => {
                assert_eq!(rows_per_band, 3);
                assert_eq!(fractions.nrows(), 334);
                assert_eq!(row_labels[0], "P0..P2");
                assert_eq!(row_labels[333], "P999");
                assert!(fractions.column(0).iter().all(|&f| f == 1.0));
                assert!(fractions.column(1).iter().all(|&f| f == 0.0));
            }
            other => panic!("unexpected figure {other:?}"),
        }
    }

    #[test]
    fn small_heatmaps_label_rows_by_id() {
        match presence_heatmap(&presence(3)) {
            Figure::Heatmap { row_labels, .. } => assert_eq!(row_labels, vec!["P0", "P1", "P2"]),
            other => panic!("unexpected figure {other:?}"),
        }
    }

    #[test]
    fn histogram_series_drop_missing_values() {
        let m = AbundanceMatrix {
            index_name: "id".into(),
            row_ids: vec!["P1".into(), "P2".into()],
            samples: vec!["s1".into()],
            values: array![[1.0], [f64::NAN]],
            metadata: Vec::new(),
            annotations: Vec::new(),
        };
        match log_histograms(&m) {
            Figure::Histograms { panels, .. } => assert_eq!(panels[0].series[0].values, vec![1.0]),
            other => panic!("unexpected figure {other:?}"),
        }
    }

    #[test]
    fn histogram_dropdown_switches_panels() {
        let panel = |name: &str| HistogramPanel {
            title: name.into(),
            series: vec![
                HistogramSeries::new("Observed", TEAL, vec![1.0, 2.0]),
                HistogramSeries::new("Imputed", RED, vec![0.5]),
            ],
        };
        let figure = Figure::Histograms {
            title: "Histogram of Observed and Imputed Values".into(),
            x_label: "Log(Expression)".into(),
            panels: vec![panel("S1"), panel("S2")],
        };
        let json = to_plot(&figure).unwrap().to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let traces = value["data"].as_array().unwrap();
        assert_eq!(traces.len(), 4);
        assert_eq!(traces[0]["nbinsx"], 50);
        assert_eq!(traces[0]["visible"], true);
        assert_eq!(traces[2]["visible"], false);
        assert_eq!(value["layout"]["barmode"], "overlay");

        let buttons = value["layout"]["updatemenus"][0]["buttons"].as_array().unwrap();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[1]["label"], "S2");
        assert_eq!(buttons[1]["args"][0]["visible"], json!([false, false, true, true]));
    }

    #[test]
    fn html_has_one_section_per_figure_and_escapes() {
        let mut report = SummaryReport::new("Summary Report: Proteomics Data");
        report.push(
            "Protein Count per Sample",
            Figure::Bar {
                labels: vec!["a<b".into()],
                values: vec![3.0],
                y_label: "Protein Count".into(),
            },
        );
        report.push(
            "PCA",
            Figure::Scatter {
                points: vec![("S1".into(), 0.0, 1.0), ("S2".into(), 1.0, 0.0)],
                x_label: "PC1".into(),
                y_label: "PC2".into(),
            },
        );
        report.push(
            "Missing <values>",
            missing_table(&[("S1".into(), 4), ("S2".into(), 1)]),
        );
        let html = render_html(&report);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert_eq!(html.matches("<h2>").count(), 3);
        assert_eq!(html.matches(PLOTLY_CDN).count(), 1);
        assert!(html.contains("figure-0"));
        assert!(html.contains("figure-1"));
        assert!(html.contains("<h2>Missing &lt;values&gt;</h2>"));
        assert!(html.contains("<tr><td>S1</td><td>4</td></tr>"));
    }

    #[test]
    fn renderer_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");
        let report = SummaryReport::new("t");
        HtmlReportRenderer.render(&report, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("<h1>t</h1>"));
    }
}
