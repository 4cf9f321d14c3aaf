// main.rs

// --- External Crate Imports ---
use anyhow::{anyhow, Context, Error, Result};
use clap::Parser;
use log::{debug, info, warn};
use proteomic_prep::{
    config::AnnotationField,
    export::Artifact,
    impute::{EmptyColumnPolicy, ImputationParams},
    loader::{AnnotationSource, ColumnCleaner, TsvAnnotationFile, TsvMatrixFile},
    pipeline, PipelineConfig,
};
use std::{path::Path, time::Instant};

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting proteomic_prep with args: {:?}", cli_args);

    // --- 1. Build configuration ---
    let config = cli_args.pipeline_config()?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    debug!("Pipeline configuration: {:?}", config);

    let cleaner = if cli_args.header_patterns.is_empty() {
        ColumnCleaner::with_default_patterns()?
    } else {
        info!(
            "Using {} custom header cleaning pattern(s).",
            cli_args.header_patterns.len()
        );
        ColumnCleaner::new(cli_args.header_patterns.as_slice())?
    };

    if !cli_args.input.is_file() {
        return Err(anyhow!(
            "Input matrix not found: {}",
            cli_args.input.display()
        ));
    }
    let matrix_source = TsvMatrixFile::new(&cli_args.input, cleaner);
    let annotation_file = cli_args.annotations.as_ref().map(|path| {
        info!(
            "Annotations: {} (key column '{}')",
            path.display(),
            cli_args.annotation_key
        );
        TsvAnnotationFile::new(
            path,
            cli_args.annotation_key.clone(),
            config.annotation_fields.iter().map(|f| f.source.clone()).collect(),
        )
    });

    // --- 2. Run all stages ---
    info!("Processing {}...", cli_args.input.display());
    let outputs = pipeline::run(
        &config,
        &matrix_source,
        annotation_file.as_ref().map(|a| a as &dyn AnnotationSource),
    )
    .with_context(|| format!("Pipeline failed for {}", cli_args.input.display()))?;
    info!(
        "Pipeline complete: {} proteins x {} samples after filtering and imputation.",
        outputs.imputed.matrix.nrows(),
        outputs.imputed.matrix.nsamples()
    );

    // --- 3. Write Outputs ---
    output_writer::prepare_output_dir(&cli_args.output_dir)?;
    let written = output_writer::write_all(&outputs, &cli_args.output_dir)?;
    info!(
        "Wrote {} files to {}.",
        written,
        cli_args.output_dir.display()
    );

    info!(
        "proteomic_prep finished successfully in {:.2?}.",
        total_time_start.elapsed()
    );
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use super::{AnnotationField, EmptyColumnPolicy, ImputationParams, PipelineConfig, Result};
    use clap::Parser; // For the derive macro to find Parser
    use proteomic_prep::config::{
        DEFAULT_ANNOTATION_KEY, DEFAULT_EXCLUDE_COLS, DEFAULT_VALIDITY_THRESHOLD,
    };
    use proteomic_prep::impute::{DEFAULT_SCALE, DEFAULT_SHIFT};
    use std::path::PathBuf;

    #[derive(Parser, Debug)]
    #[command(author, version, about = "Proteomics abundance matrix preprocessing: cleaning, annotation, filtering, imputation and PCA.", long_about = None, propagate_version = true)]
    pub(crate) struct CliArgs {
        /// Raw protein x sample matrix (tab-separated, first column is the row id).
        #[arg(short, long, required = true)]
        pub(crate) input: PathBuf,

        /// Annotation table (tab-separated). Without it the annotation stage is skipped.
        #[arg(short, long)]
        pub(crate) annotations: Option<PathBuf>,

        #[arg(long, default_value = DEFAULT_ANNOTATION_KEY)]
        pub(crate) annotation_key: String,

        /// SOURCE=COLUMN[=LABEL]; repeatable. Defaults to KEGG, GO CC and GO MF names.
        #[arg(long = "annotation-field")]
        pub(crate) annotation_fields: Vec<AnnotationField>,

        #[arg(short, long = "out", default_value = "output")]
        pub(crate) output_dir: PathBuf,

        #[arg(long, default_value_t = DEFAULT_VALIDITY_THRESHOLD)]
        pub(crate) validity_threshold: f64,

        #[arg(long, default_value_t = DEFAULT_SHIFT)]
        pub(crate) imputation_shift: f64,

        #[arg(long, default_value_t = DEFAULT_SCALE)]
        pub(crate) imputation_scale: f64,

        /// Metadata column kept out of the numeric stages; repeatable.
        #[arg(long = "exclude-col")]
        pub(crate) exclude_cols: Vec<String>,

        /// Regex removed from sample headers; repeatable. Replaces the built-in set.
        #[arg(long = "header-pattern")]
        pub(crate) header_patterns: Vec<String>,

        /// Leave all-missing sample columns unimputed instead of failing.
        #[arg(long)]
        pub(crate) skip_empty_columns: bool,

        #[arg(long)]
        pub(crate) seed: Option<u64>,

        #[arg(long, default_value = "Info")]
        pub(crate) log_level: String,
    }

    impl CliArgs {
        pub(crate) fn pipeline_config(&self) -> Result<PipelineConfig> {
            let exclude_cols = if self.exclude_cols.is_empty() {
                DEFAULT_EXCLUDE_COLS.iter().map(|s| s.to_string()).collect()
            } else {
                self.exclude_cols.clone()
            };
            let annotation_fields = if self.annotation_fields.is_empty() {
                AnnotationField::defaults()
            } else {
                self.annotation_fields.clone()
            };
            Ok(PipelineConfig {
                validity_threshold: self.validity_threshold,
                imputation: ImputationParams {
                    shift: self.imputation_shift,
                    scale: self.imputation_scale,
                    on_empty_column: if self.skip_empty_columns {
                        EmptyColumnPolicy::Skip
                    } else {
                        EmptyColumnPolicy::Fail
                    },
                },
                exclude_cols,
                annotation_fields,
                seed: self.seed,
            })
        }
    }
}

mod output_writer {
    use super::{anyhow, info, warn, Artifact, Path, Result};
    use indicatif::{ProgressBar, ProgressStyle};
    use proteomic_prep::PipelineOutputs;

    pub(crate) fn prepare_output_dir(dir: &Path) -> Result<()> {
        if dir.exists() {
            if !dir.is_dir() {
                return Err(anyhow!(
                    "Output path exists and is not a directory: {}",
                    dir.display()
                ));
            }
            return Ok(());
        }
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("Failed to create output directory {}: {}", dir.display(), e))?;
        info!("Created output directory: {}", dir.display());
        Ok(())
    }

    /// Writes every artifact of the run; returns how many files were written.
    pub(crate) fn write_all(outputs: &PipelineOutputs, dir: &Path) -> Result<usize> {
        let artifacts = Artifact::for_run(outputs);
        if !outputs.annotations_loaded {
            warn!("Skipping annotation outputs (no annotation table).");
        }

        let style = ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}",
            )
            .map_err(|e| anyhow!("Failed to create progress bar style: {}", e))?
            .progress_chars("=> ");
        let pb = ProgressBar::new(artifacts.len() as u64).with_style(style);

        for artifact in &artifacts {
            let file_name = artifact.file_name(outputs.config.validity_threshold);
            let path = dir.join(&file_name);
            pb.set_message(file_name.clone());
            artifact
                .write(outputs, &path)
                .map_err(|e| anyhow!("Failed to write output file {}: {}", path.display(), e))?;
            pb.println(format!("Saved: {}", path.display()));
            pb.inc(1);
        }
        pb.finish_with_message("Export complete.");
        Ok(artifacts.len())
    }
}
