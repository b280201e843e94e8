//! Per-sample orchestration of the two streaming passes.
//!
//! Pass one reads the variant file and writes the intermediate table
//! (schema extraction, projection, enrichment). Pass two re-projects that
//! table onto the required fields. Each output is written to a temporary
//! file next to its destination and renamed into place only when complete,
//! so an interrupted run never leaves a partial table behind and a re-run
//! overwrites the previous result.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::{
    FlattenSummary, MISSING,
    config::{FlattenOptions, PipelineConfig},
    enrich::Enricher,
    header::HeaderSchema,
    projector::Projector,
    report::{Resources, RunReport, RunReportBuilder},
    runlog::{RunLog, SampleContext},
    smart_reader,
    source::{RecordSource, VariantFileSource},
    table::TableWriter,
    validate::{RequiredFields, ValidationSummary, validate_table},
};

/// Output locations of one sample.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SampleOutputs {
    pub intermediate: PathBuf,
    pub final_table: PathBuf,
    pub report: PathBuf,
}

impl SampleOutputs {
    /// `<dir>/<sample>.flat.tsv`, `<dir>/<sample>.final.tsv`, `<dir>/<sample>_report.json`.
    pub fn in_dir(dir: &Path, sample_id: &str) -> Self {
        Self {
            intermediate: dir.join(format!("{sample_id}.flat.tsv")),
            final_table: dir.join(format!("{sample_id}.final.tsv")),
            report: dir.join(format!("{sample_id}_report.json")),
        }
    }
}

/// Result of one sample within a batch run.
#[derive(Debug)]
pub struct SampleOutcome {
    pub sample_id: String,
    pub result: Result<RunReport>,
}

/// Streams every record of `source` through projection and enrichment into `output`.
pub fn flatten_records<S, W>(
    ctx: &SampleContext,
    source: &mut S,
    output: W,
    options: &FlattenOptions,
) -> Result<(W, FlattenSummary)>
where
    S: RecordSource + ?Sized,
    W: Write,
{
    let schema = HeaderSchema::from_header_text(source.header_text(), &options.compound_field);
    tracing::debug!(
        sample = ctx.sample_id(),
        scalar_fields = schema.scalar_fields().len(),
        compound_fields = schema.compound_fields().len(),
        query = %schema.query_format().trim_end(),
        "derived header schema"
    );

    let projector = Projector::new(&schema);
    let enricher = Enricher::new(
        ctx.sample_id(),
        projector.columns(),
        &options.depth_field,
        &options.observation_field,
    );
    let mut writer = TableWriter::new(output, enricher.columns().names())
        .context("failed to write intermediate header")?;
    let mut summary = FlattenSummary::default();

    while let Some(line) = source.next_line(&schema) {
        summary.total_records += 1;
        let record = summary.total_records;

        let line = match line {
            Ok(line) => line,
            Err(e) if e.is_record_error() => {
                skip_record(ctx, &mut summary, record, &e)?;
                continue;
            }
            Err(e) => {
                let context = format!("failed to read record {record}");
                return Err(anyhow::Error::new(e).context(context));
            }
        };

        let projected = match projector.project(&line) {
            Ok(projected) => projected,
            Err(e) => {
                skip_record(ctx, &mut summary, record, &e)?;
                continue;
            }
        };

        if projected.padded() {
            tracing::debug!(
                sample = ctx.sample_id(),
                record,
                supplied = projected.supplied(),
                declared = schema.compound_fields().len(),
                "padding compound annotation"
            );
        }
        summary.record_emission(&projected);

        let row = enricher.enrich(projected.into_row());
        if row.get("VAF") == Some(MISSING) {
            summary.vaf_unavailable += 1;
        }
        writer
            .write_row(row.values())
            .context("failed to write intermediate row")?;
    }

    let output = writer.finish()?;
    Ok((output, summary))
}

/// Malformed lines degrade to a per-record diagnostic instead of aborting the sample.
fn skip_record(
    ctx: &SampleContext,
    summary: &mut FlattenSummary,
    record: usize,
    error: &dyn std::fmt::Display,
) -> Result<()> {
    summary.malformed_records += 1;
    ctx.diagnostic(&format!(
        "Sample {}: skipping record {record}: {error}",
        ctx.sample_id()
    ))?;
    Ok(())
}

/// Pass one: variant file to intermediate table.
pub fn flatten_sample(
    ctx: &SampleContext,
    input: &Path,
    output: &Path,
    options: &FlattenOptions,
) -> Result<FlattenSummary> {
    tracing::info!(
        sample = ctx.sample_id(),
        input = %input.display(),
        output = %output.display(),
        "flattening variant file",
    );

    let reader = smart_reader::open_input(input)?;
    let mut source = VariantFileSource::new(reader)
        .with_context(|| format!("failed to read header of {}", input.display()))?;

    write_atomically(output, |out| {
        flatten_records(ctx, &mut source, out, options).map(|(_, summary)| summary)
    })
}

/// Pass two: intermediate table to final table.
pub fn validate_sample(
    ctx: &SampleContext,
    intermediate: &Path,
    required: RequiredFields,
    output: &Path,
) -> Result<ValidationSummary> {
    tracing::info!(
        sample = ctx.sample_id(),
        input = %intermediate.display(),
        output = %output.display(),
        "validating intermediate table",
    );

    let input = File::open(intermediate)
        .with_context(|| format!("failed to open intermediate table {}", intermediate.display()))?;

    write_atomically(output, |out| {
        validate_table(BufReader::new(input), out, required, ctx).map(|(_, summary)| summary)
    })
}

/// Both passes plus the JSON report for one sample.
pub fn run_sample(
    ctx: &SampleContext,
    input: &Path,
    outputs: &SampleOutputs,
    required: RequiredFields,
    options: &FlattenOptions,
    resources: Resources,
) -> Result<RunReport> {
    let flatten = flatten_sample(ctx, input, &outputs.intermediate, options)?;
    let validation = validate_sample(ctx, &outputs.intermediate, required, &outputs.final_table)?;

    let report = RunReportBuilder {
        sample_id: ctx.sample_id().to_string(),
        input_path: input.display().to_string(),
        intermediate_path: outputs.intermediate.display().to_string(),
        final_path: outputs.final_table.display().to_string(),
        options: options.clone(),
        resources,
    }
    .build(&flatten, &validation);

    report
        .write(&outputs.report)
        .with_context(|| format!("failed to write report {}", outputs.report.display()))?;

    Ok(report)
}

/// Runs every configured sample on a pool of `config.threads` workers.
///
/// Configuration problems fail before any sample starts. A failing sample is
/// logged and reported in its outcome without affecting the others.
pub fn run_samples(config: &PipelineConfig) -> Result<Vec<SampleOutcome>> {
    let required = config.validate()?;

    let log = RunLog::open(&config.log_file)
        .with_context(|| format!("failed to open log file {}", config.log_file.display()))?;
    let log = Arc::new(log);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.max(1))
        .build()
        .context("failed to build thread pool")?;

    let resources = Resources {
        threads: config.threads,
        memory_mb: config.memory_mb,
    };

    tracing::info!(
        samples = config.samples.len(),
        threads = config.threads,
        output_dir = %config.output_dir.display(),
        "starting pipeline",
    );

    let outcomes = pool.install(|| {
        config
            .samples
            .par_iter()
            .map(|(sample_id, input)| {
                let ctx = SampleContext::new(sample_id.clone(), Arc::clone(&log));
                let outputs = SampleOutputs::in_dir(&config.output_dir, sample_id);
                let result = run_sample(
                    &ctx,
                    input,
                    &outputs,
                    required.clone(),
                    &config.options,
                    resources,
                );

                if let Err(e) = &result {
                    let message = format!("{e:#}");
                    tracing::error!(
                        sample = %sample_id,
                        error = %message,
                        "sample pipeline failed"
                    );
                    if let Err(log_error) =
                        log.append(&format!("Sample {sample_id}: pipeline failed: {message}"))
                    {
                        tracing::warn!(error = %log_error, "failed to append to run log");
                    }
                }

                SampleOutcome {
                    sample_id: sample_id.clone(),
                    result,
                }
            })
            .collect::<Vec<_>>()
    });

    Ok(outcomes)
}

/// Writes `output` through a sibling temporary file that is renamed into
/// place only after `write` succeeds.
fn write_atomically<T, F>(output: &Path, write: F) -> Result<T>
where
    F: FnOnce(&mut dyn Write) -> Result<T>,
{
    let dir = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;

    let value = {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let value = write(&mut writer)?;
        writer.flush().context("failed to flush output")?;
        value
    };

    temp.persist(output)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to create output {}", output.display()))?;

    Ok(value)
}
