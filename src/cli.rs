use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    FlattenSummary,
    config::{DEFAULT_LOG_FILE, FlattenOptions, PipelineConfig, required_fields_from_path},
    enrich::{DEFAULT_DEPTH_FIELD, DEFAULT_OBSERVATION_FIELD},
    header::DEFAULT_COMPOUND_FIELD,
    pipeline::{self, SampleOutcome},
    runlog::{RunLog, SampleContext},
    validate::ValidationSummary,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Flatten annotated VCF files into schema-validated TSV tables", long_about = None)]
struct Cli {
    /// Logging verbosity (e.g. error, warn, info, debug)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Flatten one variant file into the intermediate table
    Flatten {
        /// Variant file (plain, gzip or BGZF compressed VCF)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Intermediate TSV output path
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Sample identifier (derived from the input file name if omitted)
        #[arg(long, value_name = "SAMPLE")]
        sample: Option<String>,

        /// Append-only diagnostic log
        #[arg(long, value_name = "FILE", default_value = DEFAULT_LOG_FILE)]
        log_file: PathBuf,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Re-project an intermediate table onto a required-field list
    Validate {
        /// Intermediate TSV produced by `flatten`
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Final TSV output path
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// File listing the required output fields, in order
        #[arg(long, value_name = "FILE")]
        required: PathBuf,

        /// Sample identifier (derived from the input file name if omitted)
        #[arg(long, value_name = "SAMPLE")]
        sample: Option<String>,

        /// Append-only diagnostic log
        #[arg(long, value_name = "FILE", default_value = DEFAULT_LOG_FILE)]
        log_file: PathBuf,
    },

    /// Run both passes for every sample in a YAML configuration
    Run {
        #[arg(long, value_name = "CONFIG")]
        config: PathBuf,
    },
}

#[derive(Debug, Args)]
struct FieldArgs {
    /// INFO field expanded into sub-columns
    #[arg(long, default_value = DEFAULT_COMPOUND_FIELD)]
    compound_field: String,

    /// INFO field holding total read depth
    #[arg(long, default_value = DEFAULT_DEPTH_FIELD)]
    depth_field: String,

    /// INFO field holding alternate allele observations
    #[arg(long, default_value = DEFAULT_OBSERVATION_FIELD)]
    observation_field: String,
}

impl From<FieldArgs> for FlattenOptions {
    fn from(args: FieldArgs) -> Self {
        Self {
            compound_field: args.compound_field,
            depth_field: args.depth_field,
            observation_field: args.observation_field,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Flatten {
            input,
            output,
            sample,
            log_file,
            fields,
        } => {
            let ctx = sample_context(sample, &input, &log_file)?;
            let summary = pipeline::flatten_sample(&ctx, &input, &output, &fields.into())?;
            print_flatten_summary(ctx.sample_id(), &summary);
        }
        Command::Validate {
            input,
            output,
            required,
            sample,
            log_file,
        } => {
            let required = required_fields_from_path(&required)?;
            let ctx = sample_context(sample, &input, &log_file)?;
            let summary = pipeline::validate_sample(&ctx, &input, required, &output)?;
            print_validation_summary(ctx.sample_id(), &summary);
        }
        Command::Run { config } => {
            let config = PipelineConfig::from_path(&config)?;
            let outcomes = pipeline::run_samples(&config)?;
            let failed = print_outcomes(&outcomes);
            if failed > 0 {
                anyhow::bail!("{failed} of {} samples failed", outcomes.len());
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
    Ok(())
}

fn sample_context(sample: Option<String>, input: &Path, log_file: &Path) -> Result<SampleContext> {
    let sample_id = sample
        .or_else(|| derive_sample_name(input))
        .unwrap_or_else(|| String::from("sample"));
    let log = RunLog::open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    Ok(SampleContext::new(sample_id, Arc::new(log)))
}

/// File name without its variant/table extensions: `TUM-001.vcf.gz` → `TUM-001`.
fn derive_sample_name(path: &Path) -> Option<String> {
    const EXTENSIONS: [&str; 6] = [".gz", ".bgz", ".vcf", ".tsv", ".flat", ".final"];

    let mut name = path.file_name()?.to_string_lossy().to_string();
    while let Some(stripped) = EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(ext).map(str::to_string))
    {
        name = stripped;
    }
    Some(name).filter(|s| !s.is_empty())
}

fn print_flatten_summary(sample_id: &str, summary: &FlattenSummary) {
    println!(
        "Sample {sample_id}: processed {total} records; emitted {emitted}.",
        total = summary.total_records,
        emitted = summary.emitted_records,
    );

    if summary.malformed_records > 0 {
        println!(
            "Skipped {count} malformed records (see log).",
            count = summary.malformed_records
        );
    }

    if summary.padded_records > 0 || summary.truncated_records > 0 {
        println!(
            "Compound annotation: {padded} records padded with NA, {truncated} truncated.",
            padded = summary.padded_records,
            truncated = summary.truncated_records
        );
    }

    if summary.vaf_unavailable > 0 {
        println!(
            "VAF unavailable for {count} records.",
            count = summary.vaf_unavailable
        );
    }
}

fn print_validation_summary(sample_id: &str, summary: &ValidationSummary) {
    println!(
        "Sample {sample_id}: wrote {rows} rows.",
        rows = summary.rows
    );
    if !summary.missing_fields.is_empty() {
        println!(
            "Filled missing fields with NA: {}.",
            summary.missing_fields.join(", ")
        );
    }
}

fn print_outcomes(outcomes: &[SampleOutcome]) -> usize {
    let mut failed = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                print_flatten_summary(&outcome.sample_id, &report.flatten);
                print_validation_summary(&outcome.sample_id, &report.validation);
            }
            Err(e) => {
                failed += 1;
                println!("Sample {}: failed: {e:#}", outcome.sample_id);
            }
        }
    }
    failed
}
