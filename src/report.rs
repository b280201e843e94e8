//! Structured run report for downstream tool consumption.
//!
//! Written as JSON next to the final table of each sample: sample metadata,
//! paths, options and the statistics of both passes.

use std::path::Path;

use serde::Serialize;

use crate::{FlattenSummary, config::FlattenOptions, enrich, validate::ValidationSummary};

/// Complete report of one sample's pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Tool version
    pub version: String,
    /// Timestamp of run (RFC 3339)
    pub timestamp: String,
    pub sample: SampleInfo,
    pub input: String,
    pub outputs: OutputInfo,
    pub options: FlattenOptions,
    pub resources: Resources,
    pub flatten: FlattenSummary,
    pub validation: ValidationSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleInfo {
    pub id: String,
    pub sample_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputInfo {
    pub intermediate: String,
    pub final_table: String,
}

/// Resource hints the run was configured with.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Resources {
    pub threads: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
}

impl RunReport {
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        tracing::info!("Wrote run report to {}", path.display());
        Ok(())
    }
}

/// Builder for constructing a RunReport during a sample run.
#[derive(Debug, Default)]
pub struct RunReportBuilder {
    pub sample_id: String,
    pub input_path: String,
    pub intermediate_path: String,
    pub final_path: String,
    pub options: FlattenOptions,
    pub resources: Resources,
}

impl RunReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self, flatten: &FlattenSummary, validation: &ValidationSummary) -> RunReport {
        let now = time::OffsetDateTime::now_utc();
        let timestamp = now
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());

        RunReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp,
            sample: SampleInfo {
                sample_type: enrich::sample_type(&self.sample_id).to_string(),
                patient_number: enrich::patient_number(&self.sample_id).map(str::to_string),
                id: self.sample_id,
            },
            input: self.input_path,
            outputs: OutputInfo {
                intermediate: self.intermediate_path,
                final_table: self.final_path,
            },
            options: self.options,
            resources: self.resources,
            flatten: flatten.clone(),
            validation: validation.clone(),
        }
    }
}
