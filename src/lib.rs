#![doc = include_str!("../README.md")]

pub mod cli;
pub mod config;
pub mod enrich;
pub mod header;
pub mod pipeline;
pub mod projector;
pub mod report;
pub mod runlog;
pub mod smart_reader;
pub mod source;
pub mod table;
pub mod validate;

use serde::Serialize;

pub use config::{ConfigError, FlattenOptions, PipelineConfig};
pub use header::HeaderSchema;
pub use pipeline::{SampleOutputs, flatten_sample, run_sample, run_samples, validate_sample};
pub use runlog::{RunLog, SampleContext};
pub use validate::{RequiredFields, ValidationSummary};

/// Placeholder written for absent or unusable values.
pub const MISSING: &str = "NA";

/// Counts gathered while flattening one sample.
#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq)]
pub struct FlattenSummary {
    pub total_records: usize,
    pub emitted_records: usize,
    /// Records skipped because their width disagreed with the header.
    pub malformed_records: usize,
    /// Records carrying fewer compound values than declared.
    pub padded_records: usize,
    /// Records carrying more compound values than declared.
    pub truncated_records: usize,
    /// Emitted rows whose VAF is `NA`.
    pub vaf_unavailable: usize,
}

impl FlattenSummary {
    pub fn record_emission(&mut self, row: &projector::ProjectedRow) {
        self.emitted_records += 1;
        if row.padded() {
            self.padded_records += 1;
        }
        if row.truncated() {
            self.truncated_records += 1;
        }
    }
}
