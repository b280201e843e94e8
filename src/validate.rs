//! Re-projection of an intermediate table onto the required output fields.

use std::io::{self, Read, Write};

use serde::Serialize;
use thiserror::Error;

use crate::{
    MISSING,
    config::ConfigError,
    runlog::SampleContext,
    table::{TableReader, TableWriter},
};

/// Ordered field names forming the contract of the final table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequiredFields(Vec<String>);

impl RequiredFields {
    /// Blank names are dropped; an empty list is a configuration error.
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ConfigError::MissingRequiredFields);
        }
        Ok(Self(names))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("failed to read intermediate table")]
    Read(#[from] csv::Error),
    #[error("failed to write diagnostic to run log")]
    Log(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValidatorState {
    /// Header read, no rows consumed yet.
    Open,
    Streaming,
    /// End of input or a read error; no further rows.
    Closed,
}

/// Counts for one validation pass.
#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq)]
pub struct ValidationSummary {
    pub rows: usize,
    pub missing_fields: Vec<String>,
}

/// `[!!!WARNING!!!] Sample <id>: Missing fields: <a, b>. Filling with 'NA'.`
pub fn missing_fields_message(sample_id: &str, missing: &[String]) -> String {
    format!(
        "[!!!WARNING!!!] Sample {sample_id}: Missing fields: {}. Filling with '{MISSING}'.",
        missing.join(", ")
    )
}

/// Streams rows of an intermediate table re-projected onto [`RequiredFields`].
pub struct Validator<R: Read> {
    reader: TableReader<R>,
    required: RequiredFields,
    missing: Vec<String>,
    state: ValidatorState,
    rows: usize,
}

impl<R: Read> Validator<R> {
    /// Reads the table header and reports missing fields once for the sample.
    pub fn open(
        reader: R,
        required: RequiredFields,
        ctx: &SampleContext,
    ) -> Result<Self, ValidateError> {
        let reader = TableReader::new(reader)?;

        let missing: Vec<String> = required
            .names()
            .iter()
            .filter(|name| !reader.columns().contains(name))
            .cloned()
            .collect();

        if !missing.is_empty() {
            ctx.diagnostic(&missing_fields_message(ctx.sample_id(), &missing))?;
        }

        Ok(Self {
            reader,
            required,
            missing,
            state: ValidatorState::Open,
            rows: 0,
        })
    }

    pub fn header(&self) -> &[String] {
        self.required.names()
    }

    pub fn state(&self) -> ValidatorState {
        self.state
    }

    /// Next output row, values in required-field order.
    pub fn next_row(&mut self) -> Option<Result<Vec<String>, ValidateError>> {
        if self.state == ValidatorState::Closed {
            return None;
        }

        match self.reader.next_row() {
            Some(Ok(row)) => {
                self.state = ValidatorState::Streaming;
                self.rows += 1;
                let values = self
                    .required
                    .names()
                    .iter()
                    .map(|name| row.get(name).unwrap_or(MISSING).to_string())
                    .collect();
                Some(Ok(values))
            }
            Some(Err(e)) => {
                self.state = ValidatorState::Closed;
                Some(Err(e.into()))
            }
            None => {
                self.state = ValidatorState::Closed;
                None
            }
        }
    }

    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            rows: self.rows,
            missing_fields: self.missing.clone(),
        }
    }
}

/// Runs a full validation pass from `input` to `output`.
pub fn validate_table<R, W>(
    input: R,
    output: W,
    required: RequiredFields,
    ctx: &SampleContext,
) -> anyhow::Result<(W, ValidationSummary)>
where
    R: Read,
    W: Write,
{
    let mut validator = Validator::open(input, required, ctx)?;
    let mut writer = TableWriter::new(output, validator.header())?;

    while let Some(row) = validator.next_row() {
        writer.write_row(&row?)?;
    }

    let summary = validator.summary();
    tracing::debug!(
        sample = ctx.sample_id(),
        rows = summary.rows,
        missing = summary.missing_fields.len(),
        "validation pass complete"
    );
    Ok((writer.finish()?, summary))
}
