use std::sync::Arc;

use thiserror::Error;

use crate::{
    MISSING,
    header::HeaderSchema,
    table::{Columns, Row},
};

/// Errors raised while projecting an individual record.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RecordError {
    #[error("malformed record: expected {expected} tab-delimited columns, found {found}")]
    MalformedRecord { expected: usize, found: usize },
}

/// A record laid out in schema order: fixed columns, scalar values, then
/// exactly one value per compound sub-field.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProjectedRow {
    row: Row,
    supplied: usize,
    declared: usize,
}

impl ProjectedRow {
    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn into_row(self) -> Row {
        self.row
    }

    /// Number of `|`-separated values the record carried.
    pub fn supplied(&self) -> usize {
        self.supplied
    }

    /// The record carried fewer compound values than the schema declares.
    pub fn padded(&self) -> bool {
        self.supplied < self.declared
    }

    /// The record carried more compound values than the schema declares.
    pub fn truncated(&self) -> bool {
        self.supplied > self.declared
    }
}

/// Projects raw query lines onto one sample's schema.
#[derive(Debug, Clone)]
pub struct Projector {
    columns: Arc<Columns>,
    expected_width: usize,
    declared: usize,
}

impl Projector {
    pub fn new(schema: &HeaderSchema) -> Self {
        Self {
            columns: Arc::new(Columns::new(schema.projected_columns())),
            expected_width: schema.expected_width(),
            declared: schema.compound_fields().len(),
        }
    }

    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    /// Projects one tab-delimited line (`CHROM..FILTER`, scalar values,
    /// raw compound value).
    ///
    /// Every column but the last is copied verbatim. The last is split on `|`
    /// and truncated or padded with `NA` to the declared sub-field count.
    /// A line whose width disagrees with the schema is rejected instead of
    /// being projected onto the wrong columns.
    pub fn project(&self, line: &str) -> Result<ProjectedRow, RecordError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.split('\t').collect();

        if fields.len() != self.expected_width {
            return Err(RecordError::MalformedRecord {
                expected: self.expected_width,
                found: fields.len(),
            });
        }

        let Some((compound, leading)) = fields.split_last() else {
            return Err(RecordError::MalformedRecord {
                expected: self.expected_width,
                found: 0,
            });
        };

        let compound_values = split_compound(compound);

        let mut values = Vec::with_capacity(self.columns.len());
        values.extend(leading.iter().map(|value| value.to_string()));
        values.extend(
            (0..self.declared).map(|i| {
                compound_values
                    .get(i)
                    .map_or_else(|| MISSING.to_string(), |value| value.to_string())
            }),
        );

        Ok(ProjectedRow {
            row: Row::new(Arc::clone(&self.columns), values),
            supplied: compound_values.len(),
            declared: self.declared,
        })
    }
}

/// Splits a raw compound value. An absent value (`.` or empty) carries no sub-values.
fn split_compound(raw: &str) -> Vec<&str> {
    match raw.trim() {
        "" | "." => Vec::new(),
        raw => raw.split('|').collect(),
    }
}
