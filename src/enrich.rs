//! Per-row metadata: UID, sample type, patient number and VAF.

use std::sync::Arc;

use crate::{
    MISSING,
    table::{Columns, Row},
};

/// Columns prepended to every projected row.
pub const ENRICHED_COLUMNS: [&str; 4] = ["UID", "SAMPLE_TYPE", "PATIENT_NUM", "VAF"];

pub const DEFAULT_DEPTH_FIELD: &str = "DP";
pub const DEFAULT_OBSERVATION_FIELD: &str = "AO";

/// Text before the first `-`, or the whole identifier.
pub fn sample_type(sample_id: &str) -> &str {
    sample_id.split('-').next().unwrap_or(sample_id)
}

/// First maximal run of ASCII digits in the identifier.
pub fn patient_number(sample_id: &str) -> Option<&str> {
    let start = sample_id.find(|c: char| c.is_ascii_digit())?;
    let rest = &sample_id[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Dot-joined identifier of a call within a sample.
pub fn uid(
    sample_id: &str,
    reference: &str,
    alternate: &str,
    quality: &str,
    filter: &str,
) -> String {
    [sample_id, reference, alternate, quality, filter].join(".")
}

/// Percentage of reads supporting the alternate allele; `None` when depth is not positive.
pub fn compute_vaf(depth: f64, observations: f64) -> Option<f64> {
    (depth > 0.0).then(|| 100.0 * observations / depth)
}

pub fn format_vaf(vaf: Option<f64>) -> String {
    match vaf {
        Some(vaf) if vaf.is_finite() => format!("{vaf:.3}"),
        _ => MISSING.to_string(),
    }
}

/// Parses a count column. Per-allele lists (`5,3`) contribute their first value.
fn parse_count(raw: Option<&str>) -> Option<f64> {
    raw?.split(',').next()?.trim().parse::<f64>().ok()
}

fn value_or_missing<'a>(row: &'a Row, name: &str) -> &'a str {
    row.get(name).unwrap_or(MISSING)
}

/// Prepends sample metadata and VAF to projected rows of one sample.
#[derive(Debug, Clone)]
pub struct Enricher {
    sample_id: String,
    sample_type: String,
    patient_number: String,
    depth_field: String,
    observation_field: String,
    columns: Arc<Columns>,
}

impl Enricher {
    pub fn new(
        sample_id: &str,
        projected: &Columns,
        depth_field: &str,
        observation_field: &str,
    ) -> Self {
        let mut names: Vec<String> = ENRICHED_COLUMNS.iter().map(|c| c.to_string()).collect();
        names.extend(projected.names().iter().cloned());

        for field in [depth_field, observation_field] {
            if !projected.contains(field) {
                tracing::warn!(
                    sample = sample_id,
                    field,
                    "VAF input column is not declared in the header; VAF will be NA"
                );
            }
        }

        Self {
            sample_id: sample_id.to_string(),
            sample_type: sample_type(sample_id).to_string(),
            patient_number: patient_number(sample_id).unwrap_or(MISSING).to_string(),
            depth_field: depth_field.to_string(),
            observation_field: observation_field.to_string(),
            columns: Arc::new(Columns::new(names)),
        }
    }

    /// Column names of an enriched row.
    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    /// VAF of a projected row, looked up by column name.
    pub fn vaf(&self, row: &Row) -> Option<f64> {
        let depth = parse_count(row.get(&self.depth_field))?;
        let observations = parse_count(row.get(&self.observation_field))?;
        compute_vaf(depth, observations)
    }

    pub fn enrich(&self, row: Row) -> Row {
        let uid = uid(
            &self.sample_id,
            value_or_missing(&row, "REF"),
            value_or_missing(&row, "ALT"),
            value_or_missing(&row, "QUAL"),
            value_or_missing(&row, "FILTER"),
        );
        let vaf = format_vaf(self.vaf(&row));

        let projected = row.into_values();
        let mut values = Vec::with_capacity(ENRICHED_COLUMNS.len() + projected.len());
        values.push(uid);
        values.push(self.sample_type.clone());
        values.push(self.patient_number.clone());
        values.push(vaf);
        values.extend(projected);

        Row::new(Arc::clone(&self.columns), values)
    }
}
