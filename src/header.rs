//! Schema discovery from VCF header text.
//!
//! The output table of a sample is not known until its header has been read:
//! every `##INFO` declaration becomes a scalar column and the compound
//! annotation (VEP's `CSQ` by default) is expanded into one column per
//! sub-field named in its `Format: a|b|c` description.

/// Positional columns emitted ahead of the annotation values.
pub const FIXED_COLUMNS: [&str; 7] = ["CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER"];

/// Default compound annotation field.
pub const DEFAULT_COMPOUND_FIELD: &str = "CSQ";

const INFO_PREFIX: &str = "##INFO=";
const FORMAT_MARKER: &str = "Format: ";

/// Declared value type of an INFO field.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InfoType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

impl InfoType {
    fn parse(raw: &str) -> Self {
        match raw {
            "Integer" => Self::Integer,
            "Float" => Self::Float,
            "Flag" => Self::Flag,
            "Character" => Self::Character,
            _ => Self::String,
        }
    }
}

/// A single-valued INFO field declared in the header.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScalarField {
    pub name: String,
    pub ty: InfoType,
}

/// Column layout of one sample, derived once from its header.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HeaderSchema {
    compound_field: String,
    scalar_fields: Vec<ScalarField>,
    compound_fields: Vec<String>,
}

impl HeaderSchema {
    /// Extracts the schema from raw header text.
    ///
    /// Scalar fields keep their first-seen order and duplicates are ignored.
    /// A missing compound declaration yields zero expansion columns rather
    /// than an error.
    pub fn from_header_text(text: &str, compound_field: &str) -> Self {
        let mut scalar_fields: Vec<ScalarField> = Vec::new();
        let mut compound_fields = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if !line.starts_with(INFO_PREFIX) {
                continue;
            }

            let Some(name) = declared_name(line) else {
                tracing::debug!(line, "skipping INFO declaration without an ID");
                continue;
            };

            if name == compound_field {
                if compound_fields.is_none() {
                    compound_fields = Some(parse_format_description(line));
                }
                continue;
            }

            if scalar_fields.iter().any(|field| field.name == name) {
                continue;
            }

            scalar_fields.push(ScalarField {
                name: name.to_string(),
                ty: declared_type(line),
            });
        }

        if compound_fields.is_none() {
            tracing::debug!(
                field = compound_field,
                "no compound annotation declaration in header; expansion columns omitted"
            );
        }

        Self {
            compound_field: compound_field.to_string(),
            scalar_fields,
            compound_fields: compound_fields.unwrap_or_default(),
        }
    }

    pub fn compound_field(&self) -> &str {
        &self.compound_field
    }

    pub fn scalar_fields(&self) -> &[ScalarField] {
        &self.scalar_fields
    }

    pub fn scalar_names(&self) -> impl Iterator<Item = &str> {
        self.scalar_fields.iter().map(|field| field.name.as_str())
    }

    /// Sub-field names of the compound annotation, in declared order.
    pub fn compound_fields(&self) -> &[String] {
        &self.compound_fields
    }

    /// Width of a raw query line: fixed columns, scalar values, compound value.
    pub fn expected_width(&self) -> usize {
        FIXED_COLUMNS.len() + self.scalar_fields.len() + 1
    }

    /// Column names of a projected row.
    pub fn projected_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(self.scalar_fields.iter().map(|field| field.name.clone()));
        columns.extend(
            self.compound_fields
                .iter()
                .map(|sub| format!("{}_{}", self.compound_field, sub)),
        );
        columns
    }

    /// Field-extraction format string equivalent to the raw query line layout,
    /// in the `%CHROM\t%POS...` notation of external query tools.
    pub fn query_format(&self) -> String {
        let mut parts: Vec<String> = FIXED_COLUMNS.iter().map(|c| format!("%{c}")).collect();
        parts.extend(self.scalar_names().map(|name| format!("%INFO/{name}")));
        parts.push(format!("%INFO/{}", self.compound_field));
        format!("{}\n", parts.join("\t"))
    }
}

/// The ID of a structured header line: its 4th component when split on
/// `=`, `<` and `,` (`##INFO`, ``, `ID`, `<name>`).
fn declared_name(line: &str) -> Option<&str> {
    line.split(['=', '<', ','])
        .nth(3)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn declared_type(line: &str) -> InfoType {
    let components: Vec<&str> = line.split(['=', '<', ',', '>']).collect();
    components
        .windows(2)
        .find(|pair| pair[0] == "Type")
        .map(|pair| InfoType::parse(pair[1]))
        .unwrap_or(InfoType::String)
}

fn parse_format_description(line: &str) -> Vec<String> {
    let Some(start) = line.find(FORMAT_MARKER) else {
        tracing::debug!(line, "compound annotation declared without a Format description");
        return Vec::new();
    };

    let rest = &line[start + FORMAT_MARKER.len()..];
    let description = rest.split('"').next().unwrap_or_default();
    if description.trim().is_empty() {
        return Vec::new();
    }

    description
        .split('|')
        .map(|name| name.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total read depth\">\n\
##INFO=<ID=AO,Number=A,Type=Integer,Description=\"Alternate allele observations\">\n\
##INFO=<ID=CSQ,Number=.,Type=String,Description=\"Consequence annotations from Ensembl VEP. Format: Allele|Consequence|IMPACT|SYMBOL\">\n\
##INFO=<ID=SOMATIC,Number=0,Type=Flag,Description=\"Somatic call\">\n\
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"duplicate\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

    #[test]
    fn extracts_scalar_fields_in_declaration_order() {
        let schema = HeaderSchema::from_header_text(HEADER, "CSQ");
        let names: Vec<&str> = schema.scalar_names().collect();
        assert_eq!(names, ["DP", "AO", "SOMATIC"]);
        assert_eq!(schema.scalar_fields()[2].ty, InfoType::Flag);
    }

    #[test]
    fn extracts_compound_sub_fields() {
        let schema = HeaderSchema::from_header_text(HEADER, "CSQ");
        assert_eq!(
            schema.compound_fields(),
            ["Allele", "Consequence", "IMPACT", "SYMBOL"]
        );
        assert_eq!(schema.expected_width(), 7 + 3 + 1);
    }

    #[test]
    fn missing_compound_declaration_yields_no_expansion() {
        let header = "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n";
        let schema = HeaderSchema::from_header_text(header, "CSQ");
        assert!(schema.compound_fields().is_empty());
        assert_eq!(
            schema.projected_columns(),
            ["CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "DP"]
        );
    }

    #[test]
    fn projected_columns_prefix_sub_fields() {
        let schema = HeaderSchema::from_header_text(HEADER, "CSQ");
        let columns = schema.projected_columns();
        assert_eq!(columns.len(), 7 + 3 + 4);
        assert_eq!(columns[10], "CSQ_Allele");
        assert_eq!(columns[13], "CSQ_SYMBOL");
    }

    #[test]
    fn alternative_compound_field_name() {
        let header = "##INFO=<ID=ANN,Number=.,Type=String,Description=\"Functional annotations: Format: Allele|Annotation\">\n";
        let schema = HeaderSchema::from_header_text(header, "ANN");
        assert_eq!(schema.compound_fields(), ["Allele", "Annotation"]);
        assert_eq!(schema.projected_columns().last().unwrap(), "ANN_Annotation");
    }

    #[test]
    fn extraction_is_idempotent() {
        let first = HeaderSchema::from_header_text(HEADER, "CSQ");
        let second = HeaderSchema::from_header_text(HEADER, "CSQ");
        assert_eq!(first, second);
    }

    #[test]
    fn query_format_lists_every_field() {
        let header = "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n";
        let schema = HeaderSchema::from_header_text(header, "CSQ");
        assert_eq!(
            schema.query_format(),
            "%CHROM\t%POS\t%ID\t%REF\t%ALT\t%QUAL\t%FILTER\t%INFO/DP\t%INFO/CSQ\n"
        );
    }
}
