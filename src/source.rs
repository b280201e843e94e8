//! Record sources feeding the projector.
//!
//! A source yields the header text of one variant file and then one raw
//! query line per record:
//! `CHROM POS ID REF ALT QUAL FILTER <scalar values...> <compound value>`.

use std::io::{self, BufRead};

use noodles::bcf;
use noodles::vcf::{
    self,
    variant::record::{Filters as _, Ids as _},
    variant::record_buf::{
        RecordBuf,
        info::field::{Value, value::Array},
    },
};
use thiserror::Error;

use crate::header::{HeaderSchema, InfoType};

/// Rendered for an absent INFO value.
const ABSENT: &str = ".";

const BCF_MAGIC: &[u8] = b"BCF";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error after line {line}")]
    Io {
        line: u64,
        #[source]
        source: io::Error,
    },
    #[error("invalid variant file header")]
    InvalidHeader(#[source] vcf::header::ParseError),
    #[error("line {line} is not valid UTF-8")]
    InvalidEncoding { line: u64 },
    #[error("invalid record: {0}")]
    InvalidRecord(io::Error),
}

impl SourceError {
    /// Errors confined to a single record; reading can continue past them.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEncoding { .. } | Self::InvalidRecord(_)
        )
    }
}

/// A source of header text and raw query lines.
pub trait RecordSource {
    fn header_text(&self) -> &str;

    /// Next record rendered against `schema`; `None` at end of input.
    fn next_line(&mut self, schema: &HeaderSchema) -> Option<Result<String, SourceError>>;
}

/// Byte-oriented line reader shared by both text sources.
struct Lines<R> {
    inner: R,
    line: u64,
}

impl<R: BufRead> Lines<R> {
    fn new(inner: R) -> Self {
        Self { inner, line: 0 }
    }

    /// Next non-empty line, terminator stripped, with its 1-based line number.
    fn next_line(&mut self) -> Option<Result<(u64, Vec<u8>), SourceError>> {
        loop {
            let mut buf = Vec::new();
            match self.inner.read_until(b'\n', &mut buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    if buf.is_empty() {
                        continue;
                    }
                    return Some(Ok((self.line, buf)));
                }
                Err(source) => {
                    return Some(Err(SourceError::Io {
                        line: self.line,
                        source,
                    }));
                }
            }
        }
    }
}

fn decode(line: u64, bytes: Vec<u8>) -> Result<String, SourceError> {
    String::from_utf8(bytes).map_err(|_| SourceError::InvalidEncoding { line })
}

enum Body<R> {
    Vcf {
        lines: Lines<R>,
        pending: Option<(u64, Vec<u8>)>,
    },
    Bcf {
        reader: bcf::io::Reader<R>,
        records: u64,
    },
}

/// Reads a VCF or BCF stream, standing in for an external field-extraction query.
///
/// The format is chosen from the first bytes of the (already decompressed)
/// stream. Records are decoded with noodles and rendered in query-line layout.
pub struct VariantFileSource<R> {
    header: vcf::Header,
    header_text: String,
    body: Body<R>,
}

impl<R: BufRead> VariantFileSource<R> {
    /// Reads the header; the first record is left unread.
    pub fn new(mut inner: R) -> Result<Self, SourceError> {
        let is_bcf = inner
            .fill_buf()
            .map_err(|source| SourceError::Io { line: 0, source })?
            .starts_with(BCF_MAGIC);

        if is_bcf {
            Self::bcf(inner)
        } else {
            Self::vcf(inner)
        }
    }

    fn vcf(inner: R) -> Result<Self, SourceError> {
        let mut lines = Lines::new(inner);
        let mut header_text = String::new();
        let mut pending = None;

        while let Some(line) = lines.next_line() {
            let (number, bytes) = line?;
            if bytes.first() == Some(&b'#') {
                header_text.push_str(&decode(number, bytes)?);
                header_text.push('\n');
            } else {
                pending = Some((number, bytes));
                break;
            }
        }

        let header = header_text
            .parse::<vcf::Header>()
            .map_err(SourceError::InvalidHeader)?;

        Ok(Self {
            header,
            header_text,
            body: Body::Vcf { lines, pending },
        })
    }

    fn bcf(inner: R) -> Result<Self, SourceError> {
        let mut reader = bcf::io::Reader::from(inner);
        let header = reader
            .read_header()
            .map_err(|source| SourceError::Io { line: 0, source })?;

        let mut buf = Vec::new();
        vcf::io::Writer::new(&mut buf)
            .write_header(&header)
            .map_err(|source| SourceError::Io { line: 0, source })?;
        let header_text = String::from_utf8(buf)
            .map_err(|_| SourceError::InvalidEncoding { line: 0 })?;

        tracing::debug!("reading BCF input");

        Ok(Self {
            header,
            header_text,
            body: Body::Bcf { reader, records: 0 },
        })
    }

    pub fn header(&self) -> &vcf::Header {
        &self.header
    }
}

impl<R: BufRead> RecordSource for VariantFileSource<R> {
    fn header_text(&self) -> &str {
        &self.header_text
    }

    fn next_line(&mut self, schema: &HeaderSchema) -> Option<Result<String, SourceError>> {
        let Self { header, body, .. } = self;
        let header = &*header;

        let record = match body {
            Body::Vcf { lines, pending } => {
                let (number, bytes) = match pending.take() {
                    Some(line) => line,
                    None => match lines.next_line()? {
                        Ok(line) => line,
                        Err(e) => return Some(Err(e)),
                    },
                };
                decode(number, bytes).and_then(|text| parse_vcf_line(header, &text))
            }
            Body::Bcf { reader, records } => {
                let mut record = RecordBuf::default();
                match reader.read_record_buf(header, &mut record) {
                    Ok(0) => return None,
                    Ok(_) => {
                        *records += 1;
                        Ok(record)
                    }
                    Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                        *records += 1;
                        Err(SourceError::InvalidRecord(e))
                    }
                    Err(source) => Err(SourceError::Io {
                        line: *records,
                        source,
                    }),
                }
            }
        };

        Some(record.map(|record| query_line(header, &record, schema)))
    }
}

fn parse_vcf_line(header: &vcf::Header, line: &str) -> Result<RecordBuf, SourceError> {
    let mut record = RecordBuf::default();
    vcf::io::Reader::new(line.as_bytes())
        .read_record_buf(header, &mut record)
        .map_err(SourceError::InvalidRecord)?;
    Ok(record)
}

/// Renders one decoded record in query-line layout.
///
/// Flags render as `1`/`0`, other absent values as `.`. Only the first
/// comma-separated compound entry is kept.
pub fn query_line(header: &vcf::Header, record: &RecordBuf, schema: &HeaderSchema) -> String {
    let info = record.info().as_ref();

    let mut out: Vec<String> = Vec::with_capacity(schema.expected_width());
    out.push(record.reference_sequence_name().to_string());
    out.push(record.variant_start().map(usize::from).unwrap_or(0).to_string());
    out.push(join_or_absent(record.ids().iter(), ";"));
    out.push(record.reference_bases().to_string());
    let alternate_bases: &[String] = record.alternate_bases().as_ref();
    out.push(join_or_absent(alternate_bases, ","));
    out.push(
        record
            .quality_score()
            .map_or_else(|| ABSENT.to_string(), |score| score.to_string()),
    );
    out.push(join_or_absent(
        record.filters().iter(header).filter_map(Result::ok),
        ";",
    ));

    for field in schema.scalar_fields() {
        let value = match (info.get(field.name.as_str()), field.ty) {
            (Some(_), InfoType::Flag) => "1".to_string(),
            (None, InfoType::Flag) => "0".to_string(),
            (Some(Some(value)), _) => render_value(value),
            _ => ABSENT.to_string(),
        };
        out.push(value);
    }

    let compound = match info.get(schema.compound_field()) {
        Some(Some(value)) => render_value(value)
            .split(',')
            .next()
            .unwrap_or(ABSENT)
            .to_string(),
        _ => ABSENT.to_string(),
    };
    out.push(compound);

    out.join("\t")
}

fn join_or_absent<I, S>(values: I, separator: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let values: Vec<S> = values.into_iter().collect();
    if values.is_empty() {
        return ABSENT.to_string();
    }
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(separator)
}

/// INFO value as it appears in VCF text; arrays are comma-joined.
fn render_value(value: &Value) -> String {
    match value {
        Value::Integer(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Flag => "1".to_string(),
        Value::Character(c) => c.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(Array::Integer(values)) => join_optional(values),
        Value::Array(Array::Float(values)) => join_optional(values),
        Value::Array(Array::Character(values)) => join_optional(values),
        Value::Array(Array::String(values)) => join_optional(values),
    }
}

fn join_optional<T: ToString>(values: &[Option<T>]) -> String {
    values
        .iter()
        .map(|value| {
            value
                .as_ref()
                .map_or_else(|| ABSENT.to_string(), ToString::to_string)
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Replays the output of an external field-extraction query.
///
/// Lines are expected in query-line layout already and pass through untouched.
pub struct QueryTextSource<R> {
    lines: Lines<R>,
    header: String,
}

impl<R: BufRead> QueryTextSource<R> {
    pub fn new(header: impl Into<String>, inner: R) -> Self {
        Self {
            lines: Lines::new(inner),
            header: header.into(),
        }
    }
}

impl<R: BufRead> RecordSource for QueryTextSource<R> {
    fn header_text(&self) -> &str {
        &self.header
    }

    fn next_line(&mut self, _schema: &HeaderSchema) -> Option<Result<String, SourceError>> {
        Some(
            self.lines
                .next_line()?
                .and_then(|(number, bytes)| decode(number, bytes)),
        )
    }
}
