//! Name-indexed rows and tab-separated table I/O.
//!
//! Stages address values by column name; only the writer deals in positions.

use std::{
    collections::HashMap,
    io::{Read, Write},
    sync::Arc,
};

use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};

use crate::MISSING;

/// Ordered column names with a name → position index.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    /// Builds the index. When a name repeats, lookups resolve to its first position.
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(position);
        }
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One table row. Column metadata is shared by every row of a table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Row {
    columns: Arc<Columns>,
    values: Vec<String>,
}

impl Row {
    pub fn new(columns: Arc<Columns>, values: Vec<String>) -> Self {
        Self { columns, values }
    }

    /// Value of the named column, `None` when the column is unknown or the
    /// row is too short to carry it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .position(name)
            .and_then(|position| self.values.get(position))
            .map(String::as_str)
    }

    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

/// Writes a header line followed by rows, tab-delimited and unquoted.
pub struct TableWriter<W: Write> {
    inner: csv::Writer<W>,
}

impl<W: Write> TableWriter<W> {
    pub fn new(writer: W, header: &[String]) -> csv::Result<Self> {
        let mut inner = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .has_headers(false)
            .from_writer(writer);
        inner.write_record(header)?;
        Ok(Self { inner })
    }

    /// Writes one row. A row made of a single empty value is written as
    /// [`MISSING`]: csv would otherwise quote it as `""`, and a bare empty
    /// line would be read back as no row at all.
    pub fn write_row<T: AsRef<str>>(&mut self, values: &[T]) -> csv::Result<()> {
        match values {
            [only] if only.as_ref().is_empty() => self.inner.write_record([MISSING]),
            _ => self.inner.write_record(values.iter().map(AsRef::<str>::as_ref)),
        }
    }

    /// Flushes buffered rows and returns the underlying writer.
    pub fn finish(self) -> anyhow::Result<W> {
        self.inner
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush table: {}", e.error()))
    }
}

/// Reads a tab-delimited table whose first line names its columns.
pub struct TableReader<R: Read> {
    inner: csv::Reader<R>,
    columns: Arc<Columns>,
}

impl<R: Read> TableReader<R> {
    pub fn new(reader: R) -> csv::Result<Self> {
        let mut inner = ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);
        let names = inner
            .headers()?
            .iter()
            .map(|name| name.trim_matches('\u{feff}').to_string())
            .collect();
        Ok(Self {
            inner,
            columns: Arc::new(Columns::new(names)),
        })
    }

    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    /// Reads the next row; `None` at end of input.
    pub fn next_row(&mut self) -> Option<csv::Result<Row>> {
        let mut record = StringRecord::new();
        match self.inner.read_record(&mut record) {
            Ok(true) => {
                let values = record.iter().map(str::to_string).collect();
                Some(Ok(Row::new(Arc::clone(&self.columns), values)))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
