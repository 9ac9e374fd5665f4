use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use csv::ReaderBuilder;

use crate::error::IngestError;

const UTF8_BOM: char = '\u{feff}';

/// One data row keyed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestRow {
    /// 1-based line in the source file, for diagnostics.
    pub line: u64,
    cells: HashMap<String, String>,
}

impl ManifestRow {
    pub fn new(line: u64, cells: HashMap<String, String>) -> Self {
        Self { line, cells }
    }

    pub fn from_pairs<K, V>(line: u64, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            line,
            cells: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// Trimmed value of the first listed column that is non-empty.
    pub fn first_non_empty(&self, columns: &[String]) -> Option<&str> {
        columns
            .iter()
            .filter_map(|column| self.get(column))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

/// A parsed report manifest: header names in file order plus the rows.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub headers: Vec<String>,
    pub rows: Vec<ManifestRow>,
}

impl Manifest {
    pub fn from_path(path: &Utf8Path) -> Result<Self, IngestError> {
        let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
            IngestError::ManifestRead {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        Self::parse(&content).map_err(|message| IngestError::ManifestRead {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parses CSV text exported from spreadsheets: a leading BOM and CRLF
    /// line endings are accepted, short rows read missing cells as absent.
    pub fn parse(content: &str) -> Result<Self, String> {
        let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|err| err.to_string())?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| err.to_string())?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let line = record.position().map(|pos| pos.line()).unwrap_or_default();
            let cells = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| (header.clone(), cell.to_string()))
                .collect();
            rows.push(ManifestRow::new(line, cells));
        }

        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
