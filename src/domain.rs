use std::fmt;

use camino::Utf8PathBuf;
use serde::Serialize;

/// The identifier pair that keys a sample across a vendor's reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SampleKey {
    path_number: String,
    mp_number: String,
}

impl SampleKey {
    pub fn new(path_number: impl Into<String>, mp_number: impl Into<String>) -> Self {
        Self {
            path_number: path_number.into(),
            mp_number: mp_number.into(),
        }
    }

    pub fn path_number(&self) -> &str {
        &self.path_number
    }

    pub fn mp_number(&self) -> &str {
        &self.mp_number
    }

    /// Object id the data hub registers the report under.
    pub fn drs_id(&self) -> String {
        format!("drs_{self}")
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.path_number, self.mp_number)
    }
}

/// Facts extracted from one manifest row. Text fields are trimmed and empty
/// when the manifest had nothing; dates are canonical timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub key: SampleKey,
    pub patient_name: String,
    pub history_number: String,
    pub block_number: String,
    pub tumor_purity: String,
    pub diagnosis: String,
    pub test_item: String,
    pub physician: String,
    pub fiscal_year: i32,
    pub receive_date: Option<String>,
    pub sign_date: Option<String>,
    pub report_date: Option<String>,
    pub turnaround_time: String,
}

impl SampleRecord {
    pub fn path_number(&self) -> &str {
        self.key.path_number()
    }

    pub fn mp_number(&self) -> &str {
        self.key.mp_number()
    }
}

/// A sample's report folder as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportDirectoryRef {
    pub path: Utf8PathBuf,
    /// Directory template that matched, e.g. `{path}_({mp})`.
    pub pattern: String,
}
