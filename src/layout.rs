use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tracing::debug;

use crate::domain::{ReportDirectoryRef, SampleKey};
use crate::error::IngestError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("static regex"));

/// Folder-name template for a sample's reports, using `{path}` for the
/// Path No. and `{mp}` for the MP No.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPattern(String);

impl DirectoryPattern {
    /// Conventions seen across vendors, most common first.
    pub fn defaults() -> Vec<Self> {
        ["{path}_{mp}", "{path}_({mp})", "{mp}_{path}"]
            .into_iter()
            .map(|template| Self(template.to_string()))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, key: &SampleKey) -> String {
        self.0
            .replace("{path}", key.path_number())
            .replace("{mp}", key.mp_number())
    }
}

impl fmt::Display for DirectoryPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DirectoryPattern {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let template = value.trim();
        let invalid = |reason: String| IngestError::InvalidProfile(format!("{template:?}: {reason}"));

        if template.contains('/') || template.contains('\\') {
            return Err(invalid("directory pattern must be a single folder name".to_string()));
        }
        let mut placeholders = 0;
        for capture in PLACEHOLDER.captures_iter(template) {
            match &capture[1] {
                "path" | "mp" => placeholders += 1,
                other => return Err(invalid(format!("unknown placeholder {{{other}}}"))),
            }
        }
        if placeholders == 0 {
            return Err(invalid("pattern must use {path} or {mp}".to_string()));
        }
        Ok(Self(template.to_string()))
    }
}

/// Where one vendor's report folders and handoff payloads live:
/// everything sits under `{prefix}/{vendor}`.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    prefix: Utf8PathBuf,
    vendor: String,
}

impl ReportLayout {
    pub fn new(prefix: impl Into<Utf8PathBuf>, vendor: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vendor: vendor.into(),
        }
    }

    pub fn prefix(&self) -> &Utf8Path {
        &self.prefix
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn vendor_root(&self) -> Utf8PathBuf {
        self.prefix.join(&self.vendor)
    }

    /// Raw descriptors captured from the upload call.
    pub fn upload_result_path(&self, key: &SampleKey) -> Utf8PathBuf {
        self.vendor_root().join(format!("{key}_tmp.json"))
    }

    /// Enriched descriptors handed to the register call.
    pub fn enriched_payload_path(&self, key: &SampleKey) -> Utf8PathBuf {
        self.vendor_root().join(format!("{key}_upload.json"))
    }

    pub fn register_result_path(&self, key: &SampleKey) -> Utf8PathBuf {
        self.vendor_root().join(format!("{key}_register.json"))
    }

    /// Remote folder the report files are uploaded into.
    pub fn upload_destination(&self, key: &SampleKey) -> String {
        format!("{}/{key}/", self.vendor)
    }
}

/// First existing `{prefix}/{vendor}/{pattern}` directory, trying the
/// patterns in order.
pub fn resolve_report_dir(
    layout: &ReportLayout,
    patterns: &[DirectoryPattern],
    key: &SampleKey,
) -> Result<ReportDirectoryRef, IngestError> {
    let root = layout.vendor_root();
    for pattern in patterns {
        let candidate = root.join(pattern.render(key));
        if candidate.as_std_path().is_dir() {
            debug!(%key, pattern = %pattern, dir = %candidate, "resolved report directory");
            return Ok(ReportDirectoryRef {
                path: candidate,
                pattern: pattern.to_string(),
            });
        }
    }
    Err(IngestError::DirectoryNotFound {
        path_number: key.path_number().to_string(),
        mp_number: key.mp_number().to_string(),
        searched: root,
    })
}
