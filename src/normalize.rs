use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::domain::SampleKey;
use crate::error::IngestError;

pub const BIOBANK_MARKER: &str = "BioBank";
pub const GLOBAL_MARKER: &str = "Global";
pub const BIOBANK_SUFFIX: &str =
    "Exclude_variant_in_Taiwan_BioBank_with_over_1_percent_allele_frequency";
pub const BIOBANK_GLOBAL_SUFFIX: &str =
    "Exclude_variant_in_Taiwan_BioBank_with_over_1_percent_allele_frequency_Global";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedReport {
    pub from: Utf8PathBuf,
    pub to: Utf8PathBuf,
}

/// Canonical file name for a report PDF, or `None` for non-PDF files.
pub fn canonical_report_name(file_name: &str, key: &SampleKey) -> Option<String> {
    if !file_name.ends_with(".pdf") {
        return None;
    }
    let biobank = file_name.contains(BIOBANK_MARKER);
    let name = if biobank && file_name.contains(GLOBAL_MARKER) {
        format!("{key}_{BIOBANK_GLOBAL_SUFFIX}.pdf")
    } else if biobank {
        format!("{key}_{BIOBANK_SUFFIX}.pdf")
    } else {
        format!("{key}.pdf")
    };
    Some(name)
}

/// Renames every PDF under `dir` to its canonical name, in place.
///
/// Files that already carry their canonical name are skipped. When two
/// files would share a name, or a target already exists, nothing is
/// renamed.
pub fn normalize_report_files(
    dir: &Utf8Path,
    key: &SampleKey,
) -> Result<Vec<RenamedReport>, IngestError> {
    let failed = |message: String| IngestError::NormalizationFailed {
        path_number: key.path_number().to_string(),
        mp_number: key.mp_number().to_string(),
        message,
    };

    let mut planned = Vec::new();
    for entry in WalkDir::new(dir.as_std_path()).sort_by_file_name() {
        let entry = entry.map_err(|err| failed(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.into_path())
            .map_err(|path| failed(format!("non-utf8 file path {}", path.display())))?;
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let Some(target_name) = canonical_report_name(file_name, key) else {
            continue;
        };
        if file_name == target_name {
            continue;
        }
        let target = path.with_file_name(target_name);
        planned.push(RenamedReport { from: path, to: target });
    }

    // All targets are checked before the first rename.
    let mut targets = HashSet::with_capacity(planned.len());
    for item in &planned {
        if !targets.insert(item.to.as_path()) {
            return Err(failed(format!(
                "{} and another report would both become {}",
                item.from, item.to
            )));
        }
        if item.to.as_std_path().exists() {
            return Err(failed(format!(
                "{} would overwrite {}",
                item.from, item.to
            )));
        }
    }

    let mut renamed = Vec::with_capacity(planned.len());
    for item in planned {
        fs::rename(item.from.as_std_path(), item.to.as_std_path())
            .map_err(|err| failed(format!("rename {}: {err}", item.from)))?;
        debug!(from = %item.from, to = %item.to, "renamed report");
        renamed.push(item);
    }
    Ok(renamed)
}
