use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::datahub::BlobType;
use crate::error::IngestError;
use crate::layout::DirectoryPattern;

pub const DEFAULT_CONFIG_FILE: &str = "report-ingest.json";
pub const DEFAULT_WORKSPACE: &str = "vghtpe";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub workspace: Option<String>,
    /// Per tool invocation; `0` waits forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub blob_type: Option<BlobType>,
    #[serde(default)]
    pub vendors: BTreeMap<String, VendorEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VendorEntry {
    #[serde(default)]
    pub directory_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub columns: ColumnOverrides,
}

/// Column-name lists a vendor overrides; unnamed fields keep the defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ColumnOverrides {
    #[serde(default)]
    pub mp_number: Option<Vec<String>>,
    #[serde(default)]
    pub path_number: Option<Vec<String>>,
    #[serde(default)]
    pub patient_name: Option<Vec<String>>,
    #[serde(default)]
    pub history_number: Option<Vec<String>>,
    #[serde(default)]
    pub block_number: Option<Vec<String>>,
    #[serde(default)]
    pub tumor_purity: Option<Vec<String>>,
    #[serde(default)]
    pub diagnosis: Option<Vec<String>>,
    #[serde(default)]
    pub test_item: Option<Vec<String>>,
    #[serde(default)]
    pub physician: Option<Vec<String>>,
    #[serde(default)]
    pub receive_date: Option<Vec<String>>,
    #[serde(default)]
    pub sign_date: Option<Vec<String>>,
    #[serde(default)]
    pub report_date: Option<Vec<String>>,
    #[serde(default)]
    pub turnaround_time: Option<Vec<String>>,
}

/// Manifest headers for each sample field, tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAliases {
    pub mp_number: Vec<String>,
    pub path_number: Vec<String>,
    pub patient_name: Vec<String>,
    pub history_number: Vec<String>,
    pub block_number: Vec<String>,
    pub tumor_purity: Vec<String>,
    pub diagnosis: Vec<String>,
    pub test_item: Vec<String>,
    pub physician: Vec<String>,
    pub receive_date: Vec<String>,
    pub sign_date: Vec<String>,
    pub report_date: Vec<String>,
    pub turnaround_time: Vec<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            mp_number: aliases(&["MP. No."]),
            path_number: aliases(&["Path. No."]),
            patient_name: aliases(&["Patient"]),
            history_number: aliases(&["History No."]),
            block_number: aliases(&["Block No."]),
            tumor_purity: aliases(&["Tumor %"]),
            diagnosis: aliases(&["Diagnosis"]),
            test_item: aliases(&["檢測項目"]),
            physician: aliases(&["主治醫師"]),
            receive_date: aliases(&["採檢日", "取件日"]),
            sign_date: aliases(&["簽收日"]),
            report_date: aliases(&["報告日"]),
            turnaround_time: aliases(&["TAT"]),
        }
    }
}

impl ColumnAliases {
    fn apply(mut self, overrides: ColumnOverrides) -> Self {
        let ColumnOverrides {
            mp_number,
            path_number,
            patient_name,
            history_number,
            block_number,
            tumor_purity,
            diagnosis,
            test_item,
            physician,
            receive_date,
            sign_date,
            report_date,
            turnaround_time,
        } = overrides;
        replace(&mut self.mp_number, mp_number);
        replace(&mut self.path_number, path_number);
        replace(&mut self.patient_name, patient_name);
        replace(&mut self.history_number, history_number);
        replace(&mut self.block_number, block_number);
        replace(&mut self.tumor_purity, tumor_purity);
        replace(&mut self.diagnosis, diagnosis);
        replace(&mut self.test_item, test_item);
        replace(&mut self.physician, physician);
        replace(&mut self.receive_date, receive_date);
        replace(&mut self.sign_date, sign_date);
        replace(&mut self.report_date, report_date);
        replace(&mut self.turnaround_time, turnaround_time);
        self
    }
}

/// Everything that differs between upstream report sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorProfile {
    pub directory_patterns: Vec<DirectoryPattern>,
    pub columns: ColumnAliases,
}

impl Default for VendorProfile {
    fn default() -> Self {
        Self {
            directory_patterns: DirectoryPattern::defaults(),
            columns: ColumnAliases::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub workspace: String,
    pub timeout: Option<Duration>,
    pub blob_type: BlobType,
    pub vendors: BTreeMap<String, VendorProfile>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            workspace: DEFAULT_WORKSPACE.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            blob_type: BlobType::DirBlob,
            vendors: BTreeMap::new(),
        }
    }
}

impl ResolvedConfig {
    /// Profile configured for `vendor`, or the default conventions.
    pub fn profile_for(&self, vendor: &str) -> VendorProfile {
        self.vendors.get(vendor).cloned().unwrap_or_default()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `report-ingest.json` from the working directory.
    /// Only the implicit default file may be absent.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        let defaults = ResolvedConfig::default();
        let timeout = match config.timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.timeout,
        };

        let vendors = config
            .vendors
            .into_iter()
            .map(|(name, entry)| {
                let profile = Self::resolve_vendor(&name, entry)?;
                Ok((name, profile))
            })
            .collect::<Result<BTreeMap<_, _>, IngestError>>()?;

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            workspace: config.workspace.unwrap_or(defaults.workspace),
            timeout,
            blob_type: config.blob_type.unwrap_or(defaults.blob_type),
            vendors,
        })
    }

    fn resolve_vendor(name: &str, entry: VendorEntry) -> Result<VendorProfile, IngestError> {
        let directory_patterns = match entry.directory_patterns {
            Some(patterns) if patterns.is_empty() => {
                return Err(IngestError::InvalidProfile(format!(
                    "{name}: directory_patterns must not be empty"
                )));
            }
            Some(patterns) => patterns
                .iter()
                .map(|pattern| {
                    pattern.parse::<DirectoryPattern>().map_err(|err| match err {
                        IngestError::InvalidProfile(reason) => {
                            IngestError::InvalidProfile(format!("{name}: {reason}"))
                        }
                        other => other,
                    })
                })
                .collect::<Result<Vec<_>, IngestError>>()?,
            None => DirectoryPattern::defaults(),
        };

        Ok(VendorProfile {
            directory_patterns,
            columns: ColumnAliases::default().apply(entry.columns),
        })
    }
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn replace(target: &mut Vec<String>, value: Option<Vec<String>>) {
    if let Some(value) = value.filter(|names| !names.is_empty()) {
        *target = value;
    }
}
