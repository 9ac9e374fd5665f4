use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ResolvedConfig, VendorProfile};
use crate::dates::DateNormalizer;
use crate::datahub::{BlobType, DatahubClient, RegisterRequest, UploadRequest};
use crate::descriptor::{UploadDescriptor, enrich_descriptors, to_payload_json};
use crate::domain::{ReportDirectoryRef, SampleKey, SampleRecord};
use crate::error::{IngestError, Stage};
use crate::layout::{ReportLayout, resolve_report_dir};
use crate::manifest::ManifestRow;
use crate::normalize::normalize_report_files;
use crate::sample::SampleExtractor;

/// Parameters shared by every row of one batch.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub layout: ReportLayout,
    pub tags: Vec<String>,
}

impl IngestJob {
    pub fn new(prefix: impl Into<Utf8PathBuf>, vendor: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            layout: ReportLayout::new(prefix, vendor),
            tags,
        }
    }

    pub fn vendor(&self) -> &str {
        self.layout.vendor()
    }

    /// Whether the vendor folder exists at all.
    pub fn check_layout(&self) -> Result<(), IngestError> {
        let root = self.layout.vendor_root();
        if root.as_std_path().is_dir() {
            Ok(())
        } else {
            Err(IngestError::Filesystem(format!(
                "vendor folder {root} does not exist"
            )))
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub workspace: String,
    pub blob_type: BlobType,
    /// Stop after resolving the report folder; nothing is renamed or sent.
    pub dry_run: bool,
}

impl IngestOptions {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            workspace: config.workspace.clone(),
            blob_type: config.blob_type,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    Registered,
    Planned,
}

/// Outcome of one successfully processed row.
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    pub key: SampleKey,
    pub report_dir: Utf8PathBuf,
    pub action: RowAction,
    pub renamed: usize,
    pub objects: usize,
    pub drs_id: String,
}

/// Runs the per-row pipeline against one vendor's reports.
pub struct Ingestor<D: DatahubClient> {
    datahub: D,
    profile: VendorProfile,
    extractor: SampleExtractor,
    options: IngestOptions,
}

impl<D: DatahubClient> Ingestor<D> {
    pub fn new(datahub: D, profile: VendorProfile, options: IngestOptions) -> Self {
        Self::with_dates(datahub, profile, options, DateNormalizer::taipei())
    }

    pub fn with_dates(
        datahub: D,
        profile: VendorProfile,
        options: IngestOptions,
        dates: DateNormalizer,
    ) -> Self {
        let extractor = SampleExtractor::new(profile.columns.clone(), dates);
        Self {
            datahub,
            profile,
            extractor,
            options,
        }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    pub fn datahub(&self) -> &D {
        &self.datahub
    }

    pub fn profile(&self) -> &VendorProfile {
        &self.profile
    }

    pub fn extract(&self, row: &ManifestRow) -> Result<SampleRecord, IngestError> {
        self.extractor.extract(row)
    }

    /// extract → resolve → normalize → upload → enrich → register.
    pub fn process_row(&self, job: &IngestJob, row: &ManifestRow) -> Result<RowOutcome, IngestError> {
        let record = self.extract(row)?;
        let dir = resolve_report_dir(&job.layout, &self.profile.directory_patterns, &record.key)?;

        if self.options.dry_run {
            info!(
                key = %record.key,
                dir = %dir.path,
                destination = %job.layout.upload_destination(&record.key),
                "dry run: would upload report folder"
            );
            return Ok(RowOutcome {
                drs_id: record.key.drs_id(),
                key: record.key,
                report_dir: dir.path,
                action: RowAction::Planned,
                renamed: 0,
                objects: 0,
            });
        }

        let renamed = normalize_report_files(&dir.path, &record.key)?;
        let objects = self.ingest_sample(job, &dir, &record)?;
        Ok(RowOutcome {
            drs_id: record.key.drs_id(),
            key: record.key,
            report_dir: dir.path,
            action: RowAction::Registered,
            renamed: renamed.len(),
            objects,
        })
    }

    /// Uploads a normalized report folder, enriches the returned
    /// descriptors and registers them. Returns how many objects were
    /// registered.
    pub fn ingest_sample(
        &self,
        job: &IngestJob,
        dir: &ReportDirectoryRef,
        record: &SampleRecord,
    ) -> Result<usize, IngestError> {
        let key = &record.key;
        let layout = &job.layout;

        let upload = UploadRequest {
            source: format!("{}/*", dir.path),
            destination: layout.upload_destination(key),
            workspace: self.options.workspace.clone(),
            output: layout.upload_result_path(key),
        };
        self.datahub
            .upload(&upload)
            .map_err(|err| tool_failure(Stage::Upload, key, err))?;
        info!(%key, output = %upload.output, "uploaded report folder");

        let payload = layout.enriched_payload_path(key);
        let objects = self
            .enrich(&upload.output, &payload, record, job)
            .map_err(|message| IngestError::EnrichmentFailed {
                path_number: key.path_number().to_string(),
                mp_number: key.mp_number().to_string(),
                message,
            })?;

        let register = RegisterRequest {
            blob_type: self.options.blob_type,
            input: payload,
            workspace: self.options.workspace.clone(),
            output: layout.register_result_path(key),
        };
        self.datahub
            .register(&register)
            .map_err(|err| tool_failure(Stage::Register, key, err))?;
        info!(%key, drs_id = %key.drs_id(), objects, "registered report");
        Ok(objects)
    }

    fn enrich(
        &self,
        uploaded: &Utf8Path,
        payload: &Utf8Path,
        record: &SampleRecord,
        job: &IngestJob,
    ) -> Result<usize, String> {
        let content = fs::read_to_string(uploaded.as_std_path())
            .map_err(|err| format!("read {uploaded}: {err}"))?;
        let mut descriptors: Vec<UploadDescriptor> = serde_json::from_str(&content)
            .map_err(|err| format!("parse {uploaded}: {err}"))?;
        enrich_descriptors(&mut descriptors, record, job.vendor(), &job.tags)?;

        let bytes = to_payload_json(&descriptors).map_err(|err| err.to_string())?;
        write_bytes_atomic(payload, &bytes)?;
        Ok(descriptors.len())
    }
}

fn tool_failure(stage: Stage, key: &SampleKey, err: IngestError) -> IngestError {
    let path_number = key.path_number().to_string();
    let mp_number = key.mp_number().to_string();
    match err {
        IngestError::ToolTimeout { seconds, .. } => {
            warn!(%key, %stage, seconds, "data hub call timed out");
            IngestError::Timeout {
                stage,
                path_number,
                mp_number,
                seconds,
            }
        }
        other if stage == Stage::Register => IngestError::RegisterFailed {
            path_number,
            mp_number,
            message: other.to_string(),
        },
        other => IngestError::UploadFailed {
            path_number,
            mp_number,
            message: other.to_string(),
        },
    }
}

fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), String> {
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid payload path {path}"))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".report-ingest")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| format!("create temp file in {parent}: {err}"))?;
    temp.write_all(content)
        .map_err(|err| format!("write {path}: {err}"))?;
    temp.persist(path.as_std_path())
        .map_err(|err| format!("persist {path}: {err}"))?;
    Ok(())
}
