use std::fmt;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Pipeline step a row failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Resolve,
    Normalize,
    Upload,
    Enrich,
    Register,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extract => write!(f, "extract"),
            Stage::Resolve => write!(f, "resolve"),
            Stage::Normalize => write!(f, "normalize"),
            Stage::Upload => write!(f, "upload"),
            Stage::Enrich => write!(f, "enrich"),
            Stage::Register => write!(f, "register"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("{field} should not be empty")]
    MissingIdentifier { field: &'static str },

    #[error("cannot derive year from Path No. {path_number}: {reason}")]
    MalformedIdentifier { path_number: String, reason: String },

    #[error("no report directory under {searched}, Path No.: {path_number}, MP No.: {mp_number}")]
    DirectoryNotFound {
        path_number: String,
        mp_number: String,
        searched: Utf8PathBuf,
    },

    #[error("normalize report names failed, Path No.: {path_number}, MP No.: {mp_number}: {message}")]
    NormalizationFailed {
        path_number: String,
        mp_number: String,
        message: String,
    },

    #[error("upload failed, Path No.: {path_number}, MP No.: {mp_number}: {message}")]
    UploadFailed {
        path_number: String,
        mp_number: String,
        message: String,
    },

    #[error("descriptor enrichment failed, Path No.: {path_number}, MP No.: {mp_number}: {message}")]
    EnrichmentFailed {
        path_number: String,
        mp_number: String,
        message: String,
    },

    #[error("register failed, Path No.: {path_number}, MP No.: {mp_number}: {message}")]
    RegisterFailed {
        path_number: String,
        mp_number: String,
        message: String,
    },

    #[error("{stage} timed out after {seconds}s, Path No.: {path_number}, MP No.: {mp_number}")]
    Timeout {
        stage: Stage,
        path_number: String,
        mp_number: String,
        seconds: u64,
    },

    #[error("{program} exited with {}: {message}", exit_label(.code))]
    ToolExit {
        program: String,
        code: Option<i32>,
        message: String,
    },

    #[error("{program} did not finish within {seconds}s")]
    ToolTimeout { program: String, seconds: u64 },

    #[error("failed to launch {program}: {message}")]
    ToolLaunch { program: String, message: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("failed to read manifest {path}: {message}")]
    ManifestRead { path: Utf8PathBuf, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid vendor profile: {0}")]
    InvalidProfile(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl IngestError {
    /// Step of the per-row pipeline this error belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            IngestError::MissingIdentifier { .. } | IngestError::MalformedIdentifier { .. } => {
                Some(Stage::Extract)
            }
            IngestError::DirectoryNotFound { .. } => Some(Stage::Resolve),
            IngestError::NormalizationFailed { .. } => Some(Stage::Normalize),
            IngestError::UploadFailed { .. } => Some(Stage::Upload),
            IngestError::EnrichmentFailed { .. } => Some(Stage::Enrich),
            IngestError::RegisterFailed { .. } => Some(Stage::Register),
            IngestError::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
