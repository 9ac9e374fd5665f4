use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, info_span, warn};

use crate::datahub::DatahubClient;
use crate::error::{IngestError, Stage};
use crate::manifest::{Manifest, ManifestRow};
use crate::pipeline::{IngestJob, Ingestor, RowOutcome};

/// Shared flag that stops a batch before its next row.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Sink that only logs.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub line: u64,
    pub path_number: Option<String>,
    pub mp_number: Option<String>,
    pub stage: Option<Stage>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub vendor: String,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows never attempted because the batch was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
    pub outcomes: Vec<RowOutcome>,
    pub failures: Vec<RowFailure>,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

/// Processes every manifest row in order. A failing row is recorded and
/// the batch moves on; only cancellation stops it early.
pub fn run_batch<D: DatahubClient>(
    ingestor: &Ingestor<D>,
    manifest: &Manifest,
    job: &IngestJob,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> BatchSummary {
    let mut summary = BatchSummary {
        vendor: job.vendor().to_string(),
        ..BatchSummary::default()
    };
    let total = manifest.rows.len();

    for (index, row) in manifest.rows.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            summary.skipped = total - index;
            warn!(remaining = summary.skipped, "batch cancelled before line {}", row.line);
            break;
        }

        let span = info_span!("row", line = row.line);
        let _entered = span.enter();
        sink.event(ProgressEvent {
            message: format!("row {}/{total} (line {})", index + 1, row.line),
            elapsed: None,
        });

        let start = Instant::now();
        match ingestor.process_row(job, row) {
            Ok(outcome) => {
                summary.succeeded += 1;
                sink.event(ProgressEvent {
                    message: format!("row ok: {}", outcome.key),
                    elapsed: Some(start.elapsed()),
                });
                summary.outcomes.push(outcome);
            }
            Err(err) => {
                let failure = describe_failure(ingestor, row, &err);
                let stage = failure.stage.map(|stage| stage.to_string()).unwrap_or_default();
                error!(
                    path_number = failure.path_number.as_deref().unwrap_or("-"),
                    mp_number = failure.mp_number.as_deref().unwrap_or("-"),
                    stage = stage.as_str(),
                    "{err}"
                );
                sink.event(ProgressEvent {
                    message: format!("row failed: {}", failure.message),
                    elapsed: Some(start.elapsed()),
                });
                summary.failed += 1;
                summary.failures.push(failure);
            }
        }
    }

    info!(
        vendor = %summary.vendor,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "batch finished"
    );
    summary
}

/// Failure record carrying whatever identifiers the row has, even when
/// extraction itself was what failed.
fn describe_failure<D: DatahubClient>(
    ingestor: &Ingestor<D>,
    row: &ManifestRow,
    err: &IngestError,
) -> RowFailure {
    let columns = &ingestor.profile().columns;
    let cell = |aliases: &[String]| row.first_non_empty(aliases).map(str::to_string);
    RowFailure {
        line: row.line,
        path_number: cell(&columns.path_number),
        mp_number: cell(&columns.mp_number),
        stage: err.stage(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::config::VendorProfile;
    use crate::datahub::{BlobType, RegisterRequest, UploadRequest};
    use crate::pipeline::IngestOptions;

    const VENDOR: &str = "Archer";

    #[derive(Default)]
    struct FakeHub {
        uploads: Mutex<Vec<String>>,
    }

    impl DatahubClient for FakeHub {
        fn upload(&self, request: &UploadRequest) -> Result<(), IngestError> {
            self.uploads.lock().unwrap().push(request.destination.clone());
            let body = r#"[{"id": "", "name": "r.pdf", "access_methods": [{"access_url": {"url": "hub/Archer/k/r.pdf"}}]}]"#;
            fs::write(&request.output, body).unwrap();
            Ok(())
        }

        fn register(&self, request: &RegisterRequest) -> Result<(), IngestError> {
            fs::write(&request.output, "{}").unwrap();
            Ok(())
        }
    }

    struct CancelAfterFirst(CancelToken);

    impl ProgressSink for CancelAfterFirst {
        fn event(&self, event: ProgressEvent) {
            if event.message.starts_with("row ok") {
                self.0.cancel();
            }
        }
    }

    fn setup(rows: usize, missing: &[usize]) -> (tempfile::TempDir, IngestJob, Manifest) {
        let temp = tempfile::tempdir().unwrap();
        let prefix = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let mut csv = String::from("MP. No.,Path. No.,採檢日\n");
        for index in 1..=rows {
            csv.push_str(&format!("MY2300{index},M112-0000{index},2023/06/0{index}\n"));
            if !missing.contains(&index) {
                let dir = prefix.join(VENDOR).join(format!("M112-0000{index}_MY2300{index}"));
                fs::create_dir_all(&dir).unwrap();
                fs::write(dir.join("scan.pdf"), b"%PDF").unwrap();
            }
        }
        let job = IngestJob::new(prefix, VENDOR, vec!["NGS".to_string()]);
        (temp, job, Manifest::parse(&csv).unwrap())
    }

    fn ingestor() -> Ingestor<FakeHub> {
        let options = IngestOptions {
            workspace: "vghtpe".to_string(),
            blob_type: BlobType::DirBlob,
            dry_run: false,
        };
        Ingestor::new(FakeHub::default(), VendorProfile::default(), options)
    }

    #[test]
    fn failing_row_does_not_stop_the_batch() {
        let (_temp, job, manifest) = setup(5, &[3]);
        let ingestor = ingestor();
        let summary = run_batch(&ingestor, &manifest, &job, &CancelToken::new(), &LogSink);

        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_clean());
        let failure = &summary.failures[0];
        assert_eq!(failure.line, 4);
        assert_eq!(failure.path_number.as_deref(), Some("M112-00003"));
        assert_eq!(failure.stage, Some(Stage::Resolve));
        let uploads = ingestor.datahub().uploads.lock().unwrap();
        assert_eq!(uploads.len(), 4);
        assert_eq!(uploads[3], "Archer/M112-00005_MY23005/");
    }

    #[test]
    fn missing_identifier_is_reported_with_what_is_known() {
        let (_temp, job, _) = setup(0, &[]);
        let manifest = Manifest::parse("MP. No.,Path. No.\n,M112-00001\n").unwrap();
        let summary = run_batch(&ingestor(), &manifest, &job, &CancelToken::new(), &LogSink);

        assert_eq!(summary.failed, 1);
        let failure = &summary.failures[0];
        assert_eq!(failure.mp_number, None);
        assert_eq!(failure.path_number.as_deref(), Some("M112-00001"));
        assert_eq!(failure.stage, Some(Stage::Extract));
        assert!(failure.message.contains("MP No."));
    }

    #[test]
    fn cancellation_skips_remaining_rows() {
        let (_temp, job, manifest) = setup(3, &[]);
        let cancel = CancelToken::new();
        let sink = CancelAfterFirst(cancel.clone());
        let summary = run_batch(&ingestor(), &manifest, &job, &cancel, &sink);

        assert!(summary.cancelled);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 2);
        assert!(!summary.is_clean());
    }

    #[test]
    fn dry_run_plans_without_calling_the_hub() {
        let (_temp, job, manifest) = setup(2, &[]);
        let options = IngestOptions {
            workspace: "vghtpe".to_string(),
            blob_type: BlobType::DirBlob,
            dry_run: true,
        };
        let ingestor = Ingestor::new(FakeHub::default(), VendorProfile::default(), options);
        let summary = run_batch(&ingestor, &manifest, &job, &CancelToken::new(), &LogSink);

        assert_eq!(summary.succeeded, 2);
        assert!(ingestor.datahub().uploads.lock().unwrap().is_empty());
        assert!(
            job.layout
                .vendor_root()
                .join("M112-00001_MY23001/scan.pdf")
                .exists()
        );
    }
}
