use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ngs_report_ingest::batch::{BatchSummary, CancelToken, LogSink, ProgressSink, run_batch};
use ngs_report_ingest::config::{ConfigLoader, ResolvedConfig};
use ngs_report_ingest::datahub::{DatahubClient, RegisterRequest, SeqslabCli, UploadRequest};
use ngs_report_ingest::error::IngestError;
use ngs_report_ingest::manifest::Manifest;
use ngs_report_ingest::output::{JsonOutput, OutputMode, TextOutput};
use ngs_report_ingest::pipeline::{IngestJob, IngestOptions, Ingestor};

#[derive(Parser)]
#[command(name = "report-ingest")]
#[command(about = "Upload and register vendor NGS reports listed in a CSV manifest")]
#[command(version, author)]
struct Cli {
    /// CSV manifest, one sample per row.
    csv: Utf8PathBuf,

    /// Folder holding one sub-folder per vendor.
    prefix: Utf8PathBuf,

    /// Vendor name; also the sub-folder under the prefix and a tag.
    vendor: String,

    #[arg(short = 't', long = "tags", num_args = 0..)]
    tags: Vec<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    workspace: Option<String>,

    /// Per call to the data hub tool; 0 waits forever.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Path to the `seqslab` executable instead of looking it up on PATH.
    #[arg(long)]
    tool: Option<Utf8PathBuf>,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(2)
        }
    }
}

fn run() -> miette::Result<BatchSummary> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    let manifest = Manifest::from_path(&cli.csv)?;
    info!(manifest = %cli.csv, rows = manifest.len(), vendor = %cli.vendor, "loaded manifest");

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping after the current row");
        handler_token.cancel();
    })
    .into_diagnostic()?;

    let job = IngestJob::new(cli.prefix.clone(), cli.vendor.clone(), cli.tags.clone());
    if let Err(err) = job.check_layout() {
        warn!("{err}; every row will fail to resolve its report folder");
    }
    let profile = config.profile_for(&cli.vendor);
    let mut options = IngestOptions::from_config(&config);
    options.dry_run = cli.dry_run;

    let summary = if cli.dry_run {
        let ingestor = Ingestor::new(NopDatahub, profile, options);
        execute(&ingestor, &manifest, &job, &cancel, output_mode)
    } else {
        let cli_client = match &cli.tool {
            Some(program) => SeqslabCli::with_program(program.as_std_path(), config.timeout),
            None => SeqslabCli::locate(config.timeout)?,
        };
        let ingestor = Ingestor::new(cli_client, profile, options);
        execute(&ingestor, &manifest, &job, &cancel, output_mode)
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_summary(&summary).into_diagnostic()?,
    }
    Ok(summary)
}

fn apply_overrides(config: &mut ResolvedConfig, cli: &Cli) {
    if let Some(workspace) = &cli.workspace {
        config.workspace = workspace.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
}

fn execute<D: DatahubClient>(
    ingestor: &Ingestor<D>,
    manifest: &Manifest,
    job: &IngestJob,
    cancel: &CancelToken,
    output_mode: OutputMode,
) -> BatchSummary {
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &LogSink,
    };
    run_batch(ingestor, manifest, job, cancel, sink)
}

/// Stand-in for dry runs; the pipeline stops before any data hub call.
struct NopDatahub;

impl DatahubClient for NopDatahub {
    fn upload(&self, _request: &UploadRequest) -> Result<(), IngestError> {
        Err(IngestError::MissingTool("data hub disabled in dry run".to_string()))
    }

    fn register(&self, _request: &RegisterRequest) -> Result<(), IngestError> {
        Err(IngestError::MissingTool("data hub disabled in dry run".to_string()))
    }
}
