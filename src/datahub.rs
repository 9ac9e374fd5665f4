use std::fmt;
use std::fs::File;
use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IngestError;

pub const SEQSLAB_PROGRAM: &str = "seqslab";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the data hub should treat a registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlobType {
    DirBlob,
    FileBlob,
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobType::DirBlob => write!(f, "dir-blob"),
            BlobType::FileBlob => write!(f, "file-blob"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Local file or glob, e.g. `/data/Archer/M112-1_AR1/*`.
    pub source: String,
    /// Remote folder, e.g. `Archer/M112-1_AR1/`.
    pub destination: String,
    pub workspace: String,
    /// Receives the JSON array of uploaded descriptors.
    pub output: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub blob_type: BlobType,
    /// JSON array of descriptors to register.
    pub input: Utf8PathBuf,
    pub workspace: String,
    /// Receives the registration result.
    pub output: Utf8PathBuf,
}

/// The data hub's upload and register operations. Any error means the
/// call did not succeed; [`IngestError::ToolTimeout`] marks a call that was
/// abandoned rather than one that failed.
pub trait DatahubClient: Send + Sync {
    fn upload(&self, request: &UploadRequest) -> Result<(), IngestError>;
    fn register(&self, request: &RegisterRequest) -> Result<(), IngestError>;
}

/// Drives the `seqslab` command line.
#[derive(Debug, Clone)]
pub struct SeqslabCli {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl SeqslabCli {
    /// Finds `seqslab` on `PATH`.
    pub fn locate(timeout: Option<Duration>) -> Result<Self, IngestError> {
        let program = find_in_path(SEQSLAB_PROGRAM)
            .ok_or_else(|| IngestError::MissingTool(SEQSLAB_PROGRAM.to_string()))?;
        Ok(Self::with_program(program, timeout))
    }

    pub fn with_program(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run_cmd(
        &self,
        args: &[String],
        stdin: Option<&Utf8Path>,
        stdout: &Utf8Path,
    ) -> Result<(), IngestError> {
        let program = self.program.display().to_string();
        let launch = |message: String| IngestError::ToolLaunch {
            program: program.clone(),
            message,
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        let out = File::create(stdout.as_std_path())
            .map_err(|err| launch(format!("create {stdout}: {err}")))?;
        cmd.stdout(Stdio::from(out));
        match stdin {
            Some(path) => {
                let input = File::open(path.as_std_path())
                    .map_err(|err| launch(format!("open {path}: {err}")))?;
                cmd.stdin(Stdio::from(input));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }
        cmd.stderr(Stdio::piped());
        // Own process group; a terminal Ctrl-C must not reach the tool.
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(program = %program, args = ?args, "running data hub command");
        let mut child = cmd.spawn().map_err(|err| launch(err.to_string()))?;

        // Drain stderr on the side so a chatty tool cannot block on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer);
                buffer
            })
        });

        let status = match wait_with_timeout(&mut child, self.timeout) {
            Ok(status) => status,
            Err(WaitError::TimedOut(limit)) => {
                // Left detached: a grandchild may still hold stderr open, and
                // the reader ends on its own once the pipe closes.
                drop(stderr_reader);
                return Err(IngestError::ToolTimeout {
                    program,
                    seconds: limit.as_secs(),
                });
            }
            Err(WaitError::Io(err)) => return Err(launch(err.to_string())),
        };

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("command failed: {}", args.join(" "))
        } else {
            stderr.to_string()
        };
        Err(IngestError::ToolExit {
            program,
            code: status.code(),
            message,
        })
    }
}

impl DatahubClient for SeqslabCli {
    fn upload(&self, request: &UploadRequest) -> Result<(), IngestError> {
        let args = vec![
            "datahub".to_string(),
            "upload".to_string(),
            "--src".to_string(),
            request.source.clone(),
            "--dst".to_string(),
            request.destination.clone(),
            "--workspace".to_string(),
            request.workspace.clone(),
        ];
        self.run_cmd(&args, None, &request.output)
    }

    fn register(&self, request: &RegisterRequest) -> Result<(), IngestError> {
        let args = vec![
            "datahub".to_string(),
            "register-blob".to_string(),
            request.blob_type.to_string(),
            "--stdin".to_string(),
            "--workspace".to_string(),
            request.workspace.clone(),
        ];
        self.run_cmd(&args, Some(&request.input), &request.output)
    }
}

#[derive(Debug)]
enum WaitError {
    TimedOut(Duration),
    Io(std::io::Error),
}

/// Waits for `child`, killing it once `timeout` has elapsed.
fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, WaitError> {
    let Some(timeout) = timeout else {
        return child.wait().map_err(WaitError::Io);
    };
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(WaitError::Io)? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WaitError::TimedOut(timeout));
        }
        thread::sleep(POLL_INTERVAL.min(timeout));
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
