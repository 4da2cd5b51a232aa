//! Subprocess execution.
//!
//! Tools run behind the [`ToolRunner`] trait. [`ProcessRunner`] spawns real
//! processes; tests substitute a runner that emulates the binaries.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::ToolCommand;
use crate::error::{PipelineError, Result};

/// Maximum stdout or stderr captured per stream (64 MiB).
///
/// `pat` writes whole `.tim` files to stdout, so this is generous.
const MAX_OUTPUT_BYTES: usize = 64 * 1024 * 1024;

/// Stderr kept in a `Subprocess` error.
const MAX_ERROR_CHARS: usize = 2000;

/// What a finished tool left behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Stdout went past the capture limit and was cut short.
    pub stdout_truncated: bool,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `cmd` to completion or until `timeout` elapses.
    ///
    /// Exceeding the timeout is `ResourceExceeded`. A non-zero exit is not
    /// an error at this level; see [`run_checked`].
    async fn run(&self, cmd: &ToolCommand, timeout: Duration) -> Result<ToolOutput>;
}

/// Runs tools as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, cmd: &ToolCommand, timeout: Duration) -> Result<ToolOutput> {
        let mut process = Command::new(cmd.program());
        process
            .args(cmd.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cmd.get_current_dir() {
            process.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = process.spawn().map_err(|e| PipelineError::io(cmd.program(), e))?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let program = cmd.program().to_string();
        let stdout_task = tokio::spawn({
            let program = program.clone();
            async move { read_stream(&program, "stdout", stdout_handle, MAX_OUTPUT_BYTES).await }
        });
        let stderr_task = tokio::spawn(async move {
            read_stream(&program, "stderr", stderr_handle, MAX_OUTPUT_BYTES).await
        });

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let stdout = join_capture(cmd.program(), stdout_task.await);
                let stderr = join_capture(cmd.program(), stderr_task.await);
                Ok(ToolOutput {
                    code: status.code(),
                    stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
                    duration: start.elapsed(),
                    stdout_truncated: stdout.truncated,
                })
            }
            Ok(Err(e)) => Err(PipelineError::io(cmd.program(), e)),
            // `child` drops here and kill_on_drop reaps the process.
            Err(_elapsed) => Err(PipelineError::ResourceExceeded {
                stage: cmd.program().to_string(),
                limit_secs: timeout.as_secs_f64(),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

fn join_capture(
    program: &str,
    joined: std::result::Result<Capture, tokio::task::JoinError>,
) -> Capture {
    joined.unwrap_or_else(|e| {
        warn!(tool = program, error = %e, "output reader task failed");
        Capture::default()
    })
}

/// Read a child stream, keeping at most `limit` bytes.
///
/// Output past the limit is drained so the child never blocks on a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(
    program: &str,
    stream: &'static str,
    handle: Option<R>,
    limit: usize,
) -> Capture {
    let mut capture = Capture::default();
    let Some(mut handle) = handle else {
        return capture;
    };
    if let Err(e) = (&mut handle)
        .take(limit as u64)
        .read_to_end(&mut capture.bytes)
        .await
    {
        warn!(tool = program, stream, error = %e, "failed to read tool output");
        return capture;
    }
    if capture.bytes.len() >= limit {
        match tokio::io::copy(&mut handle, &mut tokio::io::sink()).await {
            Ok(0) => {}
            Ok(dropped) => {
                warn!(tool = program, stream, limit, dropped, "tool output truncated");
                capture.truncated = true;
            }
            Err(e) => {
                warn!(tool = program, stream, error = %e, "failed to drain tool output");
                capture.truncated = true;
            }
        }
    }
    capture
}

/// Run a command, turn a non-zero exit into `Subprocess`, and write captured
/// stdout to the command's redirect target when it has one.
pub async fn run_checked(
    runner: &dyn ToolRunner,
    cmd: &ToolCommand,
    timeout: Duration,
) -> Result<ToolOutput> {
    debug!(command = %cmd, timeout_secs = timeout.as_secs_f64(), "running tool");
    let output = runner.run(cmd, timeout).await?;

    if !output.stderr.trim().is_empty() {
        debug!(tool = cmd.program(), stderr = %output.stderr.trim(), "tool stderr");
    }
    if !output.success() {
        return Err(PipelineError::Subprocess {
            tool: cmd.program().to_string(),
            code: output.code,
            stderr: tail(output.stderr.trim(), MAX_ERROR_CHARS).to_string(),
        });
    }

    if let Some(path) = cmd.get_stdout_to() {
        if output.stdout_truncated {
            return Err(PipelineError::ToolOutput {
                tool: cmd.program().to_string(),
                message: format!(
                    "stdout exceeded {} MiB, not writing {}",
                    MAX_OUTPUT_BYTES / (1024 * 1024),
                    path.display()
                ),
            });
        }
        tokio::fs::write(path, &output.stdout)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
    }
    debug!(
        tool = cmd.program(),
        elapsed_ms = output.duration.as_millis() as u64,
        "tool finished"
    );
    Ok(output)
}

/// The last `max` characters of `s`.
fn tail(s: &str, max: usize) -> &str {
    match s.char_indices().rev().nth(max.saturating_sub(1)) {
        Some((i, _)) if max > 0 => &s[i..],
        _ => s,
    }
}
