//! Subprocess plumbing shared by every external-tool driver.
//!
//! All media work happens in child processes (ffmpeg, ffprobe, yt-dlp,
//! the separator runners). This module provides the one way they are run:
//! captured output, cooperative cancellation, and a two-stage kill
//! (graceful signal, 5 s grace period, then forceful).

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Grace period between the polite signal and SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// How much of a failing tool's stderr is kept for error reporting.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Error)]
pub enum CmdError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr_tail}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared cancellation signal for one job.
///
/// Cloned into every task and subprocess wait belonging to the job; once
/// set it never resets.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelInner>);

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is set. Safe to race with `cancel`.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Captured result of a finished child process.
#[derive(Debug)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Keep the last portion of a tool's stderr for error messages.
pub fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let start = trimmed.len() - STDERR_TAIL_BYTES;
    // Avoid splitting a UTF-8 sequence.
    let start = (start..trimmed.len())
        .find(|i| trimmed.is_char_boundary(*i))
        .unwrap_or(start);
    format!("…{}", &trimmed[start..])
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string())
}

/// Build a `Command` with the stdio setup every driver uses.
pub fn command(program: &Path, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Run a child to completion, honoring cancellation and an optional timeout.
///
/// On cancellation the child receives SIGTERM, then SIGKILL after
/// [`KILL_GRACE`]. Non-zero exits are mapped to [`CmdError::NonZeroExit`]
/// with the stderr tail attached.
pub async fn run(
    program: &Path,
    args: &[String],
    cancel: &CancelFlag,
    time_limit: Option<Duration>,
) -> Result<CmdOutput, CmdError> {
    let name = program_name(program);
    debug!(program = %name, ?args, "spawning");

    let mut child = command(program, args)
        .spawn()
        .map_err(|source| CmdError::Spawn {
            program: name.clone(),
            source,
        })?;

    let mut stdout_pipe = child.stdout.take().expect("stdout is piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr is piped");

    let stdout_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stdout_pipe.read_to_string(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr_pipe.read_to_string(&mut buf).await;
        buf
    });

    enum WaitOutcome {
        Finished(std::io::Result<std::process::ExitStatus>),
        Cancelled,
        TimedOut,
    }

    // The wait future borrows the child; keep it scoped so the kill path
    // below can borrow again.
    let outcome = {
        let wait = child.wait();
        tokio::pin!(wait);
        tokio::select! {
            status = &mut wait => WaitOutcome::Finished(status),
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            _ = deadline(time_limit) => WaitOutcome::TimedOut,
        }
    };

    let status = match outcome {
        WaitOutcome::Finished(status) => status.map_err(CmdError::Io)?,
        WaitOutcome::Cancelled => {
            terminate(&mut child, &name).await;
            return Err(CmdError::Cancelled);
        }
        WaitOutcome::TimedOut => {
            terminate(&mut child, &name).await;
            return Err(CmdError::Timeout {
                program: name,
                timeout_secs: time_limit.unwrap_or_default().as_secs(),
            });
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        return Err(CmdError::NonZeroExit {
            program: name,
            code: status.code(),
            stderr_tail: stderr_tail(&stderr),
        });
    }

    Ok(CmdOutput { stdout, stderr })
}

/// Resolves when the optional time limit elapses; never when unset.
async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Two-stage termination: graceful signal, grace period, forceful kill.
pub async fn terminate(child: &mut Child, name: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain signal send to our own child.
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if timeout(KILL_GRACE, child.wait()).await.is_ok() {
            debug!(program = name, "exited after SIGTERM");
            return;
        }
        warn!(program = name, "did not exit within grace period, killing");
    }

    if let Err(e) = child.kill().await {
        warn!(program = name, "kill failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    fn args(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run(&sh(), &args("echo hello"), &CancelFlag::new(), None)
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_carries_stderr_tail() {
        let err = run(
            &sh(),
            &args("echo boom >&2; exit 3"),
            &CancelFlag::new(),
            None,
        )
        .await
        .unwrap_err();
        match err {
            CmdError::NonZeroExit {
                code, stderr_tail, ..
            } => {
                assert_eq!(code, Some(3));
                assert!(stderr_tail.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_child() {
        let cancel = CancelFlag::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = run(&sh(), &args("sleep 30"), &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CmdError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let err = run(
            &sh(),
            &args("sleep 30"),
            &CancelFlag::new(),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CmdError::Timeout { .. }));
    }

    #[test]
    fn test_stderr_tail_short_input_unchanged() {
        assert_eq!(stderr_tail("  short error\n"), "short error");
    }

    #[test]
    fn test_stderr_tail_truncates_long_input() {
        let long = "x".repeat(10_000);
        let tail = stderr_tail(&long);
        assert!(tail.len() < 3000);
        assert!(tail.starts_with('…'));
    }

    #[test]
    fn test_cancel_flag_is_sticky() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
    }
}
