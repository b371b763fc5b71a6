use std::os::fd::{IntoRawFd, RawFd};
use std::path::Path;
use std::process::{Command, Stdio};

use log::{error, info};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, Pid};
use thiserror::Error;

/// Why a launch attempt produced no exit code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchFailure {
    #[error("executable not found or not a regular file")]
    InvalidPath,
    #[error("could not create the process: {0}")]
    CreateProcessFailed(String),
    #[error("could not release the child's startup handle: {0}")]
    HandleCloseFailed(String),
    #[error("waiting for the process failed: {0}")]
    WaitFailed(String),
    #[error("the process ended without an exit code: {0}")]
    ExitCodeUnavailable(String),
}

impl LaunchFailure {
    /// Stable number shown on the failure report.
    pub fn code(&self) -> u8 {
        match self {
            LaunchFailure::CreateProcessFailed(_) => 0,
            LaunchFailure::HandleCloseFailed(_) => 1,
            LaunchFailure::WaitFailed(_) => 2,
            LaunchFailure::ExitCodeUnavailable(_) => 3,
            LaunchFailure::InvalidPath => 4,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LaunchFailure::InvalidPath => "InvalidPath",
            LaunchFailure::CreateProcessFailed(_) => "CreateProcessFailed",
            LaunchFailure::HandleCloseFailed(_) => "HandleCloseFailed",
            LaunchFailure::WaitFailed(_) => "WaitFailed",
            LaunchFailure::ExitCodeUnavailable(_) => "ExitCodeUnavailable",
        }
    }
}

/// Result of one launch: either the child's exit code or a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Exited(i32),
    Failed(LaunchFailure),
}

impl LaunchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, LaunchOutcome::Failed(_))
    }
}

impl From<Result<i32, LaunchFailure>> for LaunchOutcome {
    fn from(result: Result<i32, LaunchFailure>) -> Self {
        match result {
            Ok(code) => LaunchOutcome::Exited(code),
            Err(failure) => LaunchOutcome::Failed(failure),
        }
    }
}

pub trait Launcher {
    /// Runs `executable` to completion. Blocks the caller until it exits.
    fn launch(&self, executable: &Path, args: &[String]) -> LaunchOutcome;
}

/// Spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, executable: &Path, args: &[String]) -> LaunchOutcome {
        info!("Launching {} {:?}", executable.display(), args);
        let outcome = LaunchOutcome::from(run(executable, args));
        match &outcome {
            LaunchOutcome::Exited(code) => info!("{} exited with {}", executable.display(), code),
            LaunchOutcome::Failed(failure) => error!("{}: {}", executable.display(), failure),
        }
        outcome
    }
}

fn run(executable: &Path, args: &[String]) -> Result<i32, LaunchFailure> {
    if !executable.is_file() {
        return Err(LaunchFailure::InvalidPath);
    }
    // Absolute so the new working directory doesn't change what runs. Symlinks
    // stay unresolved: the game starts in the directory that holds the link.
    let executable = std::path::absolute(executable).map_err(|_| LaunchFailure::InvalidPath)?;

    let mut command = Command::new(&executable);
    command.args(args).stdin(Stdio::piped());
    if let Some(dir) = executable.parent().filter(|d| !d.as_os_str().is_empty()) {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .map_err(|e| LaunchFailure::CreateProcessFailed(e.to_string()))?;
    let pid = Pid::from_raw(child.id() as i32);

    // The child sees end-of-file on stdin rather than sharing the launcher's.
    if let Some(stdin) = child.stdin.take() {
        let fd: RawFd = stdin.into_raw_fd();
        if let Err(e) = close(fd) {
            // Still reap the child; the attempt is reported as failed.
            let _ = wait_for_exit(pid);
            return Err(LaunchFailure::HandleCloseFailed(e.to_string()));
        }
    }

    wait_for_exit(pid)
}

fn wait_for_exit(pid: Pid) -> Result<i32, LaunchFailure> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Err(LaunchFailure::ExitCodeUnavailable(format!("terminated by {}", signal)));
            }
            // Not requested, but harmless to keep waiting through.
            Ok(WaitStatus::Stopped(..)) | Ok(WaitStatus::Continued(_)) => continue,
            Ok(status) => return Err(LaunchFailure::WaitFailed(format!("unexpected status {:?}", status))),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(LaunchFailure::WaitFailed(e.to_string())),
        }
    }
}
