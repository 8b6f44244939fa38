// src/system/executor.rs

//! Spawns processes, streams their merged output and kills them on cancellation.

use crate::CancellationToken;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often a running child is polled for exit and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Why a process could not run to completion.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The argv was empty.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The executable could not be located. Distinct from a command that ran and failed.
    #[error("Command '{0}' could not be found.")]
    CommandNotFound(String),
    /// Spawning or waiting on the process failed.
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    /// The run was interrupted; the process was killed.
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

/// Receives each line of combined output as soon as it is read.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A sink that discards everything; output is still retained in `ProcessOutput`.
pub fn discard_output() -> OutputSink {
    Arc::new(|_: &str| {})
}

/// Describes one process to spawn.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRequest<'a> {
    /// Program followed by its arguments.
    pub argv: &'a [String],
    /// Working directory.
    pub cwd: &'a Path,
    /// Variables set on the process.
    pub env: &'a BTreeMap<String, String>,
    /// Start from an empty environment instead of inheriting the orchestrator's.
    pub clear_env: bool,
}

/// What a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Exited with status zero.
    pub success: bool,
    /// Merged stdout and stderr.
    pub output: String,
    /// Wall time from spawn to exit.
    pub duration: Duration,
}

/// Returns `Err(Cancelled)` once the token has been set.
pub fn check_for_cancellation(token: &CancellationToken) -> Result<(), ExecutionError> {
    if token.load(Ordering::SeqCst) {
        Err(ExecutionError::Cancelled)
    } else {
        Ok(())
    }
}

/// Spawns a process, streams its merged stdout/stderr line by line to `sink`
/// and waits for it, killing it if the cancellation token is set meanwhile.
///
/// A non-zero exit is *not* an error: it is reported in `ProcessOutput`.
pub fn execute_streaming(
    request: ProcessRequest<'_>,
    sink: &OutputSink,
    cancellation_token: &CancellationToken,
) -> Result<ProcessOutput, ExecutionError> {
    check_for_cancellation(cancellation_token)?;

    let (program, args) = request
        .argv
        .split_first()
        .ok_or(ExecutionError::EmptyCommand)?;
    let display = request.argv.join(" ");

    let mut command = StdCommand::new(program);
    command.args(args).current_dir(dunce::simplified(request.cwd));
    if request.clear_env {
        command.env_clear();
    }
    command
        .envs(request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let started = Instant::now();
    let mut child = command.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound => ExecutionError::CommandNotFound(program.clone()),
        _ => ExecutionError::CommandFailed(display.clone(), e),
    })?;
    log::trace!("Spawned '{}' (PID: {})", display, child.id());

    let captured = Arc::new(Mutex::new(String::new()));
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, sink.clone(), captured.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, sink.clone(), captured.clone()));
    }

    let status = wait_or_cancel(&mut child, &display, cancellation_token)?;

    for reader in readers {
        if reader.join().is_err() {
            log::warn!("Output reader for '{}' panicked.", display);
        }
    }

    let output = match Arc::try_unwrap(captured) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()),
        Err(shared) => shared
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default(),
    };

    Ok(ProcessOutput {
        exit_code: status.code(),
        success: status.success(),
        output,
        duration: started.elapsed(),
    })
}

/// Executes a command and only captures its output.
pub fn execute_captured(
    request: ProcessRequest<'_>,
    cancellation_token: &CancellationToken,
) -> Result<ProcessOutput, ExecutionError> {
    execute_streaming(request, &discard_output(), cancellation_token)
}

/// Non-blocking wait loop to allow for cancellation.
fn wait_or_cancel(
    child: &mut Child,
    display: &str,
    cancellation_token: &CancellationToken,
) -> Result<std::process::ExitStatus, ExecutionError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if check_for_cancellation(cancellation_token).is_err() {
                    log::debug!(
                        "Cancellation requested, killing child process (PID: {})...",
                        child.id()
                    );
                    if let Err(e) = child.kill() {
                        log::warn!("Failed to kill child process {}: {}", child.id(), e);
                    }
                    // Reap the process so it does not linger as a zombie.
                    child.wait().ok();
                    return Err(ExecutionError::Cancelled);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(ExecutionError::CommandFailed(display.to_string(), e)),
        }
    }
}

/// Forwards every line of `pipe` to the sink and appends it to `captured`.
/// Invalid UTF-8 is replaced rather than treated as an error.
fn spawn_reader<R: Read + Send + 'static>(
    pipe: R,
    sink: OutputSink,
    captured: Arc<Mutex<String>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    sink(line.trim_end_matches(['\n', '\r']));
                    if let Ok(mut all) = captured.lock() {
                        all.push_str(&line);
                    }
                }
                Err(e) => {
                    log::debug!("Stopped reading child output: {}", e);
                    break;
                }
            }
        }
    })
}
