/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Run a shell command with bounded output and a wall-clock timeout

use crate::timeout::Timeout;
use aws_smithy_async::rt::sleep::{AsyncSleep, SharedAsyncSleep};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

const READ_BUFFER_SIZE: usize = 4096;

/// Returns the given `command` string with arguments redacted if there were any
pub(crate) fn debug_fmt_command_string(command: &str) -> Cow<'_, str> {
    match command.find(char::is_whitespace) {
        Some(index) => Cow::Owned(format!("{} ** arguments redacted **", &command[0..index])),
        None => Cow::Borrowed(command),
    }
}

/// Exit code and captured output of a completed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandOutput {
    /// Exit code of the process, or `-1` when it was terminated by a signal
    pub(crate) exit_code: i32,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

#[derive(Debug)]
pub(crate) enum CommandError {
    /// The process could not be started
    Spawn(std::io::Error),

    /// Reading output or waiting for the process failed
    Io(std::io::Error),

    /// Stdout and stderr together grew past the configured limit
    OutputLimitExceeded(usize),

    /// The process did not complete in time
    TimedOut(Duration),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Spawn(err) => write!(f, "failed to spawn command: {}", err),
            CommandError::Io(err) => write!(f, "failed to read command output: {}", err),
            CommandError::OutputLimitExceeded(limit) => {
                write!(f, "Process output exceeded limit of {} bytes", limit)
            }
            CommandError::TimedOut(timeout) => write!(
                f,
                "command did not complete within {} ms",
                timeout.as_millis()
            ),
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CommandError::Spawn(err) | CommandError::Io(err) => Some(err),
            _ => None,
        }
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/C");
        windows_command_arg(&mut cmd, command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

// cmd.exe does its own parsing of the command line: passing the command through the standard
// argument quoting would escape embedded quotes a second time.
#[cfg(windows)]
fn windows_command_arg(cmd: &mut Command, command: &str) {
    cmd.raw_arg(command);
}

#[cfg(not(windows))]
fn windows_command_arg(cmd: &mut Command, command: &str) {
    cmd.arg(command);
}

/// Execute `command` through the platform shell
///
/// Stdout and stderr are captured separately; the output limit applies to the two together. A
/// nonzero exit code is returned as part of [`CommandOutput`], not as an error. If the process is still running when `timeout` elapses, it
/// is killed.
pub(crate) async fn execute_command(
    command: &str,
    max_output_bytes: usize,
    timeout: Duration,
    sleep: &SharedAsyncSleep,
) -> Result<CommandOutput, CommandError> {
    let run = run_command(command, max_output_bytes);
    match Timeout::new(run, sleep.sleep(timeout)).await {
        Ok(result) => result,
        Err(_) => Err(CommandError::TimedOut(timeout)),
    }
}

async fn run_command(command: &str, max_output_bytes: usize) -> Result<CommandOutput, CommandError> {
    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Security: command arguments can be logged at trace level, but must be redacted at debug level
    // since they can contain sensitive information.
    tracing::trace!(command = ?cmd, "executing command (unredacted)");
    tracing::debug!(command = ?debug_fmt_command_string(command), "executing command");

    let mut child = cmd.spawn().map_err(CommandError::Spawn)?;
    let missing_pipe =
        || std::io::Error::new(std::io::ErrorKind::BrokenPipe, "output pipe was not captured");
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| CommandError::Io(missing_pipe()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| CommandError::Io(missing_pipe()))?;

    let mut out = Captured::new(max_output_bytes);
    let (mut stdout_done, mut stderr_done) = (false, false);
    while !(stdout_done && stderr_done) {
        tokio::select! {
            chunk = read_chunk(&mut stdout), if !stdout_done => match chunk? {
                Some(chunk) => out.append(Stream::Stdout, &chunk)?,
                None => stdout_done = true,
            },
            chunk = read_chunk(&mut stderr), if !stderr_done => match chunk? {
                Some(chunk) => out.append(Stream::Stderr, &chunk)?,
                None => stderr_done = true,
            },
        }
    }

    let status = child.wait().await.map_err(CommandError::Io)?;
    tracing::debug!(command = ?debug_fmt_command_string(command), status = ?status, "executed command");
    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    })
}

/// Read the next chunk, or `None` at end of stream
async fn read_chunk(reader: &mut (impl AsyncRead + Unpin)) -> Result<Option<Vec<u8>>, CommandError> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let n = reader.read(&mut buf).await.map_err(CommandError::Io)?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some(buf))
}

enum Stream {
    Stdout,
    Stderr,
}

struct Captured {
    limit: usize,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    fn append(&mut self, stream: Stream, chunk: &[u8]) -> Result<(), CommandError> {
        if self.stdout.len() + self.stderr.len() + chunk.len() > self.limit {
            return Err(CommandError::OutputLimitExceeded(self.limit));
        }
        match stream {
            Stream::Stdout => self.stdout.extend_from_slice(chunk),
            Stream::Stderr => self.stderr.extend_from_slice(chunk),
        }
        Ok(())
    }
}
