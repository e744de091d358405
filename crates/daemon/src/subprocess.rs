// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helper binary invocation with controlled stdio and waiting.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};
use vdm_core::{Error, Result, SubprocessFailure};

/// Builder for one child invocation.
///
/// Environment variables are merged over the daemon's own environment
/// unless [`Command::clear_env`] asks for a clean slate. Redirections
/// apply to [`run`]; [`run_with_captured_stdio`] always pipes.
pub struct Command {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    clear_env: bool,
    cwd: Option<PathBuf>,
    stdout: Option<Stdio>,
    stderr: Option<Stdio>,
    deadline: Option<Duration>,
}

impl Command {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            clear_env: false,
            cwd: None,
            stdout: None,
            stderr: None,
            deadline: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Replace the inherited environment instead of merging over it.
    pub fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Redirect the child's stdout to a caller-supplied sink.
    pub fn stdout(mut self, sink: Stdio) -> Self {
        self.stdout = Some(sink);
        self
    }

    /// Redirect the child's stderr to a caller-supplied sink.
    pub fn stderr(mut self, sink: Stdio) -> Self {
        self.stderr = Some(sink);
        self
    }

    /// Kill the child and fail with `TimedOut` if it outlives `limit`.
    pub fn deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(limit);
        self
    }

    fn into_tokio(self) -> (tokio::process::Command, Option<Duration>) {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        if self.clear_env {
            command.env_clear();
        }
        command.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        if let Some(sink) = self.stdout {
            command.stdout(sink);
        }
        if let Some(sink) = self.stderr {
            command.stderr(sink);
        }
        command.kill_on_drop(true);
        (command, self.deadline)
    }
}

/// Captured output of a piped invocation.
#[derive(Debug)]
pub struct CapturedStdio {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Spawns the child and waits for a clean zero exit.
///
/// Non-zero exit, signal death, and lost-pid waits surface as
/// distinguishable [`SubprocessFailure`] kinds.
pub async fn run(cmd: Command) -> Result<()> {
    let program = cmd.program.clone();
    let (mut command, deadline) = cmd.into_tokio();
    command.stdin(Stdio::null());
    let mut child = command.spawn()?;
    let status = wait_child(&mut child, deadline).await?;
    let result = check_status(status);
    if let Err(e) = &result {
        info!(program = %program.display(), error = %e, "helper invocation failed");
    }
    result
}

/// Spawns the child with all three streams piped, feeds `stdin_bytes`,
/// and drains stdout and stderr concurrently so neither pipe can fill
/// and deadlock the child.
pub async fn run_with_captured_stdio(
    cmd: Command,
    stdin_bytes: Option<&[u8]>,
) -> Result<CapturedStdio> {
    let (mut command, deadline) = cmd.into_tokio();
    command
        .stdin(if stdin_bytes.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn()?;

    if let Some(bytes) = stdin_bytes {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("child stdin pipe missing".to_string()))?;
        let bytes = bytes.to_vec();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&bytes).await {
                warn!(error = %e, "failed to feed child stdin");
            }
            // Dropping stdin closes the pipe so the child sees EOF.
        });
    }

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| Error::Internal("child stdout pipe missing".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| Error::Internal("child stderr pipe missing".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let status = wait_child(&mut child, deadline).await?;
    let stdout = join_reader(stdout_task).await?;
    let stderr = join_reader(stderr_task).await?;

    use std::os::unix::process::ExitStatusExt;
    let exit_code = match status.code() {
        Some(code) => code,
        None => match status.signal() {
            Some(signal) => return Err(SubprocessFailure::Signaled { signal }.into()),
            None => return Err(SubprocessFailure::LostPid.into()),
        },
    };
    Ok(CapturedStdio { exit_code, stdout, stderr })
}

async fn wait_child(
    child: &mut tokio::process::Child,
    deadline: Option<Duration>,
) -> Result<std::process::ExitStatus> {
    match deadline {
        None => Ok(child.wait().await?),
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(waited) => Ok(waited?),
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(SubprocessFailure::TimedOut(limit).into())
            }
        },
    }
}

async fn join_reader(task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match task.await {
        Ok(read) => Ok(read?),
        Err(join_err) => Err(Error::Internal(format!("pipe reader task failed: {join_err}"))),
    }
}

fn check_status(status: std::process::ExitStatus) -> Result<()> {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(SubprocessFailure::ExitCode { code }.into()),
        None => match status.signal() {
            Some(signal) => Err(SubprocessFailure::Signaled { signal }.into()),
            None => Err(SubprocessFailure::LostPid.into()),
        },
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
