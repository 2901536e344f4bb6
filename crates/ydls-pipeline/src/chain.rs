//! Process chain: spawning the engines, piping them together and
//! supervising them until the last one exits.
//!
//! The producer's stdout is handed to the consumer as its stdin, so bytes
//! flow through OS pipes and backpressure reaches the producer without any
//! buffering here. Each engine's stderr is drained by its own task.

use std::collections::VecDeque;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ydls_core::{Error, Result};

use crate::engines::{EngineSpec, Stage};
use crate::orchestrator::DownloadState;

/// Stderr lines kept per engine for error messages.
const STDERR_TAIL_LINES: usize = 8;

/// How long to wait for a drained stderr after its engine exited.
const STDERR_GRACE: Duration = Duration::from_secs(1);

struct RunningEngine {
    stage: Stage,
    name: String,
    child: Child,
    stderr: Option<JoinHandle<Vec<String>>>,
}

/// Spawn `chain` (producer first) and return the last engine's output and
/// the completion handle.
///
/// If spawning any engine fails, engines already started are killed and
/// reaped before the error is returned.
///
/// # Errors
///
/// Returns [`Error::Pipeline`] naming the stage that could not be started.
pub fn spawn_chain(
    chain: Vec<EngineSpec>,
    cancel: CancellationToken,
) -> Result<(MediaStream, Completion)> {
    let mut running: Vec<RunningEngine> = Vec::with_capacity(chain.len());
    let mut upstream: Option<ChildStdout> = None;

    for spec in chain {
        match spawn_engine(&spec, upstream.take()) {
            Ok((engine, stdout)) => {
                upstream = Some(stdout);
                running.push(engine);
            }
            Err(e) => {
                reap_in_background(running);
                return Err(e);
            }
        }
    }

    let Some(stdout) = upstream else {
        return Err(Error::Internal("empty process chain".into()));
    };

    let handle = tokio::spawn(supervise(running, cancel.clone()));
    let media = MediaStream {
        inner: stdout,
        cancel: cancel.clone(),
        eof: false,
        bytes_read: 0,
    };
    Ok((media, Completion { handle, cancel }))
}

fn spawn_engine(
    spec: &EngineSpec,
    stdin: Option<ChildStdout>,
) -> Result<(RunningEngine, ChildStdout)> {
    let name = spec.program_name();
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match stdin {
        Some(upstream) => {
            let stdio: Stdio = upstream.try_into().map_err(|e: std::io::Error| {
                Error::pipeline(spec.stage.as_str(), format!("failed to pipe into {name}: {e}"))
            })?;
            cmd.stdin(stdio);
        }
        None => {
            cmd.stdin(Stdio::null());
        }
    }

    tracing::debug!(stage = %spec.stage, engine = %name, args = ?spec.args, "Spawning engine");

    let mut child = cmd.spawn().map_err(|e| {
        Error::pipeline(spec.stage.as_str(), format!("failed to start {name}: {e}"))
    })?;

    let stderr = child.stderr.take().map(|s| drain_stderr(name.clone(), s));
    let Some(stdout) = child.stdout.take() else {
        return Err(Error::Internal(format!("{name} has no stdout pipe")));
    };

    Ok((
        RunningEngine {
            stage: spec.stage,
            name,
            child,
            stderr,
        },
        stdout,
    ))
}

/// Forward an engine's stderr to the debug log, keeping the last lines.
fn drain_stderr(engine: String, stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut segments = BufReader::new(stderr).split(b'\n');
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

        while let Ok(Some(segment)) = segments.next_segment().await {
            let line = String::from_utf8_lossy(&segment).trim_end().to_string();
            if line.is_empty() {
                continue;
            }
            tracing::debug!(engine = %engine, "{line}");
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        tail.into()
    })
}

/// Wait for every engine; the first non-zero exit becomes the result.
async fn supervise(mut engines: Vec<RunningEngine>, cancel: CancellationToken) -> Result<()> {
    let mut failure: Option<(usize, String)> = None;
    let mut cancelled = false;

    {
        let mut waits: FuturesUnordered<_> = engines
            .iter_mut()
            .enumerate()
            .map(|(i, engine)| async move { (i, engine.child.wait().await) })
            .collect();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = waits.next() => match next {
                    None => break,
                    Some((i, result)) => {
                        if let Some(reason) = exit_failure(result) {
                            if failure.is_none() {
                                failure = Some((i, reason));
                            }
                        }
                    }
                },
            }
        }
    }

    if cancelled {
        for engine in &mut engines {
            let _ = engine.child.start_kill();
        }
        for engine in &mut engines {
            let _ = engine.child.wait().await;
        }
        tracing::debug!(state = %DownloadState::Failed, "Pipeline cancelled, engines reaped");
        // An engine that already failed on its own is reported as such.
        if failure.is_none() {
            return Err(Error::Cancelled);
        }
    }

    match failure {
        None => {
            tracing::info!(state = %DownloadState::Completed, "Pipeline completed");
            Ok(())
        }
        Some((i, reason)) => {
            let engine = &mut engines[i];
            let mut message = format!("{} {reason}", engine.name);
            if let Some(tail) = stderr_tail(engine).await {
                message.push_str(": ");
                message.push_str(&tail);
            }
            let err = Error::pipeline(engine.stage.as_str(), message);
            tracing::warn!(state = %DownloadState::Failed, "{err}");
            Err(err)
        }
    }
}

fn exit_failure(result: std::io::Result<ExitStatus>) -> Option<String> {
    match result {
        Ok(status) if status.success() => None,
        Ok(status) => Some(format!("exited with {status}")),
        Err(e) => Some(format!("could not be waited on: {e}")),
    }
}

async fn stderr_tail(engine: &mut RunningEngine) -> Option<String> {
    let handle = engine.stderr.as_mut()?;
    match tokio::time::timeout(STDERR_GRACE, handle).await {
        Ok(Ok(lines)) if !lines.is_empty() => Some(lines.join("; ")),
        _ => None,
    }
}

fn reap_in_background(mut engines: Vec<RunningEngine>) {
    if engines.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for engine in &mut engines {
            let _ = engine.child.start_kill();
            let _ = engine.child.wait().await;
        }
    });
}

/// Handle yielding the terminal result of a process chain.
///
/// Dropping it does not stop the chain; the supervisor keeps reaping the
/// engines in the background.
#[derive(Debug)]
pub struct Completion {
    handle: JoinHandle<Result<()>>,
    cancel: CancellationToken,
}

impl Completion {
    /// Wait until every engine exited.
    ///
    /// Returns `Ok(())` on a clean run, the first engine failure as
    /// [`Error::Pipeline`], or [`Error::Cancelled`] when the flow was
    /// aborted.
    pub async fn wait(self) -> Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("pipeline supervisor failed: {e}"))),
        }
    }

    /// Kill every engine still running.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that aborts this chain when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// The chain's output bytes.
///
/// Dropping the stream before end of file cancels the chain, so a caller
/// that stops reading never leaves engines blocked on a full pipe.
#[derive(Debug)]
pub struct MediaStream {
    inner: ChildStdout,
    cancel: CancellationToken,
    eof: bool,
    bytes_read: u64,
}

impl MediaStream {
    /// Bytes delivered so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

impl AsyncRead for MediaStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = buf.filled().len() - before;
            if n == 0 && buf.remaining() > 0 {
                this.eof = true;
            }
            this.bytes_read += n as u64;
        }
        poll
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        if !self.eof {
            self.cancel.cancel();
        }
    }
}
