//! Lifecycle and request/response I/O for one model worker process.
//!
//! The worker is a Python interpreter running the embedded bridge script. It
//! is driven synchronously: callers are already on a blocking thread, and
//! generation has no timeout.

use super::error::EngineError;
use super::protocol::{JsonRpcRequest, LogParams, NOTIFY_LOG, WorkerMessage};
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Bridge script run by `python -u -c`.
const BRIDGE_SCRIPT: &str = include_str!("bridge.py");

/// How to start a worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Python interpreter.
    pub python: String,
    /// Exported as `PKUSEG_HOME` in the worker environment.
    pub segmenter_home: Option<PathBuf>,
}

impl WorkerCommand {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-u")
            .arg("-c")
            .arg(BRIDGE_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(home) = &self.segmenter_home {
            cmd.env("PKUSEG_HOME", home);
        }
        cmd
    }
}

/// A running worker process.
///
/// The child is killed when this value is dropped.
pub struct WorkerProcess {
    label: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl WorkerProcess {
    /// Spawns the worker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SpawnFailed`] if the interpreter cannot be started.
    pub fn spawn(command: &WorkerCommand, label: &str) -> Result<Self, EngineError> {
        let mut child = command.command().spawn().map_err(EngineError::SpawnFailed)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(EngineError::protocol("worker stdio was not piped"));
        };
        tracing::debug!(worker = %label, pid = child.id(), "spawned model worker");
        Ok(Self {
            label: label.to_owned(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
        })
    }

    /// Sends a request and waits for its response, forwarding log notifications.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Remote`]: the worker answered with an error.
    /// - [`EngineError::ProcessExited`]: the worker closed its pipes.
    /// - [`EngineError::ProtocolError`]: malformed or mismatched reply.
    pub fn call(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, EngineError> {
        let id = self.next_id;
        self.next_id += 1;
        let line = JsonRpcRequest::new(method, params, id).to_line()?;

        tracing::debug!(worker = %self.label, method, id, "sending JSON-RPC request");
        self.write_line(&line)?;

        loop {
            match self.read_message()? {
                WorkerMessage::Notification { method, params } => {
                    self.forward_notification(&method, params);
                }
                WorkerMessage::Response { id: got, .. } | WorkerMessage::Error { id: got, .. }
                    if got < id =>
                {
                    tracing::warn!(
                        worker = %self.label,
                        expected = id,
                        got,
                        "dropping stale reply"
                    );
                }
                WorkerMessage::Response { id: got, result } => {
                    if got != id {
                        return Err(EngineError::protocol(format!(
                            "response id mismatch: expected {id}, got {got}"
                        )));
                    }
                    return Ok(result);
                }
                WorkerMessage::Error { id: got, error } => {
                    if got != id {
                        return Err(EngineError::protocol(format!(
                            "error response id mismatch: expected {id}, got {got}"
                        )));
                    }
                    tracing::debug!(
                        worker = %self.label,
                        id,
                        code = error.code,
                        "worker reported error"
                    );
                    return Err(EngineError::remote(error.message));
                }
            }
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), EngineError> {
        let result = self
            .stdin
            .write_all(line.as_bytes())
            .and_then(|()| self.stdin.flush());
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::warn!(worker = %self.label, "stdin broken pipe, worker exited");
                Err(self.exited())
            }
            Err(e) => Err(EngineError::protocol(format!("stdin write error: {e}"))),
        }
    }

    /// Next protocol message. Lines that are not JSON-RPC (native libraries
    /// writing to the worker's stdout) are logged and skipped.
    fn read_message(&mut self) -> Result<WorkerMessage, EngineError> {
        loop {
            let mut line = String::new();
            let n = self
                .stdout
                .read_line(&mut line)
                .map_err(|e| EngineError::protocol(format!("stdout read error: {e}")))?;
            if n == 0 {
                return Err(self.exited());
            }
            match WorkerMessage::parse(&line) {
                Ok(message) => return Ok(message),
                Err(e) => tracing::warn!(
                    worker = %self.label,
                    error = %e,
                    line = %line.trim_end(),
                    "skipping non-protocol output"
                ),
            }
        }
    }

    fn exited(&mut self) -> EngineError {
        let exit_code = self.child.wait().ok().and_then(|status| status.code());
        EngineError::ProcessExited { exit_code }
    }

    fn forward_notification(&self, method: &str, params: Option<serde_json::Value>) {
        if method != NOTIFY_LOG {
            tracing::debug!(worker = %self.label, method, "ignoring worker notification");
            return;
        }
        let Some(log) = params.and_then(|p| serde_json::from_value::<LogParams>(p).ok()) else {
            return;
        };
        match log.level.as_str() {
            "error" => tracing::error!(worker = %self.label, "{}", log.message),
            "warning" | "warn" => tracing::warn!(worker = %self.label, "{}", log.message),
            "debug" => tracing::debug!(worker = %self.label, "{}", log.message),
            _ => tracing::info!(worker = %self.label, "{}", log.message),
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
            tracing::debug!(worker = %self.label, "killed model worker on drop");
        }
    }
}

impl fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("label", &self.label)
            .field("pid", &self.child.id())
            .finish()
    }
}

/// Shell helper extracting the request id from a JSON-RPC line.
#[cfg(all(test, unix))]
const REPLY_ID: &str =
    r#"reply_id() { printf '%s\n' "$1" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p'; }"#;

/// Writes an executable `/bin/sh` script standing in for the interpreter.
#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
pub(crate) fn fake_interpreter(dir: &std::path::Path, body: &str) -> WorkerCommand {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("python");
    std::fs::write(&path, format!("#!/bin/sh\n{REPLY_ID}\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    WorkerCommand {
        python: path.to_string_lossy().into_owned(),
        segmenter_home: None,
    }
}
