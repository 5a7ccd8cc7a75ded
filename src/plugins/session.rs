//! Plugin session
//!
//! Owns one plugin subprocess and the JSON-RPC conversation with it.
//! Requests are multiplexed over the single stdin/stdout pair: every call
//! gets a fresh numeric ID and a one-shot slot, and a background read loop
//! routes each response line to the matching slot.

use super::protocol::{self, Inbound, Request, MAX_LINE_BYTES};
use crate::config::{PluginConfig, PluginKind};
use crate::error::PluginError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, warn};

/// How long `stop` waits for the plugin to close its output before killing it
pub const STOP_GRACE: Duration = Duration::from_secs(3);

/// Callback for plugin-initiated notifications: `(method, params)`
pub type NotifyHandler = Arc<dyn Fn(&str, Option<Value>) + Send + Sync>;

/// In-flight request ID -> single-slot result queue
type PendingMap = Arc<StdMutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// A running (or runnable) plugin process and its JSON-RPC conversation
pub struct PluginSession {
    name: String,
    config: PluginConfig,
    child: Mutex<Option<Child>>,
    /// Write end of the plugin's stdin; the mutex is the write lock
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    /// Taken by `start` and moved into the read loop
    done_tx: StdMutex<Option<watch::Sender<bool>>>,
    /// Flips to true once the read loop has exited
    done: watch::Receiver<bool>,
    /// Flips to true when `stop` begins; wakes callers stuck mid-write
    stopping: watch::Sender<bool>,
    started_at: StdMutex<Option<DateTime<Utc>>>,
    on_notify: Option<NotifyHandler>,
}

impl PluginSession {
    /// Create a session for `config`. Nothing is spawned until `start`.
    pub fn new(name: impl Into<String>, config: PluginConfig) -> Self {
        let (done_tx, done) = watch::channel(false);
        Self {
            name: name.into(),
            config,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            done_tx: StdMutex::new(Some(done_tx)),
            done,
            stopping: watch::channel(false).0,
            started_at: StdMutex::new(None),
            on_notify: None,
        }
    }

    /// Install the callback invoked for plugin notifications
    pub fn with_notify_handler(mut self, handler: NotifyHandler) -> Self {
        self.on_notify = Some(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Option<PluginKind> {
        self.config.kind()
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// When the process was launched, if it is still owned by this session
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.started_at)
    }

    /// Launch the plugin binary and begin the read loop
    pub async fn start(&self) -> Result<(), PluginError> {
        let done_tx = lock(&self.done_tx)
            .take()
            .ok_or_else(|| self.launch_error("session was already started"))?;

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.launch_error(e))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(self.launch_error("stdio pipes unavailable"));
            }
        };

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(self.name.clone(), stderr));
        }

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);
        *lock(&self.started_at) = Some(Utc::now());

        tokio::spawn(read_loop(
            self.name.clone(),
            stdout,
            Arc::clone(&self.pending),
            self.on_notify.clone(),
            done_tx,
        ));

        Ok(())
    }

    /// Send a request and wait for its result or `timeout`, whichever comes
    /// first. A plugin-reported JSON-RPC error comes back as an `Ok` payload
    /// tagged `isError: true`.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, PluginError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let line = Request::call(id, method, params).to_line()?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let _pending = PendingGuard {
            pending: &self.pending,
            id,
        };

        // Read loop already gone: nobody would ever answer
        if *self.done.borrow() {
            return Err(PluginError::Exited(self.name.clone()));
        }

        let mut stopping = self.stopping.subscribe();
        let mut progress = WriteProgress::Waiting;
        let exchange = tokio::time::timeout(timeout, async {
            self.send_line(&line, &mut progress).await?;
            rx.await
                .map_err(|_| PluginError::SessionClosed(self.name.clone()))
        });

        let outcome = tokio::select! {
            outcome = exchange => outcome.unwrap_or_else(|_| {
                Err(PluginError::Timeout {
                    name: self.name.clone(),
                    method: method.to_string(),
                    id,
                })
            }),
            _ = stopped(&mut stopping) => Err(PluginError::SessionClosed(self.name.clone())),
        };

        if progress == WriteProgress::Partial {
            self.abandon_stdin();
        }
        outcome
    }

    /// Fire-and-forget notification to the plugin
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), PluginError> {
        let line = Request::notification(method, params).to_line()?;
        self.write_line(&line).await
    }

    /// Close stdin, give the plugin a grace period to exit, then kill and
    /// reap it. Every call still waiting is failed. If a writer is stuck on
    /// a full pipe the grace period is skipped and the plugin is killed.
    pub async fn stop(&self) {
        let graceful = match self.stdin.try_lock() {
            Ok(mut stdin) => {
                drop(stdin.take());
                true
            }
            Err(_) => false,
        };
        self.stopping.send_replace(true);

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            let exited = graceful && {
                let mut done = self.done.clone();
                tokio::time::timeout(STOP_GRACE, done.wait_for(|d| *d))
                    .await
                    .map(|r| r.is_ok())
                    .unwrap_or(false)
            };
            if !exited {
                debug!(plugin = %self.name, graceful, "killing plugin");
            }
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        // A writer released by the kill no longer holds the lock
        if !graceful {
            self.abandon_stdin();
        }

        *lock(&self.started_at) = None;
        fail_pending(&self.pending);
    }

    /// True while the process is owned by this session and its output is open
    pub fn is_running(&self) -> bool {
        lock(&self.started_at).is_some() && !*self.done.borrow()
    }

    /// Number of calls currently waiting for a response
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    async fn write_line(&self, line: &[u8]) -> Result<(), PluginError> {
        let mut progress = WriteProgress::Waiting;
        let result = self.send_line(line, &mut progress).await;
        if progress == WriteProgress::Partial {
            self.abandon_stdin();
        }
        result
    }

    /// Write one line under the stdin lock. `progress` tells the caller
    /// whether a cancelled write may have left half a line in the pipe.
    async fn send_line(&self, line: &[u8], progress: &mut WriteProgress) -> Result<(), PluginError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| PluginError::NotRunning(self.name.clone()))?;

        *progress = WriteProgress::Partial;
        stdin.write_all(line).await.map_err(|e| self.write_error(e))?;
        stdin.flush().await.map_err(|e| self.write_error(e))?;
        *progress = WriteProgress::Sent;
        Ok(())
    }

    /// Close stdin after an interrupted write; the stream can no longer be
    /// framed
    fn abandon_stdin(&self) {
        if let Ok(mut stdin) = self.stdin.try_lock() {
            if stdin.take().is_some() {
                warn!(plugin = %self.name, "plugin write interrupted, closing stdin");
            }
        }
    }

    fn launch_error(&self, reason: impl ToString) -> PluginError {
        PluginError::Launch {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_error(&self, source: std::io::Error) -> PluginError {
        PluginError::Write {
            name: self.name.clone(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteProgress {
    Waiting,
    Partial,
    Sent,
}

/// Removes a pending entry when the call returns, however it returns
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

/// Outcome of reading one bounded line
#[derive(Debug, PartialEq)]
enum LineRead {
    Line,
    Eof,
    TooLong,
}

/// Read up to and excluding the next `\n`, refusing lines longer than
/// `MAX_LINE_BYTES`
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_LINE_BYTES as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        return Ok(LineRead::Line);
    }
    if buf.len() > MAX_LINE_BYTES {
        return Ok(LineRead::TooLong);
    }
    Ok(LineRead::Line)
}

/// Consume plugin output until the stream closes. Responses resolve pending
/// calls, notifications go to `on_notify`, malformed lines are skipped.
async fn read_loop<R>(
    name: String,
    output: R,
    pending: PendingMap,
    on_notify: Option<NotifyHandler>,
    done_tx: watch::Sender<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match read_bounded_line(&mut reader, &mut buf).await {
            Ok(LineRead::Line) => {}
            Ok(LineRead::Eof) => break,
            Ok(LineRead::TooLong) => {
                warn!(plugin = %name, limit = MAX_LINE_BYTES, "plugin output line too long, closing session");
                break;
            }
            Err(e) => {
                warn!(plugin = %name, error = %e, "plugin read failed");
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf);
        let line = text.trim();
        if line.is_empty() {
            continue;
        }

        match protocol::parse_line(line) {
            Ok(Inbound::Response { id, outcome }) => {
                let slot = lock(&pending).remove(&id);
                match slot {
                    Some(tx) => {
                        let _ = tx.send(outcome);
                    }
                    None => debug!(plugin = %name, id, "plugin response for unknown id"),
                }
            }
            Ok(Inbound::Notification { method, params }) => {
                debug!(plugin = %name, method = %method, "plugin notification");
                if let Some(handler) = &on_notify {
                    handler(&method, params);
                }
            }
            Ok(Inbound::Ignored) => debug!(plugin = %name, "plugin line ignored"),
            Err(e) => warn!(plugin = %name, error = %e, "plugin read invalid json"),
        }
    }

    let _ = done_tx.send(true);
    fail_pending(&pending);
    debug!(plugin = %name, "plugin read loop finished");
}

async fn forward_stderr(name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(plugin = %name, "stderr: {}", line);
    }
}

async fn stopped(stopping: &mut watch::Receiver<bool>) {
    let _ = stopping.wait_for(|s| *s).await;
}

/// Drop every pending sender so blocked callers wake with an error
fn fail_pending(pending: &PendingMap) {
    lock(pending).clear();
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
