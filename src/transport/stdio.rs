//! Stdio adapter: speaks line-delimited JSON-RPC to a subprocess.
//!
//! One in-flight request at a time, enforced by a mutex guarding the write+read
//! cycle; restarts are explicit, bounded operations driven by an observed
//! failure, never a silent retry loop (§4.1, design notes).

use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::{Adapter, JsonRpcRequest, JsonRpcResponse, TransportError};

/// Lifecycle state of the subprocess backing a stdio adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Unstarted,
    Running,
    Crashed,
}

struct Process {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Configuration needed to spawn the subprocess. Immutable for the adapter's
/// lifetime (upstream descriptors are immutable per run, §3).
#[derive(Debug, Clone)]
pub struct StdioAdapterConfig {
    pub command: Vec<String>,
    pub max_restarts: u32,
    pub kill_grace: Duration,
}

impl Default for StdioAdapterConfig {
    fn default() -> Self {
        Self { command: Vec::new(), max_restarts: 3, kill_grace: Duration::from_secs(5) }
    }
}

/// Adapter for an upstream speaking MCP over stdio. Owns the subprocess
/// exclusively; no shared mutable pointers into its state from outside.
pub struct StdioAdapter {
    config: StdioAdapterConfig,
    process: Arc<Mutex<Option<Process>>>,
    state: Arc<Mutex<ProcessState>>,
    restart_count: AtomicU32,
}

impl StdioAdapter {
    pub fn new(config: StdioAdapterConfig) -> Self {
        Self {
            config,
            process: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(ProcessState::Unstarted)),
            restart_count: AtomicU32::new(0),
        }
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::Acquire)
    }

    async fn spawn(&self) -> Result<Process, TransportError> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| TransportError::Parse("empty command".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(TransportError::SpawnFailed)?;
        let stdin = child.stdin.take().ok_or(TransportError::ProcessExited)?;
        let stdout = child.stdout.take().ok_or(TransportError::ProcessExited)?;
        let stderr = child.stderr.take().ok_or(TransportError::ProcessExited)?;

        tokio::spawn(drain_stderr(stderr));

        Ok(Process { child, stdin, stdout: BufReader::new(stdout) })
    }

    /// Get the running process, spawning it on first use.
    async fn ensure_running(&self) -> Result<(), TransportError> {
        let mut guard = self.process.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let process = self.spawn().await?;
        *guard = Some(process);
        *self.state.lock().await = ProcessState::Running;
        Ok(())
    }

    /// Terminate the current process (graceful, then hard kill after the grace
    /// period) and clear it so the next call respawns.
    async fn restart(&self) -> Result<(), TransportError> {
        let restarts = self.restart_count.load(Ordering::Acquire);
        if restarts >= self.config.max_restarts {
            *self.state.lock().await = ProcessState::Crashed;
            return Err(TransportError::RestartBudgetExhausted {
                restart_count: restarts,
                max_restarts: self.config.max_restarts,
            });
        }

        {
            let mut guard = self.process.lock().await;
            if let Some(mut process) = guard.take() {
                // Stdin closed first so cooperating children can exit cleanly.
                let _ = process.stdin.shutdown().await;
                let grace = tokio::time::timeout(self.config.kill_grace, process.child.wait()).await;
                if grace.is_err() {
                    let _ = process.child.kill().await;
                }
            }
        }

        self.restart_count.fetch_add(1, Ordering::AcqRel);
        let process = self.spawn().await?;
        *self.process.lock().await = Some(process);
        *self.state.lock().await = ProcessState::Running;
        Ok(())
    }

    /// Graceful shutdown: close stdin, wait up to the kill grace, then hard-kill.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let mut guard = self.process.lock().await;
        if let Some(mut process) = guard.take() {
            let _ = process.stdin.shutdown().await;
            let grace = tokio::time::timeout(self.config.kill_grace, process.child.wait()).await;
            if grace.is_err() {
                let _ = process.child.kill().await;
            }
        }
        *self.state.lock().await = ProcessState::Crashed;
        Ok(())
    }
}

#[async_trait]
impl Adapter for StdioAdapter {
    async fn call(&self, req: JsonRpcRequest, deadline: Duration) -> Result<JsonRpcResponse, TransportError> {
        self.ensure_running().await?;

        let mut guard = self.process.lock().await;
        let process = guard.as_mut().ok_or(TransportError::ProcessExited)?;

        let line = serde_json::to_string(&req).map_err(|e| TransportError::Parse(e.to_string()))? + "\n";
        let outcome = match process.stdin.write_all(line.as_bytes()).await {
            Err(_) => Err(TransportError::ProcessExited),
            Ok(()) => match tokio::time::timeout(deadline, read_response_line(&mut process.stdout)).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TransportError::Timeout(deadline)),
            },
        };

        drop(guard);

        if outcome.is_err() {
            // The process may have crashed or stalled; restart so the next call
            // gets a fresh process. Any in-flight call at restart time already
            // observed its own transport error above (§4.1 restart policy).
            let _ = self.restart().await;
        }

        outcome
    }

    async fn is_healthy(&self) -> bool {
        let mut guard = self.process.lock().await;
        match guard.as_mut() {
            Some(process) => matches!(process.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn shutdown(&self) {
        let _ = StdioAdapter::shutdown(self).await;
    }
}

async fn read_response_line(stdout: &mut BufReader<ChildStdout>) -> Result<JsonRpcResponse, TransportError> {
    let mut line = String::new();
    let bytes_read = stdout.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Err(TransportError::ProcessExited);
    }
    serde_json::from_str(line.trim()).map_err(|e| TransportError::Parse(e.to_string()))
}

/// Continuously drain stderr so the child never blocks on a full stderr pipe.
async fn drain_stderr(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    tracing::debug!(stderr = trimmed, "stdio upstream stderr");
                }
            }
            Err(_) => break,
        }
    }
}
