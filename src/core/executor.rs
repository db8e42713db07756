use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{info, warn};

use crate::core::config::ConfigHandle;
use crate::core::error::SecurityError;
use crate::core::guard::WhitelistGuard;
use crate::core::store::EventStore;
use crate::core::store::types::EventType;

/// Maximum bytes captured per output stream. Overflow is truncated and
/// flagged in the result rather than buffered without bound.
const MAX_CAPTURE_BYTES: usize = 256 * 1024;

/// Where a command request came from, for event attribution.
#[derive(Debug, Clone, Copy)]
pub enum CommandOrigin {
    Operator(i64),
    ScheduledTask { task_id: i64, owner_id: i64 },
}

impl fmt::Display for CommandOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator(id) => write!(f, "operator {id}"),
            Self::ScheduledTask { task_id, owner_id } => {
                write!(f, "task {task_id} (owner {owner_id})")
            }
        }
    }
}

/// Outcome of one bounded command execution. A timed-out run has no exit
/// code; partial output captured before the kill is retained.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// The stream worth showing an operator: stdout, or stderr when stdout is
    /// empty.
    pub fn output(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Runs permitted commands as bounded subprocesses. The whitelist is
/// re-evaluated on every invocation, scheduled ones included, and every
/// invocation leaves exactly one entry in the event log.
pub struct CommandExecutor {
    guard: WhitelistGuard,
    config: ConfigHandle,
    store: Arc<EventStore>,
}

impl CommandExecutor {
    pub fn new(guard: WhitelistGuard, config: ConfigHandle, store: Arc<EventStore>) -> Self {
        Self {
            guard,
            config,
            store,
        }
    }

    pub async fn execute(
        &self,
        command: &str,
        origin: CommandOrigin,
    ) -> Result<ExecutionResult, SecurityError> {
        if !self.guard.is_allowed(command) {
            warn!("blocked command from {}: {}", origin, command);
            self.store
                .record_event(
                    EventType::UnauthorizedAccess,
                    &format!("{origin} attempted non-whitelisted command: {command}"),
                    None,
                )
                .await?;
            return Err(SecurityError::CommandNotWhitelisted(command.to_string()));
        }

        let timeout = self.config.snapshot().command_timeout();
        info!("executing for {}: {}", origin, command);

        // No store or cooldown lock is held while the child runs; the store
        // methods below acquire the connection mutex on their own.
        match run_shell(command, timeout).await {
            Ok(result) => {
                let outcome = if result.timed_out {
                    format!("timed out after {}s", timeout.as_secs())
                } else {
                    match result.exit_code {
                        Some(0) => "succeeded".to_string(),
                        Some(code) => format!("exited with code {code}"),
                        None => "killed by signal".to_string(),
                    }
                };
                self.store
                    .record_event(
                        EventType::CommandExecuted,
                        &format!("{origin} ran `{command}`: {outcome}"),
                        None,
                    )
                    .await?;
                Ok(result)
            }
            Err(e) => {
                self.store
                    .record_event(
                        EventType::CommandExecuted,
                        &format!("{origin} failed to spawn `{command}`: {e}"),
                        None,
                    )
                    .await?;
                Err(SecurityError::CommandSpawnFailed(e.to_string()))
            }
        }
    }
}

/// Spawn `sh -c command` with piped output and a hard wall-clock deadline.
/// On timeout the whole process group is killed so children of the shell do
/// not outlive it.
async fn run_shell(command: &str, timeout: Duration) -> std::io::Result<ExecutionResult> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    // Read both streams in their own tasks so `child.wait()` stays available.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_capped(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_capped(stderr_handle).await });

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_elapsed) => {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                // The shell is its own process group leader (process_group(0)),
                // so a negative pid takes down the whole tree.
                let _ = std::process::Command::new("kill")
                    .args(["-KILL", "--"])
                    .arg(format!("-{pid}"))
                    .output();
            }
            let _ = child.start_kill();
            let _ = child.wait().await;
            (None, true)
        }
    };

    let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
    let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();

    Ok(ExecutionResult {
        stdout,
        stderr,
        exit_code,
        timed_out,
        truncated: stdout_truncated || stderr_truncated,
        duration: start.elapsed(),
    })
}

/// Read a stream up to the capture cap; report whether output was dropped.
async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> (String, bool) {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take((MAX_CAPTURE_BYTES + 1) as u64)
            .read_to_end(&mut buf)
            .await;
    }
    let truncated = buf.len() > MAX_CAPTURE_BYTES;
    if truncated {
        buf.truncate(MAX_CAPTURE_BYTES);
    }
    (String::from_utf8_lossy(&buf).into_owned(), truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;
    use crate::core::tests::support;

    fn executor(whitelist: &[&str], timeout_secs: u64) -> (CommandExecutor, Arc<EventStore>) {
        let store = Arc::new(test_store());
        let config = support::config(whitelist, timeout_secs);
        let guard = WhitelistGuard::new(config.clone());
        (
            CommandExecutor::new(guard, config, store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn rejected_command_never_spawns() {
        let tmp = std::env::temp_dir().join(format!("vigil-test-{}", uuid::Uuid::new_v4()));
        let probe = format!("touch {}", tmp.display());
        let (executor, store) = executor(&["uptime"], 30);

        let err = executor
            .execute(&probe, CommandOrigin::Operator(42))
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::CommandNotWhitelisted(_)));
        assert!(!tmp.exists(), "rejected command must not run");

        let events = store.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "unauthorized_access");
        assert!(events[0].description.contains("operator 42"));
    }

    #[tokio::test]
    async fn captures_stdout_and_logs_execution() {
        let (executor, store) = executor(&["echo hello"], 30);
        let result = executor
            .execute("echo hello", CommandOrigin::Operator(42))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
        assert!(!result.truncated);

        assert_eq!(store.count_events(EventType::CommandExecuted).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_result_not_an_error() {
        let (executor, store) = executor(&["false"], 30);
        let result = executor
            .execute("false", CommandOrigin::Operator(1))
            .await
            .unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, Some(1));

        let events = store.recent_events(10).await.unwrap();
        assert!(events[0].description.contains("exited with code 1"));
    }

    #[tokio::test]
    async fn stderr_reaches_the_result() {
        let (executor, _store) = executor(&["ls /definitely-not-here"], 30);
        let result = executor
            .execute("ls /definitely-not-here", CommandOrigin::Operator(1))
            .await
            .unwrap();
        assert!(!result.success());
        assert!(result.stdout.is_empty());
        assert!(!result.stderr.is_empty());
        assert_eq!(result.output(), result.stderr);
    }

    #[tokio::test]
    async fn timeout_kills_and_flags() {
        let (executor, store) = executor(&["sleep 5"], 1);
        let start = Instant::now();
        let result = executor
            .execute("sleep 5", CommandOrigin::Operator(1))
            .await
            .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "timeout must be enforced promptly, took {:?}",
            start.elapsed()
        );

        let events = store.recent_events(10).await.unwrap();
        assert!(events[0].description.contains("timed out"));
    }

    #[tokio::test]
    async fn oversized_output_is_truncated_and_flagged() {
        let command = "head -c 500000 /dev/zero | tr '\\0' 'x'";
        let (executor, _store) = executor(&[command], 30);
        let result = executor
            .execute(command, CommandOrigin::Operator(1))
            .await
            .unwrap();
        assert!(result.truncated);
        assert_eq!(result.stdout.len(), MAX_CAPTURE_BYTES);
    }

    #[tokio::test]
    async fn scheduled_origin_is_attributed_in_the_log() {
        let (executor, store) = executor(&["echo tick"], 30);
        executor
            .execute(
                "echo tick",
                CommandOrigin::ScheduledTask {
                    task_id: 7,
                    owner_id: 42,
                },
            )
            .await
            .unwrap();
        let events = store.recent_events(10).await.unwrap();
        assert!(events[0].description.contains("task 7 (owner 42)"));
    }
}
