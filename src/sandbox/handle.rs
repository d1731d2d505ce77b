//! Environment Handle - one stateful remote sandbox bound to (session, mode)
//!
//! Handles are created and owned by the [`EnvironmentPool`](super::EnvironmentPool);
//! controllers borrow them as `Arc<EnvironmentHandle>` for one request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use super::backend::{BackendError, RunOutput, SandboxBackend};
use crate::metrics::{CODE_EXECUTIONS, CODE_EXECUTION_DURATION_TOTAL};
use crate::mode::Mode;

/// Directory uploaded files are written to
pub const UPLOAD_DIR: &str = "/home/user";

/// Pool key: one environment per session and mode
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvKey {
    pub session_id: String,
    pub mode: Mode,
}

impl EnvKey {
    pub fn new(session_id: impl Into<String>, mode: Mode) -> Self {
        Self {
            session_id: session_id.into(),
            mode,
        }
    }
}

impl std::fmt::Display for EnvKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session_id, self.mode)
    }
}

/// Captured result of one code execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    /// stdout and stderr merged in emission order
    pub text: String,
    /// Base64 image payloads in display order
    pub images: Vec<String>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome for an execution that never produced output
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            images: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Shape the backend's raw output
    pub fn from_run(output: RunOutput) -> Self {
        let mut lines: Vec<_> = output
            .stdout
            .into_iter()
            .chain(output.stderr)
            .collect();
        // stable: stdout stays ahead of stderr on equal timestamps
        lines.sort_by_key(|line| line.timestamp);

        let mut text: String = lines.into_iter().map(|line| line.text).collect();
        let mut images = Vec::new();

        for result in output.results {
            if let Some(image) = result.png.or(result.jpeg) {
                images.push(image);
            } else if let Some(repr) = result.text {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&repr);
            }
        }

        let error = output.error.map(|e| {
            let mut message = format!("{}: {}", e.name, e.value);
            let traceback = e.traceback.trim_end();
            if !traceback.is_empty() {
                message.push('\n');
                message.push_str(traceback);
            }
            message
        });

        Self {
            text: text.trim_end().to_string(),
            images,
            error,
        }
    }
}

/// Error type for file injection
#[derive(Debug, Error)]
pub enum WriteFileError {
    #[error("Invalid upload file name: {0:?}")]
    InvalidName(String),
    #[error("Failed to write {path}: {source}")]
    Backend {
        path: String,
        #[source]
        source: BackendError,
    },
}

/// Absolute sandbox path for an uploaded file
///
/// Only the final path component is kept, so `../x.csv` and `dir/x.csv` both
/// land at `/home/user/x.csv`.
pub fn upload_path(name: &str) -> Result<String, WriteFileError> {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(WriteFileError::InvalidName(name.to_string()));
    }
    Ok(format!("{}/{}", UPLOAD_DIR, base))
}

/// Represents one live sandbox
pub struct EnvironmentHandle {
    key: EnvKey,
    sandbox_id: String,
    backend: Arc<dyn SandboxBackend>,
    execution_timeout: Duration,
    created_at: Instant,
    last_used: std::sync::Mutex<Instant>,
}

impl EnvironmentHandle {
    pub fn new(
        key: EnvKey,
        sandbox_id: String,
        backend: Arc<dyn SandboxBackend>,
        execution_timeout: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            key,
            sandbox_id,
            backend,
            execution_timeout,
            created_at: now,
            last_used: std::sync::Mutex::new(now),
        }
    }

    pub fn key(&self) -> &EnvKey {
        &self.key
    }

    pub fn mode(&self) -> Mode {
        self.key.mode
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    /// Time since the sandbox was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the last execution or file write
    pub fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_used.lock() {
            *last = Instant::now();
        }
    }

    /// Execute code, bounded by the execution timeout
    ///
    /// Never fails: timeouts and backend faults come back as an outcome with
    /// an error and no output.
    pub async fn execute(&self, code: &str) -> ExecutionOutcome {
        self.touch();
        let mode = self.key.mode.as_str();
        let start = Instant::now();

        let result = tokio::time::timeout(
            self.execution_timeout,
            self.backend.run(&self.sandbox_id, code, self.execution_timeout),
        )
        .await;

        CODE_EXECUTION_DURATION_TOTAL
            .with_label_values(&[mode])
            .observe(start.elapsed().as_secs_f64());
        self.touch();

        match result {
            Ok(Ok(output)) => {
                let outcome = ExecutionOutcome::from_run(output);
                let status = if outcome.error.is_some() { "error" } else { "success" };
                CODE_EXECUTIONS.with_label_values(&[mode, status]).inc();
                debug!(
                    env = %self.key,
                    text_len = outcome.text.len(),
                    images = outcome.images.len(),
                    error = outcome.error.is_some(),
                    "Execution finished"
                );
                outcome
            }
            Ok(Err(e)) => {
                CODE_EXECUTIONS.with_label_values(&[mode, "fault"]).inc();
                warn!(env = %self.key, error = %e, "Sandbox fault during execution");
                ExecutionOutcome::failure(format!("Execution failed: {}", e))
            }
            Err(_) => {
                CODE_EXECUTIONS.with_label_values(&[mode, "timeout"]).inc();
                warn!(env = %self.key, timeout_secs = self.execution_timeout.as_secs(), "Execution timed out");
                ExecutionOutcome::failure(format!(
                    "Execution failed: timed out after {}s",
                    self.execution_timeout.as_secs()
                ))
            }
        }
    }

    /// Write an uploaded file to `/home/user/{name}` and return that path
    pub async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<String, WriteFileError> {
        let path = upload_path(name)?;
        self.touch();
        self.backend
            .write_file(&self.sandbox_id, &path, bytes)
            .await
            .map_err(|source| WriteFileError::Backend {
                path: path.clone(),
                source,
            })?;
        debug!(env = %self.key, path = %path, bytes = bytes.len(), "Uploaded file");
        Ok(path)
    }

    /// Destroy the remote sandbox
    pub(crate) async fn destroy(&self) -> Result<(), BackendError> {
        self.backend.destroy(&self.sandbox_id).await
    }
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("key", &self.key)
            .field("sandbox_id", &self.sandbox_id)
            .field("age", &self.age())
            .field("idle_for", &self.idle_for())
            .finish()
    }
}
