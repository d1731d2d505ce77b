//! Execution backend boundary
//!
//! A [`SandboxBackend`] is the remote service that owns the actual isolated
//! kernels. The pool and handles only ever see an opaque sandbox id.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Sandbox service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Sandbox {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// Parameters for creating a sandbox
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateSandbox {
    /// Pre-built template id; `None` boots the service's default image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Environment variables visible to executed code (secrets)
    pub env_vars: HashMap<String, String>,
    /// Free-form labels for the service's own bookkeeping
    pub metadata: HashMap<String, String>,
}

/// One chunk written to stdout or stderr
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LogLine {
    pub text: String,
    /// Emission time as reported by the kernel (monotonic within a run)
    #[serde(default)]
    pub timestamp: i64,
}

/// One rich display result (last expression value, chart, table)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DisplayResult {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub png: Option<String>,
    #[serde(default)]
    pub jpeg: Option<String>,
}

/// Exception raised by the executed code
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunError {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub traceback: String,
}

/// Raw result of one `run` call
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunOutput {
    #[serde(default)]
    pub stdout: Vec<LogLine>,
    #[serde(default)]
    pub stderr: Vec<LogLine>,
    #[serde(default)]
    pub results: Vec<DisplayResult>,
    #[serde(default)]
    pub error: Option<RunError>,
}

/// Remote sandboxed code-execution service
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Boot a new sandbox and return its id
    async fn create(&self, request: &CreateSandbox) -> Result<String, BackendError>;

    /// Run code in the sandbox's kernel
    async fn run(
        &self,
        sandbox_id: &str,
        code: &str,
        timeout: Duration,
    ) -> Result<RunOutput, BackendError>;

    /// Write a file at an absolute path inside the sandbox
    async fn write_file(&self, sandbox_id: &str, path: &str, bytes: &[u8]) -> Result<(), BackendError>;

    /// Tear the sandbox down
    async fn destroy(&self, sandbox_id: &str) -> Result<(), BackendError>;
}
