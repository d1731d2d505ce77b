//! Test doubles shared by the integration tests
//!
//! `FakeBackend` stands in for the remote sandbox service and records every
//! call; `ScriptedModel` replays canned model responses and records the
//! requests it saw.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use skillbench::agent::{AgentConfig, AgentController};
use skillbench::llm::{ChatError, ContentBlock, Message, ModelClient, ModelRequest, ModelResponse};
use skillbench::sandbox::backend::{BackendError, CreateSandbox, LogLine, RunOutput, SandboxBackend};
use skillbench::sandbox::{EnvironmentPool, PoolConfig};
use skillbench::skills::SkillsSource;

pub const SKILLS_DOCUMENT: &str = "# Test skills\nAlways label chart axes.";

type Responder = Box<dyn Fn(&str) -> RunOutput + Send + Sync>;

/// In-memory sandbox service
pub struct FakeBackend {
    creates: AtomicUsize,
    failing_creates: AtomicUsize,
    create_delay: Duration,
    run_delay: Duration,
    responder: Responder,
    pub create_requests: Mutex<Vec<CreateSandbox>>,
    /// (sandbox_id, code)
    pub runs: Mutex<Vec<(String, String)>>,
    /// (sandbox_id, path, bytes)
    pub writes: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub destroyed: Mutex<Vec<String>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            creates: AtomicUsize::new(0),
            failing_creates: AtomicUsize::new(0),
            create_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
            responder: Box::new(python_stub),
            create_requests: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    pub fn with_responder(mut self, responder: impl Fn(&str) -> RunOutput + Send + Sync + 'static) -> Self {
        self.responder = Box::new(responder);
        self
    }

    /// Make the next `n` creates fail
    pub fn fail_next_creates(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn run_codes(&self) -> Vec<String> {
        self.runs.lock().unwrap().iter().map(|(_, code)| code.clone()).collect()
    }

    pub fn destroyed_ids(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxBackend for FakeBackend {
    async fn create(&self, request: &CreateSandbox) -> Result<String, BackendError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let failing = self.failing_creates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_creates.store(failing - 1, Ordering::SeqCst);
            return Err(BackendError::Api {
                status: 503,
                body: "no capacity".to_string(),
            });
        }
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.create_requests.lock().unwrap().push(request.clone());
        Ok(format!("sbx-{}", n))
    }

    async fn run(&self, sandbox_id: &str, code: &str, _timeout: Duration) -> Result<RunOutput, BackendError> {
        self.runs
            .lock()
            .unwrap()
            .push((sandbox_id.to_string(), code.to_string()));
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        Ok((self.responder)(code))
    }

    async fn write_file(&self, sandbox_id: &str, path: &str, bytes: &[u8]) -> Result<(), BackendError> {
        self.writes
            .lock()
            .unwrap()
            .push((sandbox_id.to_string(), path.to_string(), bytes.to_vec()));
        Ok(())
    }

    async fn destroy(&self, sandbox_id: &str) -> Result<(), BackendError> {
        self.destroyed.lock().unwrap().push(sandbox_id.to_string());
        Ok(())
    }
}

/// Stdout-only run output
pub fn stdout(text: &str) -> RunOutput {
    RunOutput {
        stdout: vec![LogLine {
            text: text.to_string(),
            timestamp: 1,
        }],
        ..Default::default()
    }
}

/// Answers the handful of snippets the tests send
fn python_stub(code: &str) -> RunOutput {
    match code.trim() {
        "print(2+2)" => stdout("4\n"),
        "print('baseline')" => stdout("baseline\n"),
        "print('enhanced')" => stdout("enhanced\n"),
        _ => RunOutput::default(),
    }
}

/// One model call as the model saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Model that replays queued responses
pub struct ScriptedModel {
    queue: Mutex<VecDeque<Result<ModelResponse, ChatError>>>,
    /// Returned once the queue is empty; an empty queue without it is an error
    repeat: Option<ModelResponse>,
    pub requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            queue: Mutex::new(responses.into_iter().map(Ok).collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_results(results: Vec<Result<ModelResponse, ChatError>>) -> Self {
        Self {
            queue: Mutex::new(results.into_iter().collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same response
    pub fn repeating(response: ModelResponse) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> RecordedRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ChatError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system: request.system.to_string(),
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
        });
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => self.repeat.clone().ok_or(ChatError::EmptyResponse),
        }
    }
}

pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        content: vec![ContentBlock::text(text)],
        stop_reason: Some("end_turn".to_string()),
    }
}

pub fn tool_use(id: &str, code: &str) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: "execute_python".to_string(),
        input: serde_json::json!({ "code": code }),
    }
}

pub fn tool_response(blocks: Vec<ContentBlock>) -> ModelResponse {
    ModelResponse {
        content: blocks,
        stop_reason: Some("tool_use".to_string()),
    }
}

pub fn skills() -> Arc<SkillsSource> {
    Arc::new(SkillsSource::fixed(SKILLS_DOCUMENT, Vec::new()))
}

pub fn pool(backend: Arc<FakeBackend>, config: PoolConfig) -> Arc<EnvironmentPool> {
    Arc::new(EnvironmentPool::new(backend, skills(), config))
}

/// Controller over a fresh pool with default settings
pub fn controller(
    model: Arc<ScriptedModel>,
    backend: Arc<FakeBackend>,
    max_iterations: usize,
) -> (Arc<AgentController>, Arc<EnvironmentPool>) {
    let pool = pool(backend, PoolConfig::default());
    let controller = Arc::new(AgentController::new(
        model,
        pool.clone(),
        skills(),
        AgentConfig { max_iterations },
    ));
    (controller, pool)
}
