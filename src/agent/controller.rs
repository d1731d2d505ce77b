//! Agent Controller - the bounded tool-use loop
//!
//! One [`AgentController::run`] call serves one request: it borrows the
//! environment for (session, mode), asks the model for its next step, runs any
//! requested code, feeds the results back, and streams every artifact to the
//! caller until the model stops asking for tools or the iteration cap hits.

use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::events::{StopReason, StreamedEvent, Transcript};
use super::normalizer::normalize;
use crate::emitter::{self, EventSink};
use crate::llm::{
    system_prompt, ChatError, ContentBlock, Message, ModelClient, ModelRequest, Role, ToolDefinition,
    EXECUTE_PYTHON_TOOL,
};
use crate::metrics::{AGENT_ITERATIONS_TOTAL, AGENT_TASKS, AGENT_TOOL_CALLS, ERRORS_TOTAL, LLM_CALL_TIME};
use crate::mode::Mode;
use crate::sandbox::{EnvironmentHandle, EnvironmentPool, ExecutionOutcome, PoolError, WriteFileError};
use crate::skills::SkillsSource;

/// Configuration for the agent controller
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of model calls per request
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

/// A file the user dropped into the chat
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    /// Base64-encoded bytes
    pub content: String,
}

/// Everything one run needs
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub history: Vec<Message>,
    pub mode: Mode,
    pub session_id: String,
    pub files: Vec<UploadedFile>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Finished(StopReason),
    Failed(String),
    /// The caller stopped listening
    Disconnected,
}

/// Result of an agent run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub trace_id: String,
    pub status: RunStatus,
    /// Model calls made
    pub iterations: usize,
    /// Tool invocations answered
    pub tool_calls: usize,
    /// Markdown rendering of every emitted event
    pub transcript: String,
    /// Conversation including the assistant and tool-result turns of this run
    pub history: Vec<Message>,
}

/// Error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to acquire execution environment: {0}")]
    Environment(#[from] PoolError),
    #[error("Invalid upload {name}: {reason}")]
    InvalidUpload { name: String, reason: String },
    #[error("Failed to upload file: {0}")]
    Upload(#[from] WriteFileError),
    #[error("Model call failed: {0}")]
    Model(#[from] ChatError),
    #[error("Client disconnected")]
    Disconnected,
}

impl AgentError {
    fn kind(&self) -> &'static str {
        match self {
            AgentError::Environment(_) => "environment",
            AgentError::InvalidUpload { .. } | AgentError::Upload(_) => "upload",
            AgentError::Model(_) => "model",
            AgentError::Disconnected => "disconnected",
        }
    }
}

impl From<emitter::Disconnected> for AgentError {
    fn from(_: emitter::Disconnected) -> Self {
        AgentError::Disconnected
    }
}

/// Per-run bookkeeping: every emitted event also lands in the transcript
struct RunState<'a> {
    sink: &'a EventSink,
    transcript: Transcript,
    history: Vec<Message>,
    iterations: usize,
    tool_calls: usize,
}

impl RunState<'_> {
    async fn emit(&mut self, event: StreamedEvent) -> Result<(), AgentError> {
        self.transcript.push(&event);
        self.sink.send(event).await?;
        Ok(())
    }
}

/// Agent Controller orchestrating the model and the execution environment
pub struct AgentController {
    model: Arc<dyn ModelClient>,
    pool: Arc<EnvironmentPool>,
    skills: Arc<SkillsSource>,
    tools: Vec<ToolDefinition>,
    config: AgentConfig,
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `model` - model client used for every iteration
    /// * `pool` - environment pool shared by every request
    /// * `skills` - source of the enhanced-mode skills document
    /// * `config` - agent configuration
    pub fn new(
        model: Arc<dyn ModelClient>,
        pool: Arc<EnvironmentPool>,
        skills: Arc<SkillsSource>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            pool,
            skills,
            tools: vec![ToolDefinition::execute_python()],
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run in the background and return the event stream
    ///
    /// The stream ends after the terminal `done` or `error` event.
    pub fn stream(self: Arc<Self>, request: AgentRequest) -> ReceiverStream<StreamedEvent> {
        let (sink, events) = emitter::channel();
        tokio::spawn(async move {
            self.run(request, &sink).await;
        });
        events
    }

    /// Run the loop, writing every event to `sink`
    ///
    /// Exactly one terminal event is emitted: `done` on success or iteration
    /// cap, `error` on failure. Nothing is emitted after a disconnect.
    pub async fn run(&self, request: AgentRequest, sink: &EventSink) -> RunOutcome {
        let trace_id = Uuid::now_v7().to_string();
        let AgentRequest {
            history,
            mode,
            session_id,
            files,
        } = request;

        let span = info_span!(
            "agent_run",
            trace_id = %trace_id,
            session_id = %session_id,
            mode = %mode,
            otel.name = "agent_run"
        );

        async {
            info!(trace_id = %trace_id, files = files.len(), "Starting agent run");

            let mut state = RunState {
                sink,
                transcript: Transcript::new(),
                history,
                iterations: 0,
                tool_calls: 0,
            };

            let status = match self.drive(&session_id, mode, &files, &mut state).await {
                Ok(reason) => {
                    // client may already be gone; the run is over either way
                    let _ = state.emit(StreamedEvent::Done(reason)).await;
                    info!(
                        trace_id = %trace_id,
                        iterations = state.iterations,
                        tool_calls = state.tool_calls,
                        reason = reason.as_str(),
                        "Agent run finished"
                    );
                    AGENT_TASKS.with_label_values(&[mode.as_str(), reason.as_str()]).inc();
                    RunStatus::Finished(reason)
                }
                Err(AgentError::Disconnected) => {
                    info!(trace_id = %trace_id, iterations = state.iterations, "Client disconnected, stopping");
                    AGENT_TASKS.with_label_values(&[mode.as_str(), "disconnected"]).inc();
                    RunStatus::Disconnected
                }
                Err(e) => {
                    warn!(trace_id = %trace_id, error = %e, "Agent run failed");
                    ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                    AGENT_TASKS.with_label_values(&[mode.as_str(), "error"]).inc();
                    let message = e.to_string();
                    let _ = state.emit(StreamedEvent::Error(message.clone())).await;
                    RunStatus::Failed(message)
                }
            };

            AGENT_ITERATIONS_TOTAL
                .with_label_values(&[mode.as_str()])
                .observe(state.iterations as f64);

            RunOutcome {
                trace_id: trace_id.clone(),
                status,
                iterations: state.iterations,
                tool_calls: state.tool_calls,
                transcript: state.transcript.into_string(),
                history: state.history,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        session_id: &str,
        mode: Mode,
        files: &[UploadedFile],
        state: &mut RunState<'_>,
    ) -> Result<StopReason, AgentError> {
        let handle = self.pool.acquire(session_id, mode).await?;

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            let bytes = BASE64
                .decode(file.content.trim())
                .map_err(|e| AgentError::InvalidUpload {
                    name: file.name.clone(),
                    reason: e.to_string(),
                })?;
            uploaded.push(handle.write_file(&file.name, &bytes).await?);
        }

        let skills_document = match mode {
            Mode::Enhanced => self.skills.instructions().await,
            Mode::Baseline => String::new(),
        };
        let system = system_prompt(mode, &skills_document, &uploaded);

        for iteration in 1..=self.config.max_iterations {
            state.iterations = iteration;
            let response = self.call_model(&system, &state.history, iteration).await?;

            // blank text and unknown block kinds are rejected when replayed
            let content: Vec<ContentBlock> = response
                .content
                .into_iter()
                .filter(|block| match block {
                    ContentBlock::Text { text } => !text.trim().is_empty(),
                    ContentBlock::Unsupported => false,
                    _ => true,
                })
                .collect();

            let mut tool_results = Vec::new();
            for block in &content {
                match block {
                    ContentBlock::Text { text } => {
                        state.emit(StreamedEvent::Text(text.clone())).await?;
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        state.tool_calls += 1;
                        let result = self.invoke_tool(&handle, id, name, input, state).await?;
                        tool_results.push(result);
                    }
                    _ => {}
                }
            }

            if !content.is_empty() {
                state
                    .history
                    .push(Message::with_blocks(Role::Assistant, content));
            }

            if tool_results.is_empty() {
                return Ok(StopReason::Complete);
            }
            state
                .history
                .push(Message::with_blocks(Role::User, tool_results));
        }

        warn!(
            max_iterations = self.config.max_iterations,
            "Iteration cap reached with tool calls still pending"
        );
        Ok(StopReason::MaxIterations)
    }

    async fn call_model(
        &self,
        system: &str,
        history: &[Message],
        iteration: usize,
    ) -> Result<crate::llm::ModelResponse, ChatError> {
        let llm_span = info_span!(
            "llm_call",
            iteration,
            model = %self.model.model(),
            otel.name = "llm_call"
        );

        let start = Instant::now();
        let response = self
            .model
            .complete(ModelRequest {
                system,
                messages: history,
                tools: &self.tools,
            })
            .instrument(llm_span)
            .await?;

        let elapsed = start.elapsed().as_secs_f64();
        LLM_CALL_TIME
            .with_label_values(&[self.model.model()])
            .observe(elapsed);
        info!(
            iteration,
            duration_ms = elapsed * 1000.0,
            blocks = response.content.len(),
            stop_reason = response.stop_reason.as_deref().unwrap_or(""),
            "LLM call completed"
        );
        Ok(response)
    }

    /// Answer one tool invocation with exactly one tool result
    async fn invoke_tool(
        &self,
        handle: &EnvironmentHandle,
        id: &str,
        name: &str,
        input: &serde_json::Value,
        state: &mut RunState<'_>,
    ) -> Result<ContentBlock, AgentError> {
        let tool_label = if name == EXECUTE_PYTHON_TOOL { name } else { "unknown" };
        AGENT_TOOL_CALLS
            .with_label_values(&[handle.mode().as_str(), tool_label])
            .inc();

        let outcome = if name != EXECUTE_PYTHON_TOOL {
            warn!(tool = name, "Model requested an unknown tool");
            ExecutionOutcome::failure(format!(
                "Unknown tool: {}. The only available tool is {}.",
                name, EXECUTE_PYTHON_TOOL
            ))
        } else {
            match input.get("code").and_then(serde_json::Value::as_str) {
                Some(code) if !code.trim().is_empty() => {
                    state.emit(StreamedEvent::Code(code.to_string())).await?;
                    let exec_span = info_span!(
                        "code_execution",
                        env = %handle.key(),
                        code_len = code.len(),
                        otel.name = "code_execution"
                    );
                    handle.execute(code).instrument(exec_span).await
                }
                _ => {
                    warn!("Rejecting tool call without code");
                    ExecutionOutcome::failure(
                        "Error: code parameter is missing or empty. Please provide actual code to execute.",
                    )
                }
            }
        };

        let normalized = normalize(outcome);
        for event in normalized.events {
            state.emit(event).await?;
        }

        Ok(ContentBlock::tool_result(
            id,
            normalized.summary,
            normalized.is_error,
        ))
    }
}
