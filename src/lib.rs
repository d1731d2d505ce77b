//! skillbench - side-by-side comparison of a baseline agent and a skills-enhanced one
//!
//! Each chat turn runs twice, once per [`Mode`]. Both runs drive the same
//! model through a bounded tool-use loop whose only tool executes Python in a
//! remote sandbox; the enhanced run additionally carries a domain skills
//! document in its system prompt. Every artifact of a run is streamed to the
//! browser as it happens.
//!
//! # Modules
//!
//! - `agent` - the tool-use loop, result normalization and streamed events
//! - `sandbox` - remote sandbox client and the keyed environment pool
//! - `llm` - Messages API types, client and system prompts
//! - `skills` - remotely hosted skills document and package manifest
//! - `emitter` - ordered delivery of events to the SSE transport
//! - `server` - axum routes and rate limiting
//! - `storage` - chat history and upload persistence
//! - `config` - command line / environment configuration
//! - `metrics` - Prometheus metrics for observability
//!
//! # Quick Start
//!
//! ```ignore
//! use skillbench::{AgentController, EnvironmentPool, RemoteSandboxClient};
//!
//! let pool = Arc::new(EnvironmentPool::new(backend, skills.clone(), PoolConfig::default()));
//! let controller = Arc::new(AgentController::new(model, pool, skills, AgentConfig::default()));
//! let events = controller.stream(request);
//! ```

pub mod agent;
pub mod config;
pub mod emitter;
pub mod llm;
pub mod metrics;
pub mod mode;
pub mod sandbox;
pub mod server;
pub mod skills;
pub mod storage;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentController, AgentRequest, RunOutcome, StreamedEvent};
pub use llm::{AnthropicClient, ModelClient};
pub use mode::Mode;
pub use sandbox::{EnvironmentPool, PoolConfig, RemoteSandboxClient, SandboxBackend};
pub use skills::{SkillsConfig, SkillsSource};
pub use storage::{ChatStore, FileStore};
