//! Agent module for model-driven code execution
//!
//! This module provides the agent loop that orchestrates:
//! - the model with one `execute_python` tool
//! - the environment pool, one sandbox per (session, mode)
//! - result normalization and the outbound event stream
//!
//! # Architecture
//!
//! ```text
//! Chat history → AgentController → EnvironmentPool.acquire(session, mode)
//!                  ↓
//!           write uploads to /home/user
//!                  ↓
//!           Model (system prompt + history + tools)
//!                  ↓
//!           text → `text` event      tool_use → `code` event
//!                                        ↓
//!                               EnvironmentHandle.execute()
//!                                        ↓
//!                               normalize → output / error / image events
//!                  ↓
//!           Feed tool results back → Loop or `done`
//! ```

pub mod controller;
pub mod events;
pub mod normalizer;

pub use controller::{
    AgentConfig, AgentController, AgentError, AgentRequest, RunOutcome, RunStatus, UploadedFile,
};
pub use events::{StopReason, StreamedEvent, Transcript};
pub use normalizer::{normalize, NormalizedResult, SUCCESS_SENTINEL};
