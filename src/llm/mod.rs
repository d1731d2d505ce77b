//! Language model integration
//!
//! - `messages` - conversation and tool types for the Messages API
//! - `client` - the [`ModelClient`] seam and the Anthropic implementation
//! - `prompts` - system prompts for the baseline and enhanced configurations

pub mod client;
pub mod messages;
pub mod prompts;

pub use client::{AnthropicClient, ChatError, ModelClient};
pub use messages::{
    ContentBlock, Message, ModelRequest, ModelResponse, Role, ToolDefinition, EXECUTE_PYTHON_TOOL,
};
pub use prompts::system_prompt;
