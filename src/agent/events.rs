//! Events streamed to the caller, and the transcript they replay into

use serde::{Deserialize, Serialize};

/// Why a run ended without failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without requesting a tool
    Complete,
    /// The iteration cap was hit while the model still wanted tools
    MaxIterations,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Complete => "complete",
            StopReason::MaxIterations => "max_iterations",
        }
    }
}

/// One unit of the outbound stream, serialized as `{"type": .., "content": ..}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamedEvent {
    Text(String),
    Code(String),
    Output(String),
    Error(String),
    /// Base64 PNG/JPEG payload
    Image(String),
    Done(StopReason),
}

impl StreamedEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamedEvent::Text(_) => "text",
            StreamedEvent::Code(_) => "code",
            StreamedEvent::Output(_) => "output",
            StreamedEvent::Error(_) => "error",
            StreamedEvent::Image(_) => "image",
            StreamedEvent::Done(_) => "done",
        }
    }
}

/// Media type of a base64 image payload, from its magic bytes
pub fn image_media_type(data: &str) -> &'static str {
    if data.starts_with("/9j/") {
        "image/jpeg"
    } else {
        "image/png"
    }
}

/// Markdown rendering of an event sequence
///
/// Feeding every event of a request through [`Transcript::push`] rebuilds the
/// full assistant turn as the caller saw it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from a recorded event sequence
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a StreamedEvent>) -> Self {
        let mut transcript = Self::new();
        for event in events {
            transcript.push(event);
        }
        transcript
    }

    pub fn push(&mut self, event: &StreamedEvent) {
        let block = match event {
            StreamedEvent::Text(text) => text.clone(),
            StreamedEvent::Code(code) => format!("```python\n{}\n```", code),
            StreamedEvent::Output(output) => format!("```\n{}\n```", output),
            StreamedEvent::Error(error) => format!("**Error:**\n```\n{}\n```", error),
            StreamedEvent::Image(data) => {
                format!("![output](data:{};base64,{})", image_media_type(data), data)
            }
            StreamedEvent::Done(StopReason::Complete) => return,
            StreamedEvent::Done(StopReason::MaxIterations) => {
                "_Stopped after reaching the iteration limit._".to_string()
            }
        };
        if !self.text.is_empty() {
            self.text.push_str("\n\n");
        }
        self.text.push_str(&block);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
