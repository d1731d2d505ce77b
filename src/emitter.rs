//! Stream Emitter - ordered delivery of agent events to the transport
//!
//! The controller writes into an [`EventSink`]; the HTTP layer reads the
//! matching receiver and turns each event into one SSE frame. The channel is
//! FIFO, so frames leave in emission order. When the controller drops its
//! sink the stream ends and the connection closes; when the client goes away
//! the sink reports [`Disconnected`] and the controller stops.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures_util::stream::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::StreamedEvent;

/// Events buffered between the controller and a slow client
pub const CHANNEL_CAPACITY: usize = 64;

/// The receiving side went away
#[derive(Debug, Clone, Copy, Error)]
#[error("event stream receiver disconnected")]
pub struct Disconnected;

/// Write half of an event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamedEvent>,
}

impl EventSink {
    pub async fn send(&self, event: StreamedEvent) -> Result<(), Disconnected> {
        self.tx.send(event).await.map_err(|_| Disconnected)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a connected sink and event stream
pub fn channel() -> (EventSink, ReceiverStream<StreamedEvent>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (EventSink { tx }, ReceiverStream::new(rx))
}

/// JSON body of one frame: `{"type": .., "content": ..}`
pub fn encode_frame(event: &StreamedEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        serde_json::json!({"type": "error", "content": format!("failed to encode event: {}", e)})
            .to_string()
    })
}

pub fn to_sse_event(event: &StreamedEvent) -> Event {
    Event::default().data(encode_frame(event))
}

/// Adapt an event stream into SSE frames
pub fn sse_frames<S>(events: S) -> impl Stream<Item = Result<Event, Infallible>>
where
    S: Stream<Item = StreamedEvent> + Send + 'static,
{
    events.map(|event| Ok(to_sse_event(&event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::StopReason;

    #[test]
    fn test_encode_frame() {
        assert_eq!(
            encode_frame(&StreamedEvent::Code("print(1)".into())),
            r#"{"type":"code","content":"print(1)"}"#
        );
        assert_eq!(
            encode_frame(&StreamedEvent::Done(StopReason::Complete)),
            r#"{"type":"done","content":"complete"}"#
        );
    }

    #[tokio::test]
    async fn test_channel_preserves_order_and_closes() {
        let (sink, mut events) = channel();
        sink.send(StreamedEvent::Text("a".into())).await.unwrap();
        sink.send(StreamedEvent::Output("b".into())).await.unwrap();
        drop(sink);

        assert_eq!(events.next().await, Some(StreamedEvent::Text("a".into())));
        assert_eq!(events.next().await, Some(StreamedEvent::Output("b".into())));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (sink, events) = channel();
        drop(events);
        assert!(sink.is_closed());
        assert!(sink.send(StreamedEvent::Text("late".into())).await.is_err());
    }
}
