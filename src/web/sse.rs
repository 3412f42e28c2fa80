//! SSE Transport (C12, spec §4.7): turns the orchestrator's event channel
//! into an `axum` streaming response, with a 15-second silence heartbeat
//! and disconnect-triggered cancellation.

use axum::response::sse::{Event, Sse};
use futures::Stream;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::query::orchestrator::PipelineEvent;

fn event_for(event: &PipelineEvent) -> Event {
    let (name, payload) = match event {
        PipelineEvent::Progress { .. } => ("progress", serde_json::to_value(event)),
        PipelineEvent::QueryExpansion { .. } => ("query_expansion", serde_json::to_value(event)),
        PipelineEvent::RetrievalComplete { .. } => ("retrieval_complete", serde_json::to_value(event)),
        PipelineEvent::MarkdownToken { .. } => ("markdown_token", serde_json::to_value(event)),
        PipelineEvent::Metadata { .. } => ("metadata", serde_json::to_value(event)),
        PipelineEvent::Ping => ("ping", Ok(serde_json::json!({}))),
        PipelineEvent::Complete => ("complete", Ok(serde_json::json!({}))),
        PipelineEvent::Error { .. } => ("error", serde_json::to_value(event)),
    };
    // Payloads are `#[serde(tag = "type")]` internally tagged, which carries
    // the variant name we've already chosen as `name` — strip it back out
    // so the wire payload matches spec §6.2 exactly.
    let mut data = payload.unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = data.as_object_mut() {
        obj.remove("type");
    }
    Event::default().event(name).json_data(data).unwrap_or_else(|_| Event::default().event(name).data("{}"))
}

/// Adapts the orchestrator's `mpsc::Receiver` into a `Stream<Item = Event>`,
/// injecting a `ping` whenever 15 seconds pass with no upstream event, and
/// cancelling the orchestrator's `CancellationToken` on drop — which fires
/// when the client disconnects and axum drops the response body.
pub struct OrchestratorEventStream {
    rx: mpsc::Receiver<PipelineEvent>,
    heartbeat: Duration,
    sleep: Pin<Box<tokio::time::Sleep>>,
    cancel_on_drop: CancellationToken,
    done: bool,
}

impl OrchestratorEventStream {
    pub fn new(rx: mpsc::Receiver<PipelineEvent>, heartbeat: Duration, cancel_on_drop: CancellationToken) -> Self {
        OrchestratorEventStream {
            rx,
            heartbeat,
            sleep: Box::pin(tokio::time::sleep(heartbeat)),
            cancel_on_drop,
            done: false,
        }
    }
}

impl Stream for OrchestratorEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                this.sleep.as_mut().reset(tokio::time::Instant::now() + this.heartbeat);
                let is_terminal = matches!(event, PipelineEvent::Complete | PipelineEvent::Error { .. });
                if is_terminal {
                    this.done = true;
                }
                Poll::Ready(Some(Ok(event_for(&event))))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => match this.sleep.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.sleep.as_mut().reset(tokio::time::Instant::now() + this.heartbeat);
                    Poll::Ready(Some(Ok(event_for(&PipelineEvent::Ping))))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl Drop for OrchestratorEventStream {
    fn drop(&mut self) {
        if !self.done {
            self.cancel_on_drop.cancel();
        }
    }
}

pub fn into_sse_response(stream: OrchestratorEventStream) -> Sse<OrchestratorEventStream> {
    Sse::new(stream)
}
