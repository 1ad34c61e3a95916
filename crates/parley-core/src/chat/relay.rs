//! Stream relay: forward generation chunks to a response sink in order while
//! accumulating the full text for persistence.
//!
//! Once the first chunk is out, status and headers are committed, so a
//! generation failure is reported in-band with [`ERROR_MARKER_PREFIX`].
//! The accumulated text only ever holds chunks the sink accepted, which keeps
//! `concat(delivered) == accumulated` on every path.

use std::future::Future;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_types::llm::{LlmError, StreamEvent};

use crate::llm::provider::EventStream;

/// Written to the sink (followed by the error message) when generation fails
/// mid-stream.
pub const ERROR_MARKER_PREFIX: &str = "\n[error] ";

/// The receiving side of the response went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response sink closed")]
pub struct SinkClosed;

/// Destination for relayed chunks.
pub trait ChunkSink: Send {
    fn send(&mut self, chunk: String) -> impl Future<Output = Result<(), SinkClosed>> + Send;
}

impl ChunkSink for mpsc::Sender<String> {
    async fn send(&mut self, chunk: String) -> Result<(), SinkClosed> {
        mpsc::Sender::send(self, chunk).await.map_err(|_| SinkClosed)
    }
}

impl ChunkSink for Vec<String> {
    async fn send(&mut self, chunk: String) -> Result<(), SinkClosed> {
        self.push(chunk);
        Ok(())
    }
}

/// How a relay ended.
#[derive(Debug)]
pub enum RelayOutcome {
    /// The generation finished; `text` is every chunk, concatenated.
    Completed { text: String },
    /// The generation failed after `partial` had been delivered. The error
    /// marker has already been written to the sink (if it was still open).
    Failed { partial: String, error: LlmError },
    /// The sink closed before the generation finished.
    Aborted { partial: String },
}

impl RelayOutcome {
    /// Text delivered to the sink before the relay ended.
    pub fn delivered_text(&self) -> &str {
        match self {
            RelayOutcome::Completed { text } => text,
            RelayOutcome::Failed { partial, .. } | RelayOutcome::Aborted { partial } => partial,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RelayOutcome::Completed { .. })
    }
}

/// Consume `stream`, forwarding each text chunk to `sink` as soon as it
/// arrives. Stops at the first error, at `Done`, or when the sink closes.
pub async fn relay<S>(
    mut stream: EventStream,
    sink: &mut S,
) -> RelayOutcome
where
    S: ChunkSink + ?Sized,
{
    let mut text = String::new();
    let mut chunks = 0usize;

    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::TextDelta { text: chunk }) => {
                if chunk.is_empty() {
                    continue;
                }
                let delivered = text.len();
                text.push_str(&chunk);
                if sink.send(chunk).await.is_err() {
                    text.truncate(delivered);
                    debug!(chunks, "Sink closed mid-stream; abandoning generation");
                    return RelayOutcome::Aborted { partial: text };
                }
                chunks += 1;
            }
            Ok(StreamEvent::Done) => break,
            Ok(StreamEvent::Connected | StreamEvent::MessageDelta { .. } | StreamEvent::Usage(_)) => {}
            Err(error) => {
                warn!(chunks, error = %error, "Generation failed mid-stream");
                let marker = format!("{ERROR_MARKER_PREFIX}{error}");
                if sink.send(marker).await.is_err() {
                    debug!("Sink closed before the error marker was written");
                }
                return RelayOutcome::Failed {
                    partial: text,
                    error,
                };
            }
        }
    }

    debug!(chunks, bytes = text.len(), "Stream completed");
    RelayOutcome::Completed { text }
}
