//! Scripted provider for tests and local dry runs.
//!
//! Replays a fixed list of chunks, optionally followed by a provider error,
//! and records every request it receives.

use std::future::Future;
use std::sync::{Arc, Mutex};

use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StopReason, StreamEvent, Usage,
};

use super::provider::{EventStream, LlmProvider};

/// A provider that answers every request with the same scripted reply.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    chunks: Vec<String>,
    failure: Option<String>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    /// Reply with `chunks`, in order, then finish normally.
    pub fn replying<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// After the scripted chunks, fail with a provider error carrying `message`.
    pub fn then_failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Requests received so far (shared across clones).
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn record(&self, request: &CompletionRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        self.record(request);
        let model = request.model.clone();
        let content = self.chunks.concat();
        let failure = self.failure.clone();
        async move {
            if let Some(message) = failure {
                return Err(LlmError::Provider { message });
            }
            Ok(CompletionResponse {
                id: "scripted".to_string(),
                content,
                model,
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        self.record(&request);
        let chunks = self.chunks.clone();
        let failure = self.failure.clone();
        Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::Connected);
            for text in chunks {
                yield Ok(StreamEvent::TextDelta { text });
            }
            match failure {
                Some(message) => yield Err(LlmError::Provider { message }),
                None => {
                    yield Ok(StreamEvent::MessageDelta { stop_reason: StopReason::EndTurn });
                    yield Ok(StreamEvent::Done);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::llm::box_provider::BoxLlmProvider;
    use parley_types::llm::Message;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".to_string(),
            messages: vec![Message::user("hi")],
            system: None,
            max_tokens: 16,
            temperature: None,
            stream: true,
        }
    }

    #[tokio::test]
    async fn test_scripted_stream_through_box() {
        let scripted = ScriptedProvider::replying(["He", "llo"]);
        let provider = BoxLlmProvider::new(scripted.clone());
        assert_eq!(provider.name(), "scripted");

        let events: Vec<_> = provider.stream(request()).collect().await;
        let texts: Vec<String> = events
            .into_iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::TextDelta { text }) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["He", "llo"]);
        assert_eq!(scripted.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_complete_failure() {
        let provider = BoxLlmProvider::new(ScriptedProvider::replying(["x"]).then_failing("down"));
        let err = provider.complete(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "provider error: down");
    }
}
