//! Generation port.
//!
//! The orchestrator only needs two things from a model backend: a full reply
//! for the non-streaming path and an ordered event stream for the streaming
//! one. `complete` is RPITIT; `stream` returns a boxed stream so the trait
//! stays usable behind [`super::box_provider::BoxLlmProvider`].

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Events of one streaming generation. An `Err` item ends the generation.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// A text generation backend.
///
/// Implementations live in parley-infra (`OpenAiCompatibleProvider`) and in
/// [`super::mock`].
pub trait LlmProvider: Send + Sync {
    /// Provider name reported on generation spans (e.g. "openai_compatible").
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send;

    fn stream(&self, request: CompletionRequest) -> EventStream;
}
