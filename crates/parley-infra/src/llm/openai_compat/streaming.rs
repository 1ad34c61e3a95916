//! Chat completion chunks to [`StreamEvent`]s.
//!
//! Stream order: `Connected`, then per chunk any `Usage`, `TextDelta`s and a
//! `MessageDelta` on the finishing choice, and finally `Done`. Usage only
//! arrives when the request sets `stream_options.include_usage`; it comes on
//! a last chunk whose `choices` is empty.

use futures_util::StreamExt;

use async_openai::types::chat::{
    ChatCompletionResponseStream, CreateChatCompletionStreamResponse, FinishReason,
};

use parley_core::llm::provider::EventStream;
use parley_types::llm::{LlmError, StopReason, StreamEvent, Usage};

/// Adapt an async-openai response stream to an [`EventStream`].
pub fn map_openai_stream(mut chunks: ChatCompletionResponseStream) -> EventStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::Connected;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
            for event in chunk_events(&chunk) {
                yield event;
            }
        }

        yield StreamEvent::Done;
    })
}

/// Events carried by one chunk. Empty text deltas are dropped.
pub fn chunk_events(chunk: &CreateChatCompletionStreamResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(usage) = &chunk.usage {
        events.push(StreamEvent::Usage(Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    for choice in &chunk.choices {
        match choice.delta.content.as_deref() {
            Some(text) if !text.is_empty() => events.push(StreamEvent::TextDelta {
                text: text.to_string(),
            }),
            _ => {}
        }
        if let Some(reason) = &choice.finish_reason {
            events.push(StreamEvent::MessageDelta {
                stop_reason: stop_reason_from(reason),
            });
        }
    }

    events
}

pub fn stop_reason_from(finish_reason: &FinishReason) -> StopReason {
    match finish_reason {
        FinishReason::Stop => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ToolCalls | FinishReason::FunctionCall => StopReason::ToolUse,
        FinishReason::ContentFilter => StopReason::ContentFilter,
    }
}
