//! Chat endpoint.
//!
//! POST /chat
//!
//! Body: `{"message": string, "userId"?: string, "domain"?: string, "category"?: string}`.
//! By default the reply streams back as `text/plain` chunks; with
//! `?nostreaming` the full reply is returned as `{"error": false, "reply": ...}`.
//! Once streaming has begun a generation failure can only be reported
//! in-band, as a trailing `\n[error] <message>` line.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, info_span};

use parley_types::chat::SessionScope;

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::state::AppState;

/// `userId` used when the body omits one.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Chunks buffered between the relay and the HTTP body.
const STREAM_BUFFER: usize = 32;

const MESSAGE_REQUIRED: &str = "Field \"message\" is required and must be a non-empty string";

/// Raw `POST /chat` body. Fields of the wrong type are treated as absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    message: Option<TextField>,
    user_id: Option<TextField>,
    domain: Option<TextField>,
    category: Option<TextField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextField {
    Text(String),
    Other(#[allow(dead_code)] IgnoredAny),
}

impl TextField {
    fn non_blank(field: Option<Self>) -> Option<String> {
        match field {
            Some(TextField::Text(text)) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

/// A validated chat request.
#[derive(Debug, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    pub domain: Option<String>,
    pub category: Option<String>,
}

impl ChatRequest {
    /// Parse and validate a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        // Only a JSON object is a valid body; a derived struct would also take an array.
        let object: Map<String, Value> =
            serde_json::from_slice(body).map_err(|_| AppError::InvalidJson)?;
        let body: ChatBody =
            serde_json::from_value(Value::Object(object)).map_err(|_| AppError::InvalidJson)?;

        let message = TextField::non_blank(body.message)
            .ok_or_else(|| AppError::Validation(MESSAGE_REQUIRED.to_string()))?;

        Ok(Self {
            message,
            user_id: TextField::non_blank(body.user_id)
                .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
            domain: TextField::non_blank(body.domain),
            category: TextField::non_blank(body.category),
        })
    }

    pub fn scope(&self) -> SessionScope {
        SessionScope::new(
            self.user_id.as_str(),
            self.domain.as_deref(),
            self.category.as_deref(),
        )
    }
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    _auth: Authenticated,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request = ChatRequest::parse(&body)?;
    let scope = request.scope();
    let streaming = !params.contains_key("nostreaming");
    debug!(scope = %scope, streaming, "Chat turn received");

    let prepared = state
        .orchestrator
        .prepare_turn(scope.clone(), &request.message)
        .await?;

    if !streaming {
        let turn = state.orchestrator.complete_turn(prepared).await?;
        return Ok(Json(json!({ "error": false, "reply": turn.reply })).into_response());
    }

    let (mut tx, rx) = mpsc::channel::<String>(STREAM_BUFFER);
    let orchestrator = Arc::clone(&state.orchestrator);
    let span = info_span!("chat.stream", scope = %scope);
    tokio::spawn(
        async move {
            let turn = orchestrator.stream_turn(prepared, &mut tx).await;
            debug!(
                completed = turn.outcome.is_completed(),
                bytes = turn.outcome.delivered_text().len(),
                "Relay finished"
            );
        }
        .instrument(span),
    );

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}
