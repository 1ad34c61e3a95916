//! Session history endpoints.
//!
//! - GET    /history?userId=&domain=&category=  - Stored messages for one session
//! - DELETE /history?userId=&domain=&category=  - Clear one session, or every
//!   session matching the supplied components

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use parley_core::session::store::SessionStore;
use parley_types::chat::{SessionScope, non_blank};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::handlers::chat::ANONYMOUS_USER;
use crate::state::AppState;

/// Query parameters shared by both history endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub domain: Option<String>,
    pub category: Option<String>,
}

impl HistoryQuery {
    fn user_id(&self) -> Option<&str> {
        non_blank(self.user_id.as_deref())
    }
}

/// GET /history
pub async fn get_history(
    State(state): State<AppState>,
    _auth: Authenticated,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = SessionScope::new(
        query.user_id().unwrap_or(ANONYMOUS_USER),
        query.domain.as_deref(),
        query.category.as_deref(),
    );
    let messages = state.orchestrator.store().get_history(&scope).await?;
    Ok(Json(json!({ "error": false, "messages": messages })))
}

/// DELETE /history
///
/// `userId` is required here: clearing is destructive and an omitted user
/// must not fall back to the shared anonymous sessions.
pub async fn clear_history(
    State(state): State<AppState>,
    _auth: Authenticated,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = query.user_id().ok_or_else(|| {
        AppError::Validation("Query parameter \"userId\" is required".to_string())
    })?;
    let removed = state
        .orchestrator
        .store()
        .clear_history(user_id, query.domain.as_deref(), query.category.as_deref())
        .await?;
    tracing::info!(user_id, removed, "Cleared chat history");
    Ok(Json(json!({ "error": false, "removed": removed })))
}
