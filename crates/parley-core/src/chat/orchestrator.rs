//! Turn orchestration.
//!
//! One turn: fetch history (fatal on failure), spawn the user-message append,
//! run generation while that append is in flight, then hand the assistant
//! reply to a background append. The model input is built from history read
//! before the user append lands, so the new message appears exactly once.

use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, debug, error, info, info_span};

use parley_types::chat::{Message, MessageRole, SessionScope};
use parley_types::config::ModelConfig;
use parley_types::error::TurnError;
use parley_types::llm::CompletionRequest;

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::LlmProvider;
use crate::session::store::SessionStore;

use super::background::{BackgroundWrites, PendingWrite};
use super::relay::{ChunkSink, RelayOutcome, relay};

/// Per-service generation parameters applied to every turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub system_instruction: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

impl TurnSettings {
    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self {
            model: config.model_id.clone(),
            system_instruction: config.system_instruction.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Model input for a turn plus the user append already in flight.
#[derive(Debug)]
pub struct PreparedTurn {
    pub scope: SessionScope,
    pub request: CompletionRequest,
    pub pending_user_write: PendingWrite,
}

/// Result of the non-streaming path.
#[derive(Debug)]
pub struct CompletedTurn {
    pub reply: String,
    /// `None` when the reply was empty and nothing was persisted.
    pub assistant_write: Option<PendingWrite>,
}

/// Result of the streaming path.
#[derive(Debug)]
pub struct StreamedTurn {
    pub outcome: RelayOutcome,
    /// Set only when the relay completed with non-empty text.
    pub assistant_write: Option<PendingWrite>,
}

/// Sequences session store and generation calls for each chat turn.
///
/// Generic over `SessionStore` so parley-core never depends on a concrete
/// backend; the API layer uses `BoxSessionStore`.
pub struct TurnOrchestrator<S: SessionStore> {
    store: Arc<S>,
    provider: BoxLlmProvider,
    settings: TurnSettings,
    background: Arc<BackgroundWrites>,
}

impl<S: SessionStore + 'static> TurnOrchestrator<S> {
    pub fn new(store: Arc<S>, provider: BoxLlmProvider, settings: TurnSettings) -> Self {
        Self {
            store,
            provider,
            settings,
            background: Arc::new(BackgroundWrites::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Background write counters.
    pub fn background(&self) -> &BackgroundWrites {
        &self.background
    }

    /// Fetch history and issue the user append without waiting for it.
    ///
    /// The message is trimmed once here; the trimmed text is what gets stored
    /// and sent. A history failure aborts the turn: starting from an empty
    /// history would silently fork the session.
    pub async fn prepare_turn(
        &self,
        scope: SessionScope,
        user_message: &str,
    ) -> Result<PreparedTurn, TurnError> {
        let user_message = user_message.trim();
        if user_message.is_empty() {
            return Err(TurnError::InvalidInput(
                "message must be a non-empty string".to_string(),
            ));
        }

        let started = Instant::now();
        let history = self.store.get_history(&scope).await.map_err(|e| {
            error!(scope = %scope, error = %e, "Failed to load session history");
            TurnError::History(e)
        })?;
        debug!(
            scope = %scope,
            history_len = history.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded session history"
        );

        let pending_user_write = self.background.spawn_append(
            Arc::clone(&self.store),
            scope.clone(),
            MessageRole::User,
            user_message.to_string(),
        );

        let mut messages = history;
        messages.push(Message::user(user_message));

        Ok(PreparedTurn {
            scope,
            request: self.build_request(messages),
            pending_user_write,
        })
    }

    /// Non-streaming path: generate while the user append finishes, then
    /// persist the reply in the background.
    pub async fn complete_turn(&self, prepared: PreparedTurn) -> Result<CompletedTurn, TurnError> {
        let PreparedTurn {
            scope,
            request,
            pending_user_write,
        } = prepared;

        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = false,
        );

        let started = Instant::now();
        let (generated, _user_stored) = tokio::join!(
            self.provider.complete(&request).instrument(span),
            pending_user_write.wait(),
        );
        let response = generated.map_err(|e| {
            error!(scope = %scope, error = %e, "Generation failed");
            TurnError::Generation(e)
        })?;
        debug!(
            scope = %scope,
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_tokens = response.usage.output_tokens,
            "Generation took"
        );

        let assistant_write = self.persist_reply(&scope, &response.content);
        Ok(CompletedTurn {
            reply: response.content,
            assistant_write,
        })
    }

    /// Streaming path: relay chunks into `sink` as they arrive, concurrently
    /// with the pending user append. The reply is persisted only if the
    /// generation completed.
    pub async fn stream_turn<K>(&self, prepared: PreparedTurn, sink: &mut K) -> StreamedTurn
    where
        K: ChunkSink + ?Sized,
    {
        let PreparedTurn {
            scope,
            mut request,
            pending_user_write,
        } = prepared;
        request.stream = true;

        let span = info_span!(
            "gen_ai.stream",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = true,
        );

        let started = Instant::now();
        let stream = self.provider.stream(request);
        let (outcome, _user_stored) = tokio::join!(
            relay(stream, sink).instrument(span),
            pending_user_write.wait(),
        );

        let assistant_write = match &outcome {
            RelayOutcome::Completed { text } => {
                debug!(
                    scope = %scope,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    bytes = text.len(),
                    "Stream completed"
                );
                self.persist_reply(&scope, text)
            }
            RelayOutcome::Failed { partial, .. } => {
                debug!(scope = %scope, partial_bytes = partial.len(), "Discarding partial reply");
                None
            }
            RelayOutcome::Aborted { partial } => {
                info!(scope = %scope, partial_bytes = partial.len(), "Client disconnected mid-stream");
                None
            }
        };

        StreamedTurn {
            outcome,
            assistant_write,
        }
    }

    /// Prepare and complete a turn in one call.
    pub async fn run_turn(
        &self,
        scope: SessionScope,
        user_message: &str,
    ) -> Result<CompletedTurn, TurnError> {
        let prepared = self.prepare_turn(scope, user_message).await?;
        self.complete_turn(prepared).await
    }

    /// Spawn the assistant append. The turn never waits on it; failures are
    /// logged and counted by [`BackgroundWrites`].
    pub fn append_assistant_message_in_background(
        &self,
        scope: SessionScope,
        content: String,
    ) -> PendingWrite {
        self.background.spawn_append(
            Arc::clone(&self.store),
            scope,
            MessageRole::Assistant,
            content,
        )
    }

    fn persist_reply(&self, scope: &SessionScope, reply: &str) -> Option<PendingWrite> {
        if reply.is_empty() {
            debug!(scope = %scope, "Empty reply; nothing to persist");
            return None;
        }
        Some(self.append_assistant_message_in_background(scope.clone(), reply.to_string()))
    }

    fn build_request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            system: Some(self.settings.system_instruction.clone()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedProvider;
    use crate::session::memory::InMemorySessionStore;
    use parley_types::config::StoreSettings;
    use parley_types::error::RepositoryError;

    /// In-memory store that can be told to fail specific operations.
    struct FlakyStore {
        inner: InMemorySessionStore,
        fail_history: bool,
        fail_assistant_appends: bool,
    }

    impl FlakyStore {
        fn healthy() -> Self {
            Self {
                inner: InMemorySessionStore::new(StoreSettings::default()),
                fail_history: false,
                fail_assistant_appends: false,
            }
        }
    }

    impl SessionStore for FlakyStore {
        async fn append_message(
            &self,
            scope: &SessionScope,
            role: MessageRole,
            content: &str,
        ) -> Result<(), RepositoryError> {
            if self.fail_assistant_appends && role == MessageRole::Assistant {
                return Err(RepositoryError::Connection("store unavailable".to_string()));
            }
            self.inner.append_message(scope, role, content).await
        }

        async fn get_history(&self, scope: &SessionScope) -> Result<Vec<Message>, RepositoryError> {
            if self.fail_history {
                return Err(RepositoryError::Connection("store unavailable".to_string()));
            }
            self.inner.get_history(scope).await
        }

        async fn clear_history(
            &self,
            user_id: &str,
            domain: Option<&str>,
            category: Option<&str>,
        ) -> Result<u64, RepositoryError> {
            self.inner.clear_history(user_id, domain, category).await
        }
    }

    fn settings() -> TurnSettings {
        TurnSettings {
            model: "test-model".to_string(),
            system_instruction: "Be brief.".to_string(),
            max_tokens: 64,
            temperature: None,
        }
    }

    fn orchestrator(
        store: FlakyStore,
        provider: ScriptedProvider,
    ) -> TurnOrchestrator<FlakyStore> {
        TurnOrchestrator::new(Arc::new(store), BoxLlmProvider::new(provider), settings())
    }

    #[tokio::test]
    async fn test_complete_turn_persists_both_sides() {
        let orch = orchestrator(FlakyStore::healthy(), ScriptedProvider::replying(["Hi ", "there"]));
        let scope = SessionScope::for_user("u1");

        let turn = orch.run_turn(scope.clone(), "hello").await.unwrap();
        assert_eq!(turn.reply, "Hi there");
        assert!(turn.assistant_write.unwrap().wait().await);

        let history = orch.store().get_history(&scope).await.unwrap();
        assert_eq!(
            history,
            vec![Message::user("hello"), Message::assistant("Hi there")]
        );
        assert_eq!(orch.background().spawned(), 2);
        assert_eq!(orch.background().failed(), 0);
    }

    #[tokio::test]
    async fn test_model_input_is_prior_history_plus_new_message() {
        let provider = ScriptedProvider::replying(["ok"]);
        let store = FlakyStore::healthy();
        let scope = SessionScope::new("u1", Some("shop"), None);
        store.inner.append_message(&scope, MessageRole::User, "a").await.unwrap();
        store.inner.append_message(&scope, MessageRole::Assistant, "b").await.unwrap();
        let orch = orchestrator(store, provider.clone());

        orch.run_turn(scope, "c").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].messages,
            vec![Message::user("a"), Message::assistant("b"), Message::user("c")]
        );
        assert_eq!(requests[0].system.as_deref(), Some("Be brief."));
        assert_eq!(requests[0].model, "test-model");
        assert!(!requests[0].stream);
    }

    #[tokio::test]
    async fn test_user_message_is_trimmed_before_store_and_model() {
        let provider = ScriptedProvider::replying(["ok"]);
        let orch = orchestrator(FlakyStore::healthy(), provider.clone());
        let scope = SessionScope::for_user("u1");

        let turn = orch.run_turn(scope.clone(), "  hello there \n").await.unwrap();
        assert!(turn.assistant_write.unwrap().wait().await);

        assert_eq!(provider.requests()[0].messages, vec![Message::user("hello there")]);
        assert_eq!(
            orch.store().get_history(&scope).await.unwrap(),
            vec![Message::user("hello there"), Message::assistant("ok")]
        );
    }

    #[tokio::test]
    async fn test_history_failure_aborts_turn() {
        let provider = ScriptedProvider::replying(["never"]);
        let store = FlakyStore {
            fail_history: true,
            ..FlakyStore::healthy()
        };
        let orch = orchestrator(store, provider.clone());

        let err = orch.run_turn(SessionScope::for_user("u1"), "hello").await.unwrap_err();
        assert!(matches!(err, TurnError::History(RepositoryError::Connection(_))));
        assert!(provider.requests().is_empty());
        assert_eq!(orch.background().spawned(), 0);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_before_store_access() {
        let store = FlakyStore {
            fail_history: true,
            ..FlakyStore::healthy()
        };
        let orch = orchestrator(store, ScriptedProvider::replying(["x"]));

        let err = orch.prepare_turn(SessionScope::for_user("u1"), "   ").await.unwrap_err();
        assert!(matches!(err, TurnError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_generation_failure_persists_no_assistant_text() {
        let orch = orchestrator(
            FlakyStore::healthy(),
            ScriptedProvider::replying(["half"]).then_failing("model crashed"),
        );
        let scope = SessionScope::for_user("u1");

        let err = orch.run_turn(scope.clone(), "hello").await.unwrap_err();
        assert!(matches!(err, TurnError::Generation(_)));

        let history = orch.store().get_history(&scope).await.unwrap();
        assert_eq!(history, vec![Message::user("hello")]);
    }

    #[tokio::test]
    async fn test_empty_reply_is_not_persisted() {
        let orch = orchestrator(FlakyStore::healthy(), ScriptedProvider::replying(Vec::<String>::new()));
        let scope = SessionScope::for_user("u1");

        let turn = orch.run_turn(scope.clone(), "hello").await.unwrap();
        assert!(turn.reply.is_empty());
        assert!(turn.assistant_write.is_none());
        assert_eq!(orch.store().get_history(&scope).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_turn_persists_exactly_what_was_delivered() {
        let provider = ScriptedProvider::replying(["Str", "eam", "ed!"]);
        let orch = orchestrator(FlakyStore::healthy(), provider.clone());
        let scope = SessionScope::for_user("u1");

        let prepared = orch.prepare_turn(scope.clone(), "go").await.unwrap();
        let mut sink: Vec<String> = Vec::new();
        let turn = orch.stream_turn(prepared, &mut sink).await;

        assert!(turn.outcome.is_completed());
        assert!(turn.assistant_write.unwrap().wait().await);
        let history = orch.store().get_history(&scope).await.unwrap();
        assert_eq!(history[1], Message::assistant(sink.concat()));
        assert!(provider.requests()[0].stream);
    }

    #[tokio::test]
    async fn test_stream_failure_writes_marker_and_skips_persistence() {
        let orch = orchestrator(
            FlakyStore::healthy(),
            ScriptedProvider::replying(["par", "tial"]).then_failing("boom"),
        );
        let scope = SessionScope::for_user("u1");

        let prepared = orch.prepare_turn(scope.clone(), "go").await.unwrap();
        let mut sink: Vec<String> = Vec::new();
        let turn = orch.stream_turn(prepared, &mut sink).await;

        assert_eq!(sink, vec!["par", "tial", "\n[error] provider error: boom"]);
        assert!(matches!(turn.outcome, RelayOutcome::Failed { .. }));
        assert!(turn.assistant_write.is_none());
        assert_eq!(
            orch.store().get_history(&scope).await.unwrap(),
            vec![Message::user("go")]
        );
    }

    #[tokio::test]
    async fn test_assistant_write_failure_does_not_affect_delivery() {
        let store = FlakyStore {
            fail_assistant_appends: true,
            ..FlakyStore::healthy()
        };
        let orch = orchestrator(store, ScriptedProvider::replying(["a", "b", "c"]));
        let scope = SessionScope::for_user("u1");

        let prepared = orch.prepare_turn(scope.clone(), "go").await.unwrap();
        let mut sink: Vec<String> = Vec::new();
        let turn = orch.stream_turn(prepared, &mut sink).await;

        assert_eq!(sink, vec!["a", "b", "c"]);
        assert_eq!(turn.outcome.delivered_text(), "abc");
        assert!(!turn.assistant_write.unwrap().wait().await);
        assert_eq!(orch.background().failed(), 1);
    }

    #[tokio::test]
    async fn test_stream_abort_skips_persistence() {
        let orch = orchestrator(FlakyStore::healthy(), ScriptedProvider::replying(["a", "b"]));
        let scope = SessionScope::for_user("u1");

        let prepared = orch.prepare_turn(scope.clone(), "go").await.unwrap();
        let (mut tx, rx) = tokio::sync::mpsc::channel::<String>(4);
        drop(rx);
        let turn = orch.stream_turn(prepared, &mut tx).await;

        assert!(matches!(turn.outcome, RelayOutcome::Aborted { .. }));
        assert!(turn.assistant_write.is_none());
        assert_eq!(orch.store().get_history(&scope).await.unwrap().len(), 1);
    }
}
