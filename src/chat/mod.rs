//! Chat orchestration
//!
//! Per request: resolve the session, retrieve context, compose the prompt,
//! drive the model (tools attached) to a final answer, persist the exchange,
//! and deliver the result whole or as a fragment stream. The user turn is
//! persisted before the model call so a later failure cannot lose it; a
//! cancelled stream persists no assistant record.

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::meta::{Message, Role, Session};
use crate::model::{ChatModel, ModelTurn, PromptMessage};
use crate::retrieval::RetrievalEngine;
use crate::session::SessionManager;
use crate::tools::ToolDispatcher;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// User-facing failure message
pub const GENERIC_APOLOGY: &str = "Désolé, une erreur s'est produite.";

/// An inbound chat request
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub image_url: Option<String>,
}

/// The outcome of a non-streaming chat turn
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub message: String,
    pub timestamp: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    fn success(session_id: String, message: String) -> Self {
        Self {
            session_id,
            message,
            timestamp: Utc::now().to_rfc3339(),
            success: true,
            error: None,
        }
    }

    fn failure(session_id: String, error: String) -> Self {
        Self {
            session_id,
            message: GENERIC_APOLOGY.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            success: false,
            error: Some(error),
        }
    }
}

/// Events delivered on the streaming channel, terminated by exactly one
/// `Done` or `Error`
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Fragment(String),
    Done { session_id: String },
    Error { session_id: String, error: String },
}

/// Top-level chat orchestrator
pub struct ChatOrchestrator {
    sessions: Arc<SessionManager>,
    retrieval: Arc<RetrievalEngine>,
    tools: Arc<ToolDispatcher>,
    model: Arc<dyn ChatModel>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        retrieval: Arc<RetrievalEngine>,
        tools: Arc<ToolDispatcher>,
        model: Arc<dyn ChatModel>,
        config: ChatConfig,
    ) -> Self {
        Self {
            sessions,
            retrieval,
            tools,
            model,
            config,
        }
    }

    /// Process a chat request and return the whole response
    pub async fn process(&self, request: ChatRequest) -> ChatResponse {
        let fallback_id = request.session_id.clone().unwrap_or_default();

        let (session, messages) = match self.prepare_turn(&request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Failed to prepare chat turn: {}", e);
                return ChatResponse::failure(fallback_id, e.to_string());
            }
        };

        match self.drive_model(messages, None).await {
            Ok(answer) => match self.persist_assistant(&session, &answer).await {
                Ok(()) => {
                    info!("Generated response for session {}", session.session_id);
                    ChatResponse::success(session.session_id, answer)
                }
                Err(e) => {
                    error!("Failed to persist assistant turn: {}", e);
                    ChatResponse::failure(session.session_id, e.to_string())
                }
            },
            Err(e) => {
                error!("Model invocation failed: {}", e);
                ChatResponse::failure(session.session_id, e.to_string())
            }
        }
    }

    /// Process a chat request, delivering fragments through `events`.
    ///
    /// The channel receives ordered `Fragment`s terminated by `Done` (which
    /// implies the assistant turn was persisted) or `Error` (nothing beyond
    /// the user turn was persisted). A consumer that drops the receiver
    /// cancels generation; a cancelled turn persists no assistant record.
    pub async fn process_streaming(
        &self,
        request: ChatRequest,
        events: mpsc::Sender<StreamEvent>,
    ) {
        let fallback_id = request.session_id.clone().unwrap_or_default();

        let (session, messages) = match self.prepare_turn(&request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Failed to prepare chat turn: {}", e);
                let _ = events
                    .send(StreamEvent::Error {
                        session_id: fallback_id,
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        // Forward raw fragments as stream events; dropping the receiver
        // upstream closes this and, through it, stops the model stream.
        let (fragment_tx, mut fragment_rx) = mpsc::channel::<String>(32);
        let event_tx = events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(fragment) = fragment_rx.recv().await {
                if event_tx
                    .send(StreamEvent::Fragment(fragment))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let outcome = self.drive_model(messages, Some(&fragment_tx)).await;
        drop(fragment_tx);
        let _ = forwarder.await;

        match outcome {
            Ok(answer) => {
                if events.is_closed() {
                    info!(
                        "Stream for session {} cancelled after completion, not persisting",
                        session.session_id
                    );
                    return;
                }
                match self.persist_assistant(&session, &answer).await {
                    Ok(()) => {
                        let _ = events
                            .send(StreamEvent::Done {
                                session_id: session.session_id,
                            })
                            .await;
                    }
                    Err(e) => {
                        error!("Failed to persist assistant turn: {}", e);
                        let _ = events
                            .send(StreamEvent::Error {
                                session_id: session.session_id,
                                error: e.to_string(),
                            })
                            .await;
                    }
                }
            }
            Err(e) => {
                if events.is_closed() {
                    info!("Stream for session {} cancelled", session.session_id);
                    return;
                }
                error!("Streaming model invocation failed: {}", e);
                let _ = events
                    .send(StreamEvent::Error {
                        session_id: session.session_id,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Steps 1-4: session, retrieval, prompt composition, durable user turn
    async fn prepare_turn(&self, request: &ChatRequest) -> Result<(Session, Vec<PromptMessage>)> {
        let session = self
            .sessions
            .get_or_create(
                request.session_id.as_deref(),
                request.user_id.as_deref().unwrap_or(""),
            )
            .await?;

        let chunks = self.retrieval.retrieve(&request.message, None, None).await;
        let context = RetrievalEngine::build_context(&chunks);
        let enhanced = build_enhanced_prompt(&request.message, &context);

        // Snapshot the window before appending so the current turn is not
        // duplicated into the history section of the prompt
        let window = self.sessions.window(&session.session_id).await;

        let user_row = Message::new(session.id.clone(), Role::User, request.message.clone())
            .with_image(request.image_url.clone());
        self.sessions.append(&session, user_row).await?;

        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(PromptMessage::system(self.config.system_prompt.clone()));
        for turn in window {
            match turn.role {
                Role::User => messages.push(PromptMessage::user(turn.content)),
                Role::Assistant => messages.push(PromptMessage::assistant(turn.content)),
                Role::System => {}
            }
        }
        match request.image_url {
            Some(ref url) => messages.push(PromptMessage::user_with_image(enhanced, url.clone())),
            None => messages.push(PromptMessage::user(enhanced)),
        }

        Ok((session, messages))
    }

    /// Steps 5: run the model, resolving tool calls until it produces text
    async fn drive_model(
        &self,
        mut messages: Vec<PromptMessage>,
        fragments: Option<&mpsc::Sender<String>>,
    ) -> Result<String> {
        let tool_defs = self.tools.definitions();
        let mut rounds = 0;

        loop {
            let turn = match fragments {
                Some(tx) => self.model.stream(&messages, &tool_defs, tx).await?,
                None => self.model.complete(&messages, &tool_defs).await?,
            };

            match turn {
                ModelTurn::Final(text) => return Ok(text),
                ModelTurn::ToolCalls(calls) => {
                    rounds += 1;
                    if rounds > self.config.max_tool_rounds {
                        return Err(Error::Model(format!(
                            "Gave up after {} tool rounds",
                            self.config.max_tool_rounds
                        )));
                    }

                    messages.push(PromptMessage::assistant_tool_calls(calls.clone()));
                    for call in calls {
                        let result = self.tools.dispatch(&call.name, &call.arguments).await;
                        messages.push(PromptMessage::tool_result(call.id, result));
                    }
                }
            }
        }
    }

    /// Steps 6: durable assistant turn + recency window update
    async fn persist_assistant(&self, session: &Session, answer: &str) -> Result<()> {
        let row = Message::new(session.id.clone(), Role::Assistant, answer.to_string());
        self.sessions.append(session, row).await
    }

    /// Full history for an external session id
    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        self.sessions.history(session_id).await
    }

    /// Deactivate a session and drop its recency window
    pub async fn clear(&self, session_id: &str) -> Result<bool> {
        let cleared = self.sessions.clear(session_id).await?;
        if !cleared {
            warn!("Clear requested for unknown session {}", session_id);
        }
        Ok(cleared)
    }
}

/// The enhanced prompt wrapping retrieved context around the user question
fn build_enhanced_prompt(user_message: &str, context: &str) -> String {
    format!(
        "Contexte provenant des documents:\n{}\n\nQuestion de l'utilisateur:\n{}\n\nRépondez en utilisant uniquement les informations du contexte fourni.\nSi l'information n'est pas disponible, dites \"Je ne sais pas\".",
        context, user_message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ServicesConfig};
    use crate::embed::Embedder;
    use crate::meta::MetaDb;
    use crate::model::ToolCall;
    use crate::tools::ToolDefinition;
    use crate::vector::InMemoryIndex;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.into_iter().map(|_| vec![0.0, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "null-stub"
        }
    }

    /// Model that replays a scripted sequence of turns and records the
    /// prompts it was given
    struct ScriptedModel {
        turns: Mutex<VecDeque<Result<ModelTurn>>>,
        seen: Mutex<Vec<Vec<PromptMessage>>>,
        stream_fragments: Vec<String>,
    }

    impl ScriptedModel {
        fn new(turns: Vec<Result<ModelTurn>>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
                seen: Mutex::new(Vec::new()),
                stream_fragments: Vec::new(),
            }
        }

        fn with_fragments(mut self, fragments: Vec<&str>) -> Self {
            self.stream_fragments = fragments.into_iter().map(String::from).collect();
            self
        }

        fn next_turn(&self, messages: &[PromptMessage]) -> Result<ModelTurn> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Model("script exhausted".to_string())))
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[PromptMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ModelTurn> {
            self.next_turn(messages)
        }

        async fn stream(
            &self,
            messages: &[PromptMessage],
            _tools: &[ToolDefinition],
            fragments: &mpsc::Sender<String>,
        ) -> Result<ModelTurn> {
            let turn = self.next_turn(messages)?;
            if let ModelTurn::Final(_) = turn {
                for fragment in &self.stream_fragments {
                    if fragments.send(fragment.clone()).await.is_err() {
                        return Err(Error::Model("Stream consumer went away".to_string()));
                    }
                }
            }
            Ok(turn)
        }
    }

    async fn orchestrator_with(
        model: Arc<dyn ChatModel>,
    ) -> (TempDir, ChatOrchestrator, Arc<SessionManager>) {
        let dir = TempDir::new().unwrap();
        let db = MetaDb::new(&dir.path().join("meta.db")).await.unwrap();
        db.init_schema().await.unwrap();

        let mut config = Config::default();
        config.embedding.dimension = 2;

        let index = Arc::new(InMemoryIndex::new());
        let embedder: Arc<dyn Embedder> = Arc::new(NullEmbedder);
        let sessions = Arc::new(SessionManager::new(db.clone(), &config.chat));
        let retrieval = Arc::new(RetrievalEngine::new(
            db,
            index,
            embedder,
            config.retrieval.clone(),
        ));
        // Nothing listens here; every tool call degrades to an error string
        let tools = Arc::new(
            ToolDispatcher::new(&ServicesConfig {
                beneficiary_url: "http://127.0.0.1:1".to_string(),
                transfer_url: "http://127.0.0.1:1".to_string(),
                timeout_secs: 1,
            })
            .unwrap(),
        );

        let orchestrator = ChatOrchestrator::new(
            sessions.clone(),
            retrieval,
            tools,
            model,
            config.chat,
        );
        (dir, orchestrator, sessions)
    }

    #[tokio::test]
    async fn test_process_success_persists_both_turns() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(ModelTurn::Final(
            "Voici la réponse.".to_string(),
        ))]));
        let (_dir, orchestrator, sessions) = orchestrator_with(model).await;

        let response = orchestrator
            .process(ChatRequest {
                message: "Ma question".to_string(),
                session_id: Some("s-1".to_string()),
                user_id: Some("alice".to_string()),
                image_url: None,
            })
            .await;

        assert!(response.success);
        assert_eq!(response.session_id, "s-1");
        assert_eq!(response.message, "Voici la réponse.");
        assert!(response.error.is_none());

        let history = sessions.history("s-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Ma question");
        assert_eq!(history[1].content, "Voici la réponse.");

        let window = sessions.window("s-1").await;
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn test_session_continuity_across_turns() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelTurn::Final("Première réponse.".to_string())),
            Ok(ModelTurn::Final("Seconde réponse.".to_string())),
        ]));
        let (_dir, orchestrator, sessions) = orchestrator_with(model.clone()).await;

        for message in ["Première question", "Seconde question"] {
            let response = orchestrator
                .process(ChatRequest {
                    message: message.to_string(),
                    session_id: Some("s-1".to_string()),
                    user_id: None,
                    image_url: None,
                })
                .await;
            assert!(response.success);
        }

        assert_eq!(sessions.history("s-1").await.unwrap().len(), 4);
        assert_eq!(sessions.window("s-1").await.len(), 4);

        // The second prompt carried the first exchange as history
        let seen = model.seen.lock().unwrap();
        let second_prompt = &seen[1];
        assert!(second_prompt
            .iter()
            .any(|m| m.content.contains("Première question")));
        assert!(second_prompt
            .iter()
            .any(|m| m.content.contains("Première réponse.")));
    }

    #[tokio::test]
    async fn test_model_failure_keeps_user_turn() {
        let model = Arc::new(ScriptedModel::new(vec![Err(Error::Model(
            "backend timed out".to_string(),
        ))]));
        let (_dir, orchestrator, sessions) = orchestrator_with(model).await;

        let response = orchestrator
            .process(ChatRequest {
                message: "Ma question".to_string(),
                session_id: Some("s-1".to_string()),
                user_id: None,
                image_url: None,
            })
            .await;

        assert!(!response.success);
        assert_eq!(response.session_id, "s-1");
        assert_eq!(response.message, GENERIC_APOLOGY);
        assert!(response.error.unwrap().contains("timed out"));

        // Step 4 persisted the user turn; the failed model call added nothing
        let history = sessions.history("s-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].get_role().unwrap(), Role::User);
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort_turn() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelTurn::ToolCalls(vec![ToolCall {
                id: "call-1".to_string(),
                name: "get_beneficiary".to_string(),
                arguments: json!({"id": 999}),
            }])),
            Ok(ModelTurn::Final("Le bénéficiaire est introuvable.".to_string())),
        ]));
        let (_dir, orchestrator, _sessions) = orchestrator_with(model.clone()).await;

        let response = orchestrator
            .process(ChatRequest {
                message: "Qui est le bénéficiaire 999 ?".to_string(),
                session_id: Some("s-1".to_string()),
                user_id: None,
                image_url: None,
            })
            .await;

        // The backing service is unreachable, yet the turn still succeeds
        assert!(response.success);
        assert_eq!(response.message, "Le bénéficiaire est introuvable.");

        // The second model round saw the in-band tool error string
        let seen = model.seen.lock().unwrap();
        let second_prompt = seen.last().unwrap();
        let tool_message = second_prompt
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("call-1"))
            .expect("tool result should be in the prompt");
        assert!(tool_message.content.contains("Erreur"));
    }

    #[tokio::test]
    async fn test_tool_round_limit() {
        let endless_call = || {
            Ok(ModelTurn::ToolCalls(vec![ToolCall {
                id: "call-n".to_string(),
                name: "get_all_transfers".to_string(),
                arguments: json!({}),
            }]))
        };
        let model = Arc::new(ScriptedModel::new(
            (0..10).map(|_| endless_call()).collect(),
        ));
        let (_dir, orchestrator, _sessions) = orchestrator_with(model).await;

        let response = orchestrator
            .process(ChatRequest {
                message: "liste".to_string(),
                session_id: Some("s-1".to_string()),
                user_id: None,
                image_url: None,
            })
            .await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("tool rounds"));
    }

    #[tokio::test]
    async fn test_streaming_delivers_fragments_then_done() {
        let model = Arc::new(
            ScriptedModel::new(vec![Ok(ModelTurn::Final("Bonjour".to_string()))])
                .with_fragments(vec!["Bon", "jour"]),
        );
        let (_dir, orchestrator, sessions) = orchestrator_with(model).await;

        let (tx, mut rx) = mpsc::channel(16);
        orchestrator
            .process_streaming(
                ChatRequest {
                    message: "Salut".to_string(),
                    session_id: Some("s-1".to_string()),
                    user_id: None,
                    image_url: None,
                },
                tx,
            )
            .await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StreamEvent::Fragment(ref f) if f == "Bon"));
        assert!(matches!(events[1], StreamEvent::Fragment(ref f) if f == "jour"));
        assert!(matches!(events[2], StreamEvent::Done { ref session_id } if session_id == "s-1"));

        // Completion persisted the assistant turn
        let history = sessions.history("s-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Bonjour");
    }

    #[tokio::test]
    async fn test_streaming_error_persists_no_assistant_turn() {
        let model = Arc::new(ScriptedModel::new(vec![Err(Error::Model(
            "boom".to_string(),
        ))]));
        let (_dir, orchestrator, sessions) = orchestrator_with(model).await;

        let (tx, mut rx) = mpsc::channel(16);
        orchestrator
            .process_streaming(
                ChatRequest {
                    message: "Salut".to_string(),
                    session_id: Some("s-1".to_string()),
                    user_id: None,
                    image_url: None,
                },
                tx,
            )
            .await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error { .. }));

        let history = sessions.history("s-1").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_cancellation_persists_nothing_further() {
        let model = Arc::new(
            ScriptedModel::new(vec![Ok(ModelTurn::Final("Bonjour tout le monde".to_string()))])
                .with_fragments(vec!["Bonjour", " tout", " le", " monde"]),
        );
        let (_dir, orchestrator, sessions) = orchestrator_with(model).await;

        let (tx, mut rx) = mpsc::channel(1);
        // Take one fragment, then walk away
        let consumer = tokio::spawn(async move {
            let first = rx.recv().await;
            drop(rx);
            first
        });

        orchestrator
            .process_streaming(
                ChatRequest {
                    message: "Salut".to_string(),
                    session_id: Some("s-1".to_string()),
                    user_id: None,
                    image_url: None,
                },
                tx,
            )
            .await;

        let first = consumer.await.unwrap();
        assert!(matches!(first, Some(StreamEvent::Fragment(_))));

        // The user turn from step 4 stays; the cancelled assistant turn does not
        let history = sessions.history("s-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].get_role().unwrap(), Role::User);
    }

    #[tokio::test]
    async fn test_prompt_commands_grounding() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(ModelTurn::Final(
            "ok".to_string(),
        ))]));
        let (_dir, orchestrator, _sessions) = orchestrator_with(model.clone()).await;

        orchestrator
            .process(ChatRequest {
                message: "Quels sont les frais ?".to_string(),
                session_id: Some("s-1".to_string()),
                user_id: None,
                image_url: None,
            })
            .await;

        let seen = model.seen.lock().unwrap();
        let prompt = &seen[0];
        // System instruction first, enhanced user turn last
        assert!(matches!(prompt[0].role, crate::model::ChatRole::System));
        let last = prompt.last().unwrap();
        assert!(last.content.contains("uniquement les informations du contexte"));
        assert!(last.content.contains("Je ne sais pas"));
        // Nothing ingested: the context block is the sentinel
        assert!(last.content.contains("Aucun document pertinent trouvé."));
    }

    /// Embedder that separates transfer-related text from everything else
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .into_iter()
                .map(|t| {
                    if t.to_lowercase().contains("virement") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "axis-stub"
        }
    }

    /// Model that answers from the context block when one is present and
    /// admits ignorance otherwise
    struct GroundedModel;

    #[async_trait]
    impl ChatModel for GroundedModel {
        async fn complete(
            &self,
            messages: &[PromptMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ModelTurn> {
            let prompt = &messages.last().unwrap().content;
            if prompt.contains(crate::retrieval::NO_CONTEXT_SENTINEL) {
                return Ok(ModelTurn::Final("Je ne sais pas".to_string()));
            }
            let context = prompt
                .split("Document 1:\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\n").next())
                .unwrap_or_default();
            Ok(ModelTurn::Final(format!("D'après les documents: {}", context)))
        }

        async fn stream(
            &self,
            messages: &[PromptMessage],
            tools: &[ToolDefinition],
            _fragments: &mpsc::Sender<String>,
        ) -> Result<ModelTurn> {
            self.complete(messages, tools).await
        }
    }

    #[tokio::test]
    async fn test_end_to_end_ingest_retrieve_answer() {
        use crate::ingest::IngestionPipeline;

        let dir = TempDir::new().unwrap();
        let db = MetaDb::new(&dir.path().join("meta.db")).await.unwrap();
        db.init_schema().await.unwrap();

        let mut config = Config::default();
        config.embedding.dimension = 2;

        let index = Arc::new(InMemoryIndex::new());
        let embedder: Arc<dyn Embedder> = Arc::new(AxisEmbedder);

        // One-chunk Markdown document in category "general"
        let doc_path = dir.path().join("delais.md");
        std::fs::write(
            &doc_path,
            "Les virements SEPA sont exécutés sous 24 heures ouvrées.",
        )
        .unwrap();

        let pipeline = IngestionPipeline::new(
            db.clone(),
            index.clone(),
            embedder.clone(),
            None,
            config.clone(),
        );
        let document_id = pipeline
            .ingest(&doc_path, "general", None, false)
            .await
            .unwrap();
        assert_eq!(
            db.get_document(&document_id).await.unwrap().unwrap().chunk_count,
            1
        );

        let sessions = Arc::new(SessionManager::new(db.clone(), &config.chat));
        let retrieval = Arc::new(RetrievalEngine::new(
            db,
            index,
            embedder,
            config.retrieval.clone(),
        ));
        let tools = Arc::new(
            ToolDispatcher::new(&ServicesConfig {
                beneficiary_url: "http://127.0.0.1:1".to_string(),
                transfer_url: "http://127.0.0.1:1".to_string(),
                timeout_secs: 1,
            })
            .unwrap(),
        );
        let orchestrator = ChatOrchestrator::new(
            sessions,
            retrieval,
            tools,
            Arc::new(GroundedModel),
            config.chat,
        );

        // Question whose answer is contained verbatim in the chunk
        let grounded = orchestrator
            .process(ChatRequest {
                message: "Quel est le délai d'un virement SEPA ?".to_string(),
                session_id: Some("e2e".to_string()),
                user_id: None,
                image_url: None,
            })
            .await;

        assert!(grounded.success);
        assert!(!grounded.message.is_empty());
        assert_ne!(grounded.message, "Je ne sais pas");
        assert!(grounded.message.contains("24 heures"));

        // Unrelated question retrieves nothing and yields the admission
        let ungrounded = orchestrator
            .process(ChatRequest {
                message: "Quelle est la météo à Paris ?".to_string(),
                session_id: Some("e2e".to_string()),
                user_id: None,
                image_url: None,
            })
            .await;

        assert!(ungrounded.success);
        assert_eq!(ungrounded.message, "Je ne sais pas");
    }
}
