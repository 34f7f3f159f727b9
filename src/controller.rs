use std::sync::Arc;

use chat_api::{Attachment, ChatApiError};
use conversation_store::{ConversationStore, Message, Role};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::ChatBackend;
use crate::message_log::MessageLog;
use crate::session::{Exchange, SessionEffect, SessionInput, SessionPhase, StreamSession};
use crate::thinking::extract_thinking;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to create conversation: {0}")]
    ConversationCreation(#[source] ChatApiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send, or another session is still active. No state changed.
    Rejected,
    /// The user message was appended and a session started for the reply.
    Started { message_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub model_loaded: bool,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match (self.connected, self.model_loaded) {
            (false, _) => "Disconnected",
            (true, true) => "LLM Ready",
            (true, false) => "Mock Mode",
        }
    }
}

/// Point-in-time snapshot of everything a front end renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub conversation_id: Option<String>,
    pub messages: Vec<Message>,
    pub loading: bool,
    /// Waiting on the first token of a reply.
    pub typing: bool,
    pub phase: SessionPhase,
}

/// Owns the transcript and the single live session.
///
/// Session progress is applied on the caller's task through [`pump`],
/// [`drain_pending`] or [`run_until_idle`]; nothing mutates the transcript in
/// the background.
///
/// [`pump`]: ConversationController::pump
/// [`drain_pending`]: ConversationController::drain_pending
/// [`run_until_idle`]: ConversationController::run_until_idle
pub struct ConversationController {
    backend: Arc<dyn ChatBackend>,
    log: MessageLog,
    session: Option<StreamSession>,
    last_phase: SessionPhase,
    streaming: bool,
}

impl ConversationController {
    /// Controller positioned on the last active stored conversation.
    pub fn new(backend: Arc<dyn ChatBackend>, store: ConversationStore) -> Self {
        Self {
            backend,
            log: MessageLog::restored(store),
            session: None,
            last_phase: SessionPhase::Idle,
            streaming: true,
        }
    }

    /// With streaming off, text-only messages use the request/response exchange.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.log.conversation_id()
    }

    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn store(&self) -> &ConversationStore {
        self.log.store()
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session
            .as_ref()
            .map_or(self.last_phase, StreamSession::phase)
    }

    pub fn view(&self) -> ViewState {
        let loading = self.is_loading();
        let first_token_seen = self
            .session
            .as_ref()
            .is_some_and(|session| session.state().first_token_seen);

        ViewState {
            conversation_id: self.conversation_id().map(ToOwned::to_owned),
            messages: self.messages().to_vec(),
            loading,
            typing: loading && !first_token_seen,
            phase: self.phase(),
        }
    }

    pub async fn check_health(&self) -> ConnectionStatus {
        match self.backend.health().await {
            Ok(health) => ConnectionStatus {
                connected: true,
                model_loaded: health.model_loaded,
            },
            Err(error) => {
                tracing::debug!(%error, "health check failed");
                ConnectionStatus {
                    connected: false,
                    model_loaded: false,
                }
            }
        }
    }

    /// Active conversation id, creating and registering one if needed.
    ///
    /// On failure the transcript is left exactly as it was.
    pub async fn ensure_conversation(&mut self) -> Result<String, ControllerError> {
        if let Some(conversation_id) = self.log.conversation_id() {
            return Ok(conversation_id.to_owned());
        }

        let conversation_id = self.create_conversation().await?;
        self.log.register_conversation(conversation_id.clone());
        Ok(conversation_id)
    }

    pub async fn send_message(
        &mut self,
        text: &str,
        attachment: Option<Attachment>,
    ) -> Result<SendOutcome, ControllerError> {
        let text = text.trim();
        if text.is_empty() && attachment.is_none() {
            tracing::debug!("empty message rejected");
            return Ok(SendOutcome::Rejected);
        }
        if self.session.is_some() {
            tracing::debug!("send rejected while a session is active");
            return Ok(SendOutcome::Rejected);
        }

        let conversation_id = self.ensure_conversation().await?;
        self.log
            .append(Message::user(user_display(text, attachment.as_ref())));

        let message_id = Uuid::new_v4().to_string();
        let backend = Arc::clone(&self.backend);
        let session = match attachment {
            Some(attachment) => StreamSession::exchange(
                backend,
                conversation_id,
                Exchange::Attachment {
                    attachment,
                    message: (!text.is_empty()).then(|| text.to_owned()),
                },
                message_id.clone(),
            ),
            None if self.streaming => StreamSession::streaming(
                backend,
                conversation_id,
                text.to_owned(),
                message_id.clone(),
            ),
            None => StreamSession::exchange(
                backend,
                conversation_id,
                Exchange::Message(text.to_owned()),
                message_id.clone(),
            ),
        };

        self.last_phase = session.phase();
        self.session = Some(session);
        Ok(SendOutcome::Started { message_id })
    }

    /// Cancel the live session, if any. Safe to call repeatedly.
    pub fn stop_stream(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        let effects = session.cancel();
        self.last_phase = session.phase();
        drop(session);
        self.apply_effects(effects);
        tracing::debug!("session stopped");
    }

    /// Stop any stream and switch to a fresh, empty conversation.
    ///
    /// Stored conversations are kept. If the backend cannot create a
    /// conversation the current one stays active.
    pub async fn start_new_conversation(&mut self) -> Result<String, ControllerError> {
        self.stop_stream();

        let conversation_id = self.create_conversation().await?;
        self.log.reset(None, Vec::new());
        self.log.register_conversation(conversation_id.clone());
        self.last_phase = SessionPhase::Idle;
        Ok(conversation_id)
    }

    /// Wait for the next session input and apply it. Returns `false` when no
    /// session is live.
    pub async fn pump(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        let input = session.next_input().await;
        self.apply_input(input);
        true
    }

    /// Apply every input that has already arrived, without waiting.
    pub fn drain_pending(&mut self) -> usize {
        let mut drained = 0usize;

        while let Some(input) = self
            .session
            .as_mut()
            .and_then(StreamSession::try_next_input)
        {
            self.apply_input(input);
            drained += 1;
        }

        drained
    }

    /// Pump until the live session reaches a terminal state.
    pub async fn run_until_idle(&mut self) {
        while self.pump().await {}
    }

    fn apply_input(&mut self, input: SessionInput) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let effects = session.apply(input);
        let phase = session.phase();
        self.apply_effects(effects);

        if phase.is_terminal() {
            self.last_phase = phase;
            self.session = None;
        }
    }

    fn apply_effects(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Append(message) => self.log.append(message),
                SessionEffect::AppendFragment { id, fragment } => {
                    self.log
                        .update_by_id(&id, |message| message.content.push_str(&fragment));
                }
                SessionEffect::Finalize {
                    id,
                    tokens,
                    thinking,
                } => {
                    self.log.update_by_id(&id, |message| {
                        message.tokens = tokens;
                        message.thinking = thinking.or_else(|| extract_thinking(&message.content));
                    });
                }
                SessionEffect::MarkError { id, content } => {
                    self.log.update_by_id(&id, |message| {
                        message.role = Role::Error;
                        message.content = content;
                        message.tokens = None;
                        message.thinking = None;
                    });
                }
                SessionEffect::Close => {}
            }
        }
    }

    async fn create_conversation(&self) -> Result<String, ControllerError> {
        let conversation_id = self
            .backend
            .create_conversation()
            .await
            .map_err(ControllerError::ConversationCreation)?;
        tracing::info!(%conversation_id, "conversation created");
        Ok(conversation_id)
    }
}

impl std::fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationController")
            .field("log", &self.log)
            .field("session", &self.session)
            .field("streaming", &self.streaming)
            .finish_non_exhaustive()
    }
}

fn user_display(text: &str, attachment: Option<&Attachment>) -> String {
    match attachment {
        Some(attachment) if text.is_empty() => format!("[attached: {}]", attachment.file_name),
        Some(attachment) => format!("{text}\n[attached: {}]", attachment.file_name),
        None => text.to_owned(),
    }
}
