//! One assistant turn: the reducer that turns wire events into transcript
//! mutations, and the driver task that feeds it.
//!
//! [`reduce`] is pure. [`StreamSession`] owns the network side: a spawned task
//! that only forwards [`SessionInput`]s over a channel. The session never
//! touches the transcript itself; it hands [`SessionEffect`]s to its owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_api::{Attachment, CancellationSignal, ChatApiError, ChatResponse, StreamEvent};
use conversation_store::Message;
use futures_util::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::backend::ChatBackend;
use crate::thinking::extract_thinking;

/// Shown when the backend could not be reached and sent no text of its own.
pub const CONNECTIVITY_ERROR: &str = "Failed to connect to backend. Is the server running?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// The event stream was accepted by the backend.
    Opened,
    Event(StreamEvent),
    /// Result of a request/response exchange.
    Reply(ChatResponse),
    /// Transport failed, or the stream ended before a terminal event.
    ConnectionLost,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    Append(Message),
    AppendFragment {
        id: String,
        fragment: String,
    },
    Finalize {
        id: String,
        tokens: Option<u64>,
        thinking: Option<String>,
    },
    /// Turn the in-flight assistant message into an error message.
    MarkError {
        id: String,
        content: String,
    },
    /// Tear down the connection and any companion request.
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub conversation_id: Option<String>,
    /// Id given to the assistant message this session produces.
    pub message_id: String,
    pub first_token_seen: bool,
}

impl SessionState {
    #[cfg(test)]
    pub fn idle(message_id: impl Into<String>) -> Self {
        Self {
            phase: SessionPhase::Idle,
            conversation_id: None,
            message_id: message_id.into(),
            first_token_seen: false,
        }
    }

    pub fn open(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            phase: SessionPhase::Connecting,
            conversation_id: Some(conversation_id.into()),
            message_id: message_id.into(),
            first_token_seen: false,
        }
    }
}

pub fn reduce(state: SessionState, input: SessionInput) -> (SessionState, Vec<SessionEffect>) {
    if state.phase.is_terminal() {
        return (state, Vec::new());
    }

    let mut next = state;
    let mut effects = Vec::new();

    match input {
        SessionInput::Cancel => {
            next.phase = SessionPhase::Cancelled;
            effects.push(SessionEffect::Close);
        }
        _ if next.phase == SessionPhase::Idle => {}
        SessionInput::Opened => {
            next.phase = SessionPhase::Streaming;
        }
        SessionInput::Event(StreamEvent::Token(fragment)) => {
            next.phase = SessionPhase::Streaming;
            if next.first_token_seen {
                effects.push(SessionEffect::AppendFragment {
                    id: next.message_id.clone(),
                    fragment,
                });
            } else {
                next.first_token_seen = true;
                effects.push(SessionEffect::Append(Message::assistant(
                    Some(next.message_id.clone()),
                    fragment,
                )));
            }
        }
        SessionInput::Event(StreamEvent::Error(message)) => {
            next.phase = SessionPhase::Errored;
            if next.first_token_seen {
                effects.push(SessionEffect::MarkError {
                    id: next.message_id.clone(),
                    content: message,
                });
            } else {
                effects.push(SessionEffect::Append(Message::error(message)));
            }
            effects.push(SessionEffect::Close);
        }
        SessionInput::Event(StreamEvent::Done {
            tokens_used,
            thinking,
        }) => {
            next.phase = SessionPhase::Completed;
            if next.first_token_seen {
                effects.push(SessionEffect::Finalize {
                    id: next.message_id.clone(),
                    tokens: tokens_used,
                    thinking,
                });
            }
            effects.push(SessionEffect::Close);
        }
        SessionInput::Reply(response) => {
            next.phase = SessionPhase::Completed;
            let thinking = extract_thinking(&response.content);
            effects.push(SessionEffect::Append(
                Message::assistant(Some(next.message_id.clone()), response.content)
                    .with_tokens(response.tokens_used)
                    .with_thinking(thinking),
            ));
            effects.push(SessionEffect::Close);
        }
        SessionInput::ConnectionLost => {
            next.phase = SessionPhase::Errored;
            if !next.first_token_seen {
                effects.push(SessionEffect::Append(Message::error(CONNECTIVITY_ERROR)));
            }
            effects.push(SessionEffect::Close);
        }
    }

    (next, effects)
}

/// Request/response exchanges that produce a single reply.
#[derive(Debug, Clone)]
pub enum Exchange {
    Message(String),
    Attachment {
        attachment: Attachment,
        message: Option<String>,
    },
}

/// A live session: reducer state plus the task feeding it.
///
/// Dropping the session cancels the companion request and aborts the task.
pub struct StreamSession {
    state: SessionState,
    inputs: UnboundedReceiver<SessionInput>,
    cancellation: CancellationSignal,
    task: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Open the event stream for `message`. Must be called inside a tokio runtime.
    pub fn streaming(
        backend: Arc<dyn ChatBackend>,
        conversation_id: String,
        message: String,
        message_id: String,
    ) -> Self {
        let state = SessionState::open(conversation_id.clone(), message_id);
        Self::spawn(state, |cancellation, inputs| {
            drive_stream(backend, conversation_id, message, cancellation, inputs)
        })
    }

    /// Run one request/response exchange. Must be called inside a tokio runtime.
    pub fn exchange(
        backend: Arc<dyn ChatBackend>,
        conversation_id: String,
        exchange: Exchange,
        message_id: String,
    ) -> Self {
        let state = SessionState::open(conversation_id.clone(), message_id);
        Self::spawn(state, |cancellation, inputs| {
            drive_exchange(backend, conversation_id, exchange, cancellation, inputs)
        })
    }

    fn spawn<F, Fut>(state: SessionState, driver: F) -> Self
    where
        F: FnOnce(CancellationSignal, UnboundedSender<SessionInput>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancellation: CancellationSignal = Arc::new(AtomicBool::new(false));
        let (sender, inputs) = mpsc::unbounded_channel();
        let task = tokio::spawn(driver(Arc::clone(&cancellation), sender));

        tracing::debug!(message_id = %state.message_id, "session opened");
        Self {
            state,
            inputs,
            cancellation,
            task: Some(task),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn message_id(&self) -> &str {
        &self.state.message_id
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    /// Wait for the driver's next input. A driver that went away without a
    /// terminal input reads as a lost connection.
    pub async fn next_input(&mut self) -> SessionInput {
        self.inputs
            .recv()
            .await
            .unwrap_or(SessionInput::ConnectionLost)
    }

    /// Next input that has already been delivered, without waiting.
    pub fn try_next_input(&mut self) -> Option<SessionInput> {
        match self.inputs.try_recv() {
            Ok(input) => Some(input),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(SessionInput::ConnectionLost),
        }
    }

    /// Step the reducer, shutting the driver down on a terminal transition.
    pub fn apply(&mut self, input: SessionInput) -> Vec<SessionEffect> {
        let previous = self.state.phase;
        let (next, effects) = reduce(self.state.clone(), input);
        self.state = next;

        if self.state.phase != previous {
            tracing::debug!(
                message_id = %self.state.message_id,
                from = ?previous,
                to = ?self.state.phase,
                "session transition"
            );
        }
        if self.state.phase.is_terminal() {
            self.shutdown();
        }

        effects
    }

    pub fn cancel(&mut self) -> Vec<SessionEffect> {
        self.apply(SessionInput::Cancel)
    }

    fn shutdown(&mut self) {
        self.cancellation.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.inputs.close();
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .field("running", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

async fn drive_stream(
    backend: Arc<dyn ChatBackend>,
    conversation_id: String,
    message: String,
    cancellation: CancellationSignal,
    inputs: UnboundedSender<SessionInput>,
) {
    let mut events = match backend
        .open_stream(&conversation_id, &message, Some(&cancellation))
        .await
    {
        Ok(events) => events,
        Err(error) => {
            forward_failure(&inputs, error);
            return;
        }
    };

    if inputs.send(SessionInput::Opened).is_err() {
        return;
    }

    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let terminal = event.is_terminal();
                if inputs.send(SessionInput::Event(event)).is_err() || terminal {
                    return;
                }
            }
            Err(error) => {
                forward_failure(&inputs, error);
                return;
            }
        }
    }

    tracing::debug!(%conversation_id, "stream ended without a terminal event");
    let _ = inputs.send(SessionInput::ConnectionLost);
}

async fn drive_exchange(
    backend: Arc<dyn ChatBackend>,
    conversation_id: String,
    exchange: Exchange,
    cancellation: CancellationSignal,
    inputs: UnboundedSender<SessionInput>,
) {
    let result = match &exchange {
        Exchange::Message(message) => {
            backend
                .send_message(&conversation_id, message, Some(&cancellation))
                .await
        }
        Exchange::Attachment {
            attachment,
            message,
        } => {
            backend
                .send_attachment(
                    &conversation_id,
                    attachment,
                    message.as_deref(),
                    Some(&cancellation),
                )
                .await
        }
    };

    match result {
        Ok(response) => {
            if let Some(echoed) = response
                .conversation_id
                .as_deref()
                .filter(|echoed| *echoed != conversation_id)
            {
                tracing::debug!(%conversation_id, echoed, "backend echoed a different conversation id");
            }
            let _ = inputs.send(SessionInput::Reply(response));
        }
        Err(error) => forward_failure(&inputs, error),
    }
}

fn forward_failure(inputs: &UnboundedSender<SessionInput>, error: ChatApiError) {
    if let Some(input) = failure_input(&error) {
        let _ = inputs.send(input);
    }
}

/// Map a transport error onto the reducer: backend text is surfaced as a
/// stream error, cancellation is silent, anything else is a lost connection.
fn failure_input(error: &ChatApiError) -> Option<SessionInput> {
    if error.is_cancelled() {
        return None;
    }

    tracing::debug!(%error, "session request failed");
    match error.backend_message() {
        Some(message) => Some(SessionInput::Event(StreamEvent::Error(message.to_owned()))),
        None => Some(SessionInput::ConnectionLost),
    }
}
