#![allow(dead_code)]

use std::collections::VecDeque;
use std::future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chat_api::client::await_or_cancel;
use chat_api::{
    Attachment, CancellationSignal, ChatApiError, ChatResponse, EventStream, HealthStatus,
    StreamEvent,
};
use conversation_store::{ConversationStore, MemoryStorage};
use futures_util::stream;
use gene_chat::{ChatBackend, ConversationController};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// How a scripted request resolves.
pub enum Outcome<T> {
    Ok(T),
    /// Explicit `error` text from the backend.
    Backend(String),
    /// Transport failure with no backend text.
    Unreachable,
    /// Never resolves until cancelled.
    Hang,
}

impl<T> Outcome<T> {
    async fn resolve(self, cancellation: Option<&CancellationSignal>) -> Result<T, ChatApiError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Backend(message) => Err(ChatApiError::Backend(message)),
            Self::Unreachable => Err(unreachable_error()),
            Self::Hang => {
                await_or_cancel(future::pending::<()>(), cancellation).await?;
                Err(ChatApiError::Cancelled)
            }
        }
    }
}

fn unreachable_error() -> ChatApiError {
    ChatApiError::Unknown("connection refused".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Health,
    CreateConversation,
    SendMessage {
        conversation_id: String,
        message: String,
    },
    SendAttachment {
        conversation_id: String,
        file_name: String,
        message: Option<String>,
    },
    OpenStream {
        conversation_id: String,
        message: String,
    },
}

type FeedItem = Result<StreamEvent, ChatApiError>;

enum StreamScript {
    Open(UnboundedReceiver<FeedItem>),
    Refuse(Outcome<()>),
}

/// Pushes events into a stream handed out by [`ScriptedBackend`]. Sends after
/// the consumer is gone are silently dropped.
#[derive(Clone)]
pub struct StreamFeed {
    sender: UnboundedSender<FeedItem>,
}

impl StreamFeed {
    pub fn token(&self, text: &str) {
        let _ = self.sender.send(Ok(StreamEvent::Token(text.to_string())));
    }

    pub fn error(&self, message: &str) {
        let _ = self.sender.send(Ok(StreamEvent::Error(message.to_string())));
    }

    pub fn done(&self, tokens_used: Option<u64>, thinking: Option<&str>) {
        let _ = self.sender.send(Ok(StreamEvent::Done {
            tokens_used,
            thinking: thinking.map(ToOwned::to_owned),
        }));
    }

    pub fn fail(&self) {
        let _ = self.sender.send(Err(unreachable_error()));
    }

    pub fn close(self) {}
}

#[derive(Default)]
struct Script {
    health: Option<bool>,
    creations: VecDeque<Outcome<String>>,
    replies: VecDeque<Outcome<ChatResponse>>,
    streams: VecDeque<StreamScript>,
    calls: Vec<Call>,
    cancellations: Vec<CancellationSignal>,
}

/// In-process backend answering from pre-loaded scripts, in order.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_health(&self, model_loaded: Option<bool>) {
        self.lock().health = model_loaded;
    }

    pub fn push_conversation(&self, conversation_id: &str) {
        self.lock()
            .creations
            .push_back(Outcome::Ok(conversation_id.to_string()));
    }

    pub fn push_creation(&self, outcome: Outcome<String>) {
        self.lock().creations.push_back(outcome);
    }

    pub fn push_reply(&self, content: &str, tokens_used: Option<u64>) {
        self.lock().replies.push_back(Outcome::Ok(ChatResponse {
            content: content.to_string(),
            tokens_used,
            conversation_id: None,
        }));
    }

    pub fn push_reply_outcome(&self, outcome: Outcome<ChatResponse>) {
        self.lock().replies.push_back(outcome);
    }

    pub fn open_stream_feed(&self) -> StreamFeed {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().streams.push_back(StreamScript::Open(receiver));
        StreamFeed { sender }
    }

    pub fn refuse_stream(&self, outcome: Outcome<()>) {
        self.lock().streams.push_back(StreamScript::Refuse(outcome));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn creation_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::CreateConversation))
            .count()
    }

    /// Whether the most recent request's cancellation signal has fired.
    pub fn last_request_cancelled(&self) -> bool {
        self.lock()
            .cancellations
            .last()
            .is_some_and(|signal| signal.load(Ordering::Acquire))
    }

    fn record(&self, call: Call, cancellation: Option<&CancellationSignal>) {
        let mut script = self.lock();
        script.calls.push(call);
        if let Some(cancellation) = cancellation {
            script.cancellations.push(Arc::clone(cancellation));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn health(&self) -> Result<HealthStatus, ChatApiError> {
        self.record(Call::Health, None);
        let health = self.lock().health;
        health
            .map(|model_loaded| HealthStatus { model_loaded })
            .ok_or_else(unreachable_error)
    }

    async fn create_conversation(&self) -> Result<String, ChatApiError> {
        self.record(Call::CreateConversation, None);
        let outcome = self.lock().creations.pop_front();
        match outcome {
            Some(outcome) => outcome.resolve(None).await,
            None => Err(unreachable_error()),
        }
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        message: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError> {
        self.record(
            Call::SendMessage {
                conversation_id: conversation_id.to_string(),
                message: message.to_string(),
            },
            cancellation,
        );
        self.next_reply(cancellation).await
    }

    async fn send_attachment(
        &self,
        conversation_id: &str,
        attachment: &Attachment,
        message: Option<&str>,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError> {
        self.record(
            Call::SendAttachment {
                conversation_id: conversation_id.to_string(),
                file_name: attachment.file_name.clone(),
                message: message.map(ToOwned::to_owned),
            },
            cancellation,
        );
        self.next_reply(cancellation).await
    }

    async fn open_stream(
        &self,
        conversation_id: &str,
        message: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<EventStream, ChatApiError> {
        self.record(
            Call::OpenStream {
                conversation_id: conversation_id.to_string(),
                message: message.to_string(),
            },
            cancellation,
        );

        let script = self.lock().streams.pop_front();
        match script {
            Some(StreamScript::Open(receiver)) => {
                let events = stream::unfold(receiver, |mut receiver| async move {
                    receiver.recv().await.map(|item| (item, receiver))
                });
                Ok(Box::pin(events))
            }
            Some(StreamScript::Refuse(outcome)) => {
                outcome.resolve(cancellation).await?;
                Err(unreachable_error())
            }
            None => Err(unreachable_error()),
        }
    }
}

impl ScriptedBackend {
    async fn next_reply(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError> {
        let outcome = self.lock().replies.pop_front();
        match outcome {
            Some(outcome) => outcome.resolve(cancellation).await,
            None => Err(unreachable_error()),
        }
    }
}

pub fn controller(backend: &Arc<ScriptedBackend>) -> (MemoryStorage, ConversationController) {
    let storage = MemoryStorage::new();
    let controller = controller_with_storage(backend, &storage);
    (storage, controller)
}

pub fn controller_with_storage(
    backend: &Arc<ScriptedBackend>,
    storage: &MemoryStorage,
) -> ConversationController {
    let store = ConversationStore::open(Arc::new(storage.clone()));
    ConversationController::new(Arc::clone(backend) as Arc<dyn ChatBackend>, store)
}
