//! Conversation streaming and reconciliation for the Gene chat backend.
//!
//! [`ConversationController`] owns the transcript of the active conversation
//! and at most one [`StreamSession`]. Wire events are reduced by
//! [`session::reduce`] into transcript effects, which the controller applies
//! to the [`MessageLog`]; every mutation is written through to the local
//! [`conversation_store::ConversationStore`].

pub mod backend;
pub mod config;
pub mod controller;
pub mod logging;
pub mod message_log;
pub mod session;
pub mod thinking;

pub use backend::ChatBackend;
pub use config::EnvConfig;
pub use controller::{
    ConnectionStatus, ControllerError, ConversationController, SendOutcome, ViewState,
};
pub use message_log::MessageLog;
pub use session::{
    reduce, Exchange, SessionEffect, SessionInput, SessionPhase, SessionState, StreamSession,
    CONNECTIVITY_ERROR,
};
pub use thinking::{display_content, extract_thinking};
