//! Transport-only client primitives for the Gene chat backend.
//!
//! This crate owns request building, response parsing and SSE frame decoding
//! for the `/api/health`, `/api/chat/new`, `/api/chat/{id}` and
//! `/api/chat/{id}/stream` endpoints. It holds no transcript state and knows
//! nothing about how replies are presented.
//!
//! Stream payloads are decoded once, at this boundary, into [`StreamEvent`].
//! Frames that are not valid JSON, or that carry none of the `token`, `error`
//! and `done` fields, are dropped by [`SseStreamParser`] and never reach callers.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, ChatApiClient, EventStream};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::{ChatResponse, HealthStatus, StreamEvent};
pub use payload::{Attachment, ChatRequest};
pub use sse::SseStreamParser;
pub use url::{endpoint_url, normalize_base_url};
