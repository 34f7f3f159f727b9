use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum ChatApiError {
    InvalidBaseUrl(String),
    Request(reqwest::Error),
    /// Non-success HTTP status with the best available message.
    Status(StatusCode, String),
    /// Explicit `error` field returned by the backend with a success status.
    Backend(String),
    MissingConversationId,
    EmptyResponse,
    Serde(JsonError),
    Cancelled,
    Unknown(String),
}

impl ChatApiError {
    /// Backend-supplied text suitable for showing verbatim, if any.
    ///
    /// Transport failures have no backend text and return `None`.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Backend(message) | Self::Status(_, message) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub error: Option<ErrorPayloadValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ErrorPayloadValue {
    Text(String),
    Detailed { message: Option<String> },
}

impl ErrorPayloadValue {
    pub fn message(&self) -> Option<&str> {
        let message = match self {
            Self::Text(message) => Some(message.as_str()),
            Self::Detailed { message } => message.as_deref(),
        };
        message.and_then(non_empty_string)
    }
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Backend(message) => write!(f, "{message}"),
            Self::MissingConversationId => {
                write!(f, "backend response did not include a conversation id")
            }
            Self::EmptyResponse => write!(f, "backend response did not include a reply"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ChatApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ChatApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extract a human-readable message from a failed response body.
///
/// Accepts both `{"error":"text"}` and `{"error":{"message":"text"}}`, then
/// falls back to the raw body and finally to the status reason phrase.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.error.as_ref().and_then(ErrorPayloadValue::message) {
            return message.to_owned();
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
