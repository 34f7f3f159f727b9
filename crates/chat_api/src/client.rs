use std::future::Future;
use std::pin::Pin;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::{future, stream, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::{ChatResponse, ChatResponseBody, HealthStatus, NewConversationBody, StreamEvent};
use crate::headers::{build_headers, ACCEPT_EVENT_STREAM, ACCEPT_JSON};
use crate::payload::{Attachment, ChatRequest};
use crate::sse::SseStreamParser;
use crate::url::endpoint_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

/// Decoded events of one open stream, in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ChatApiError>> + Send>>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let http = Client::builder().build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, ChatApiError> {
        endpoint_url(&self.config.base_url, segments, query)
    }

    pub fn build_headers(&self, accept: &str) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, accept);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::Unknown(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value)
                    .map_err(|_| ChatApiError::Unknown(format!("invalid header value for {key}")))?,
            );
        }
        Ok(out)
    }

    pub fn build_health_request(&self) -> Result<RequestBuilder, ChatApiError> {
        let url = self.endpoint(&["health"], &[])?;
        let headers = self.build_headers(ACCEPT_JSON)?;
        Ok(self.with_exchange_timeout(self.http.get(url).headers(headers)))
    }

    pub fn build_new_conversation_request(&self) -> Result<RequestBuilder, ChatApiError> {
        let url = self.endpoint(&["chat", "new"], &[])?;
        let headers = self.build_headers(ACCEPT_JSON)?;
        Ok(self.with_exchange_timeout(self.http.post(url).headers(headers)))
    }

    pub fn build_message_request(
        &self,
        conversation_id: &str,
        message: &str,
    ) -> Result<RequestBuilder, ChatApiError> {
        let url = self.endpoint(&["chat", conversation_id], &[])?;
        let headers = self.build_headers(ACCEPT_JSON)?;
        Ok(self.with_exchange_timeout(
            self.http
                .post(url)
                .headers(headers)
                .json(&ChatRequest::new(message)),
        ))
    }

    /// Multipart upload; accompanying text travels as the `message` query parameter.
    pub fn build_attachment_request(
        &self,
        conversation_id: &str,
        attachment: &Attachment,
        message: Option<&str>,
    ) -> Result<RequestBuilder, ChatApiError> {
        let query: Vec<(&str, &str)> = message
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| vec![("message", value)])
            .unwrap_or_default();
        let url = self.endpoint(&["chat", conversation_id], &query)?;
        let headers = self.build_headers(ACCEPT_JSON)?;

        let mut part = Part::bytes(attachment.bytes.clone()).file_name(attachment.file_name.clone());
        if let Some(mime_type) = attachment.mime_type.as_deref() {
            part = part.mime_str(mime_type)?;
        }
        let form = Form::new().part("file", part);

        Ok(self.with_exchange_timeout(self.http.post(url).headers(headers).multipart(form)))
    }

    /// Long-lived GET; the message is carried entirely in the query string.
    pub fn build_stream_request(
        &self,
        conversation_id: &str,
        message: &str,
    ) -> Result<RequestBuilder, ChatApiError> {
        let url = self.endpoint(&["chat", conversation_id, "stream"], &[("message", message)])?;
        let headers = self.build_headers(ACCEPT_EVENT_STREAM)?;
        Ok(self.http.get(url).headers(headers))
    }

    fn with_exchange_timeout(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.config.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    pub async fn health(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<HealthStatus, ChatApiError> {
        let response = send(self.build_health_request()?, cancellation).await?;
        read_json(response, cancellation).await
    }

    pub async fn create_conversation(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, ChatApiError> {
        let response = send(self.build_new_conversation_request()?, cancellation).await?;
        let body: NewConversationBody = read_json(response, cancellation).await?;

        if let Some(error) = body.error.filter(|value| !value.trim().is_empty()) {
            return Err(ChatApiError::Backend(error));
        }

        body.conversation_id
            .filter(|value| !value.trim().is_empty())
            .ok_or(ChatApiError::MissingConversationId)
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        message: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError> {
        let request = self.build_message_request(conversation_id, message)?;
        let response = send(request, cancellation).await?;
        into_chat_response(read_json(response, cancellation).await?)
    }

    pub async fn send_attachment(
        &self,
        conversation_id: &str,
        attachment: &Attachment,
        message: Option<&str>,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError> {
        let request = self.build_attachment_request(conversation_id, attachment, message)?;
        let response = send(request, cancellation).await?;
        into_chat_response(read_json(response, cancellation).await?)
    }

    /// Open the event stream and decode frames as they arrive.
    ///
    /// The returned stream ends when the backend closes the connection. A
    /// transport failure mid-stream is yielded as one `Err` item.
    pub async fn open_stream(
        &self,
        conversation_id: &str,
        message: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<EventStream, ChatApiError> {
        let request = self.build_stream_request(conversation_id, message)?;
        let response = ensure_success(send(request, cancellation).await?, cancellation).await?;

        let events = response
            .bytes_stream()
            .scan(SseStreamParser::default(), |parser, chunk| {
                let batch: Vec<Result<StreamEvent, ChatApiError>> = match chunk {
                    Ok(bytes) => parser.feed(&bytes).into_iter().map(Ok).collect(),
                    Err(error) => vec![Err(ChatApiError::from(error))],
                };
                future::ready(Some(batch))
            })
            .flat_map(stream::iter);

        Ok(Box::pin(events))
    }
}

async fn send(
    request: RequestBuilder,
    cancellation: Option<&CancellationSignal>,
) -> Result<Response, ChatApiError> {
    await_or_cancel(request.send(), cancellation)
        .await?
        .map_err(ChatApiError::from)
}

async fn ensure_success(
    response: Response,
    cancellation: Option<&CancellationSignal>,
) -> Result<Response, ChatApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = await_or_cancel(response.text(), cancellation)
        .await?
        .unwrap_or_default();
    Err(ChatApiError::Status(status, parse_error_message(status, &body)))
}

async fn read_json<T>(
    response: Response,
    cancellation: Option<&CancellationSignal>,
) -> Result<T, ChatApiError>
where
    T: DeserializeOwned,
{
    let response = ensure_success(response, cancellation).await?;
    let body = await_or_cancel(response.text(), cancellation)
        .await?
        .map_err(ChatApiError::from)?;
    serde_json::from_str(&body).map_err(ChatApiError::from)
}

fn into_chat_response(body: ChatResponseBody) -> Result<ChatResponse, ChatApiError> {
    if let Some(error) = body.error.filter(|value| !value.trim().is_empty()) {
        return Err(ChatApiError::Backend(error));
    }

    let content = body.response.ok_or(ChatApiError::EmptyResponse)?;
    Ok(ChatResponse {
        content,
        tokens_used: body.tokens_used,
        conversation_id: body.conversation_id,
    })
}

pub fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

/// Await `future`, giving up with [`ChatApiError::Cancelled`] once the signal is set.
pub async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::into_chat_response;
    use crate::error::ChatApiError;
    use crate::events::ChatResponseBody;

    #[test]
    fn chat_response_prefers_backend_error() {
        let body = ChatResponseBody {
            response: Some("ignored".to_string()),
            error: Some("model unavailable".to_string()),
            ..ChatResponseBody::default()
        };

        let error = into_chat_response(body).expect_err("error field must win");
        assert_eq!(error.backend_message(), Some("model unavailable"));
    }

    #[test]
    fn chat_response_without_reply_is_empty_response() {
        let error = into_chat_response(ChatResponseBody::default()).expect_err("missing reply");
        assert!(matches!(error, ChatApiError::EmptyResponse));
    }

    #[test]
    fn chat_response_keeps_echoed_conversation_id() {
        let body = ChatResponseBody {
            response: Some("4".to_string()),
            tokens_used: Some(1),
            conversation_id: Some("conv-1".to_string()),
            ..ChatResponseBody::default()
        };

        let response = into_chat_response(body).expect("reply");
        assert_eq!(response.content, "4");
        assert_eq!(response.tokens_used, Some(1));
        assert_eq!(response.conversation_id.as_deref(), Some("conv-1"));
    }
}
