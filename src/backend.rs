use async_trait::async_trait;
use chat_api::{
    Attachment, CancellationSignal, ChatApiClient, ChatApiError, ChatResponse, EventStream,
    HealthStatus,
};

/// Backend operations the conversation controller depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, ChatApiError>;

    async fn create_conversation(&self) -> Result<String, ChatApiError>;

    async fn send_message(
        &self,
        conversation_id: &str,
        message: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError>;

    async fn send_attachment(
        &self,
        conversation_id: &str,
        attachment: &Attachment,
        message: Option<&str>,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError>;

    async fn open_stream(
        &self,
        conversation_id: &str,
        message: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<EventStream, ChatApiError>;
}

#[async_trait]
impl ChatBackend for ChatApiClient {
    async fn health(&self) -> Result<HealthStatus, ChatApiError> {
        ChatApiClient::health(self, None).await
    }

    async fn create_conversation(&self) -> Result<String, ChatApiError> {
        ChatApiClient::create_conversation(self, None).await
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        message: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError> {
        ChatApiClient::send_message(self, conversation_id, message, cancellation).await
    }

    async fn send_attachment(
        &self,
        conversation_id: &str,
        attachment: &Attachment,
        message: Option<&str>,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ChatResponse, ChatApiError> {
        ChatApiClient::send_attachment(self, conversation_id, attachment, message, cancellation)
            .await
    }

    async fn open_stream(
        &self,
        conversation_id: &str,
        message: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<EventStream, ChatApiError> {
        ChatApiClient::open_stream(self, conversation_id, message, cancellation).await
    }
}
