use std::sync::{Arc, Mutex};

use chat_api::{ChatApiClient, ChatApiConfig};
use conversation_store::{ConversationStore, FileStorage, Role};
use gene_chat::{ConversationController, SessionPhase};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct Reply {
    content_type: &'static str,
    body: String,
}

fn json(body: &str) -> Reply {
    Reply {
        content_type: "application/json",
        body: body.to_string(),
    }
}

fn sse(frames: &[&str]) -> Reply {
    Reply {
        content_type: "text/event-stream",
        body: frames
            .iter()
            .map(|frame| format!("data: {frame}\n\n"))
            .collect(),
    }
}

/// Answers each incoming connection with the next scripted reply.
struct Backend {
    base_url: String,
    request_lines: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl Backend {
    async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        let request_lines = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn({
            let request_lines = Arc::clone(&request_lines);
            async move {
                for reply in replies {
                    let Ok((socket, _)) = listener.accept().await else {
                        break;
                    };
                    serve(socket, reply, &request_lines).await;
                }
            }
        });

        Self {
            base_url,
            request_lines,
            handle,
        }
    }

    fn client(&self) -> ChatApiClient {
        ChatApiClient::new(ChatApiConfig::new(&self.base_url)).expect("client")
    }

    fn request_lines(&self) -> Vec<String> {
        self.request_lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, reply: Reply, request_lines: &Mutex<Vec<String>>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(index) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break index + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < head_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    }

    if let (Some(line), Ok(mut lines)) = (head.lines().next(), request_lines.lock()) {
        lines.push(line.to_string());
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        reply.content_type,
        reply.body.len(),
        reply.body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

#[tokio::test]
async fn scenario_c_unparseable_frame_causes_no_visible_change() {
    let backend = Backend::start(vec![
        json(r#"{"conversation_id":"conv-1"}"#),
        sse(&[r#"{"token":"Result: 4"}"#, "{not json", r#"{"done":true}"#]),
    ])
    .await;
    let store_dir = tempfile::tempdir().expect("tempdir should be created");
    let store = ConversationStore::open(Arc::new(FileStorage::new(store_dir.path())));

    let mut controller = ConversationController::new(Arc::new(backend.client()), store);
    controller.send_message("2+2?", None).await.expect("send");
    controller.run_until_idle().await;

    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Result: 4");
    assert_eq!(messages[1].tokens, None);
    assert_eq!(controller.phase(), SessionPhase::Completed);

    assert_eq!(
        backend.request_lines(),
        vec![
            "POST /api/chat/new HTTP/1.1".to_string(),
            "GET /api/chat/conv-1/stream?message=2%2B2%3F HTTP/1.1".to_string(),
        ]
    );

    let reopened = ConversationStore::open(Arc::new(FileStorage::new(store_dir.path())));
    assert_eq!(
        reopened.last_conversation().expect("persisted").messages,
        controller.messages()
    );
}

#[tokio::test]
async fn scenario_a_over_http_with_thinking_and_token_count() {
    let backend = Backend::start(vec![
        json(r#"{"conversation_id":"conv-1"}"#),
        sse(&[
            r#"{"token":"Hi"}"#,
            r#"{"token":" there"}"#,
            r#"{"done":true,"tokens_used":2,"thinking":"greet back"}"#,
        ]),
    ])
    .await;
    let store_dir = tempfile::tempdir().expect("tempdir should be created");
    let store = ConversationStore::open(Arc::new(FileStorage::new(store_dir.path())));

    let mut controller = ConversationController::new(Arc::new(backend.client()), store);
    controller.send_message("hello", None).await.expect("send");
    controller.run_until_idle().await;

    let reply = &controller.messages()[1];
    assert_eq!(reply.content, "Hi there");
    assert_eq!(reply.tokens, Some(2));
    assert_eq!(reply.thinking.as_deref(), Some("greet back"));
}

#[tokio::test]
async fn unreachable_backend_blocks_send_with_creation_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let store = ConversationStore::open(Arc::new(conversation_store::MemoryStorage::new()));
    let client = ChatApiClient::new(ChatApiConfig::new(base_url)).expect("client");
    let mut controller = ConversationController::new(Arc::new(client), store);

    assert_eq!(controller.check_health().await.label(), "Disconnected");
    assert!(controller.send_message("hello", None).await.is_err());
    assert!(controller.messages().is_empty());
}
