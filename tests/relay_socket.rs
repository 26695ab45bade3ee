//! The `/ws` relay over a real listener and WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use lefte_portal::AppState;
use lefte_portal::config::AppConfig;
use lefte_portal::llm::{EventStream, LlmDriver, LlmRequest, Orchestrator};
use lefte_portal::normalized::NormalizedEvent;
use lefte_portal::relay::socket::MAX_FRAME_BYTES;
use lefte_portal::server::build_router;
use lefte_portal::storage::ChatStore;
use lefte_portal::tools::ToolRegistry;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Replies `了解` unless the conversation mentions `FAIL`.
struct Picky;

#[async_trait]
impl LlmDriver for Picky {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
        if Value::Array(req.messages).to_string().contains("FAIL") {
            anyhow::bail!("model unavailable");
        }
        let events = vec![
            Ok(NormalizedEvent::MessageDelta {
                text: "了解".to_string(),
            }),
            Ok(NormalizedEvent::Done),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

struct Relay {
    addr: SocketAddr,
    state: AppState,
    _media: tempfile::TempDir,
}

async fn start_relay() -> Relay {
    let media = tempfile::tempdir().unwrap();
    let mut config = AppConfig::defaults().unwrap();
    config.storage.media_root = media.path().to_path_buf();
    config.storage.voice_dir = media.path().join("wav_files");
    config.assistant.personality_file = media.path().join("personality.txt");

    let store = ChatStore::in_memory().await.unwrap();
    let orchestrator = Orchestrator::with_driver(Arc::new(Picky), Arc::new(ToolRegistry::new()));
    let state = AppState::new(Arc::new(config), store, orchestrator, None);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    Relay {
        addr,
        state,
        _media: media,
    }
}

impl Relay {
    /// Open `count` sockets and wait until the hub has seen all of them.
    async fn connect(&self, count: usize) -> Vec<Client> {
        let mut clients = Vec::with_capacity(count);
        for _ in 0..count {
            let (ws, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
            clients.push(ws);
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.state.relay.connections() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sockets registered");
        // Subscription follows registration
        tokio::time::sleep(Duration::from_millis(50)).await;
        clients
    }
}

fn chat_request(message: &str) -> Message {
    Message::Text(
        json!({"event": "chat_request", "data": {"message": message}})
            .to_string()
            .into(),
    )
}

/// Next JSON event, skipping control frames.
async fn next_event(ws: &mut Client) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await.expect("socket open").expect("frame") {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                _ => continue,
            }
        }
    })
    .await
    .expect("event within timeout")
}

/// Events up to and including the first one named `name`.
async fn events_until(ws: &mut Client, name: &str) -> Vec<Value> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(ws).await;
        let done = event["event"] == name;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_chat_request_frame_broadcasts_update() {
    let relay = start_relay().await;
    let mut ws = relay.connect(1).await.remove(0);

    ws.send(chat_request("おはよう")).await.unwrap();
    let events = events_until(&mut ws, "chat_update").await;

    assert_eq!(events[0], json!({"event": "ai_thinking", "data": {"active": true}}));
    let update = &events.last().unwrap()["data"];
    assert_eq!(update["user_message"], "おはよう");
    assert_eq!(update["response"], "了解");
    assert_eq!(update["voice_url"], Value::Null);

    let history = relay.state.store.today_history().await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_invalid_frames_are_ignored() {
    let relay = start_relay().await;
    let mut ws = relay.connect(1).await.remove(0);

    ws.send(Message::Text("not json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"event":"dance","data":{}}"#.into()))
        .await
        .unwrap();
    ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();

    // Still open and still serving requests
    ws.send(chat_request("まだ繋がってる？")).await.unwrap();
    let events = events_until(&mut ws, "chat_update").await;
    assert!(events.iter().all(|e| e["event"] != "error_message"));
    assert_eq!(events.last().unwrap()["data"]["user_message"], "まだ繋がってる？");
}

#[tokio::test]
async fn test_oversized_frame_gets_error_reply() {
    let relay = start_relay().await;
    let mut ws = relay.connect(1).await.remove(0);

    let huge = "x".repeat(MAX_FRAME_BYTES + 1);
    ws.send(Message::Text(huge.into())).await.unwrap();

    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "error_message");
    assert!(event["data"]["response"].as_str().unwrap().starts_with("エラー："));

    // Nothing reached the pipeline
    assert!(relay.state.store.today_history().await.unwrap().is_empty());

    ws.send(chat_request("小さいほう")).await.unwrap();
    let events = events_until(&mut ws, "chat_update").await;
    assert_eq!(events.last().unwrap()["data"]["response"], "了解");
}

#[tokio::test]
async fn test_errors_go_to_requester_and_updates_to_everyone() {
    let relay = start_relay().await;
    let mut clients = relay.connect(2).await;
    let mut other = clients.pop().unwrap();
    let mut requester = clients.pop().unwrap();

    requester.send(chat_request("FAIL please")).await.unwrap();
    let events = events_until(&mut requester, "error_message").await;
    assert!(
        events.last().unwrap()["data"]["response"]
            .as_str()
            .unwrap()
            .contains("model unavailable")
    );

    // The other tab sees the thinking state clear, then its own turn, but
    // never the failure text.
    other.send(chat_request("こんにちは")).await.unwrap();
    let seen = events_until(&mut other, "chat_update").await;
    assert!(seen.iter().all(|e| e["event"] != "error_message"));
    assert!(seen.contains(&json!({"event": "ai_thinking", "data": {"active": false}})));

    // The update for the other tab's turn reaches the requester too
    let update = events_until(&mut requester, "chat_update").await;
    assert_eq!(update.last().unwrap()["data"]["user_message"], "こんにちは");
}
