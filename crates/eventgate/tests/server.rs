//! Integration tests for the Eventgate server: real WebSocket clients,
//! events fed through an in-process source.

use std::time::Duration;

use eventgate::prelude::*;
use eventgate_ingest::events::{PostEvent, Typing};
use eventgate_ingest::{Post, User};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// =========================================================================
// Helpers
// =========================================================================

struct TestServer {
    addr: std::net::SocketAddr,
    events: mpsc::Sender<Vec<u8>>,
    hub: Hub<WebSocketConnection>,
}

async fn start_server() -> TestServer {
    let (events, source) = ChannelSource::new(16);
    let server = EventgateServer::builder()
        .bind("127.0.0.1:0")
        .build(source)
        .await
        .expect("server should bind");
    let addr = server.local_addr().expect("local addr");
    let hub = server.hub().clone();
    tokio::spawn(server.run());
    TestServer { addr, events, hub }
}

async fn connect(server: &TestServer, query: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/?{query}", server.addr))
        .await
        .expect("client should connect");
    ws
}

async fn next_message(ws: &mut ClientWs) -> Message {
    tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("websocket error")
}

async fn next_json(ws: &mut ClientWs) -> Value {
    match next_message(ws).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("json frame"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

fn alice() -> User {
    User {
        id: 5,
        username: "alice".into(),
        ..User::deleted()
    }
}

fn typing(chat_id: i64) -> Vec<u8> {
    DomainEvent::Typing(Typing {
        chat_id,
        user: alice(),
    })
    .encode()
    .unwrap()
}

fn post(id: i64, chat_id: i64) -> Vec<u8> {
    DomainEvent::CreatePost(PostEvent {
        post: Post {
            id,
            chat_id,
            author_id: Some(5),
            reply_to_ids: None,
            content: Some("hello".into()),
            emoji_ids: None,
            sticker_ids: None,
            attachment_ids: None,
            reactions: None,
            last_edited: None,
            pinned: None,
        },
        reply_to: Default::default(),
        users: [(5, Some(alice()))].into_iter().collect(),
        emotes: Default::default(),
        attachments: Default::default(),
    })
    .encode()
    .unwrap()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_connect_receives_hello() {
    let server = start_server().await;
    let mut ws = connect(&server, "").await;

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["cmd"], "hello");
    assert_eq!(hello["val"]["ping_interval"], 45_000);
    let sid: i64 = hello["val"]["session_id"].as_str().unwrap().parse().unwrap();
    assert!(server.hub.get(Snowflake(sid)).await.is_some());
}

#[tokio::test]
async fn test_drop_then_resume_replays_missed_packets() {
    let server = start_server().await;
    let mut ws = connect(&server, "v=0").await;
    let hello = next_json(&mut ws).await;
    let sid = hello["val"]["session_id"].as_str().unwrap().to_owned();

    server.events.send(typing(1)).await.unwrap();
    let live = next_json(&mut ws).await;
    assert_eq!(live["nonce"], "0");
    assert_eq!(live["val"]["chatid"], "livechat");

    drop(ws);
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.events.send(post(1234, 0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = connect(&server, &format!("sid={sid}&nonce=0")).await;
    let hello = next_json(&mut ws).await;
    assert_eq!(hello["val"]["session_id"], sid.as_str());

    let replayed = next_json(&mut ws).await;
    assert_eq!(replayed["nonce"], "1");
    assert_eq!(replayed["val"]["post_origin"], "home");
    assert_eq!(replayed["val"]["p"], "hello");

    // Nothing older than the resume point comes back.
    let extra = tokio::time::timeout(Duration::from_millis(100), ws.next()).await;
    assert!(extra.is_err(), "unexpected frame: {extra:?}");
    assert_eq!(server.hub.len().await, 1);
}

#[tokio::test]
async fn test_current_version_clients_get_current_shape() {
    let server = start_server().await;
    let mut legacy = connect(&server, "v=0").await;
    let mut current = connect(&server, "v=1&format=json").await;
    next_json(&mut legacy).await;
    next_json(&mut current).await;

    server.events.send(typing(42)).await.unwrap();

    let legacy_frame = next_json(&mut legacy).await;
    assert_eq!(legacy_frame["cmd"], "direct");
    assert_eq!(legacy_frame["val"]["chatid"], "42");

    let current_frame = next_json(&mut current).await;
    assert_eq!(current_frame["cmd"], "typing");
    assert_eq!(current_frame["val"]["chat_id"], "42");
    assert_eq!(current_frame["nonce"], legacy_frame["nonce"]);
}

#[tokio::test]
async fn test_legacy_msgpack_frames_are_binary() {
    let server = start_server().await;
    let mut ws = connect(&server, "v=0&format=msgpack").await;

    assert!(matches!(next_message(&mut ws).await, Message::Binary(_)));
}

#[tokio::test]
async fn test_unknown_session_closed_with_4004() {
    let server = start_server().await;
    let mut ws = connect(&server, "sid=123456&nonce=0").await;

    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::from(4004)),
        other => panic!("expected close, got {other:?}"),
    }
    assert!(server.hub.is_empty().await);
}

#[tokio::test]
async fn test_current_msgpack_rejected_with_bad_request() {
    let server = start_server().await;
    let mut ws = connect(&server, "v=1&format=msgpack").await;

    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("expected close, got {other:?}"),
    }
    assert!(server.hub.is_empty().await);
}

#[tokio::test]
async fn test_idle_socket_does_not_block_other_clients() {
    let server = start_server().await;
    let _idle = tokio::net::TcpStream::connect(server.addr)
        .await
        .expect("tcp connect");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (mut ws, _) = tokio::time::timeout(
        Duration::from_secs(3),
        tokio_tungstenite::connect_async(format!("ws://{}/", server.addr)),
    )
    .await
    .expect("connect blocked behind an idle socket")
    .expect("client should connect");

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["cmd"], "hello");
}

#[tokio::test]
async fn test_resumed_session_supersedes_old_connection() {
    let server = start_server().await;
    let mut first = connect(&server, "").await;
    let hello = next_json(&mut first).await;
    let sid = hello["val"]["session_id"].as_str().unwrap().to_owned();

    let mut second = connect(&server, &format!("sid={sid}&nonce=0")).await;
    next_json(&mut second).await;

    match next_message(&mut first).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::from(4000)),
        other => panic!("expected close, got {other:?}"),
    }
}
