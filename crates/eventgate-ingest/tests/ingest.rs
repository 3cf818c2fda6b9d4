//! Ingestion end to end: raw pub/sub messages into session history.

use std::collections::HashMap;
use std::time::Duration;

use eventgate_ingest::events::{DeletePost, PostEvent, Typing, UpdateUser};
use eventgate_ingest::{ChannelSource, DomainEvent, IngestError, Ingestor, Opcode, Post, User};
use eventgate_session::{Hub, SessionConfig};
use eventgate_snowflake::SnowflakeGenerator;
use eventgate_transport::WebSocketConnection;

fn hub() -> Hub<WebSocketConnection> {
    Hub::new(SessionConfig::default(), SnowflakeGenerator::new(0).unwrap())
}

fn user(id: i64, name: &str) -> User {
    User {
        id,
        username: name.into(),
        ..User::deleted()
    }
}

fn typing(chat_id: i64) -> Vec<u8> {
    DomainEvent::Typing(Typing {
        chat_id,
        user: user(5, "alice"),
    })
    .encode()
    .unwrap()
}

async fn wait_for_history(hub: &Hub<WebSocketConnection>, want: &[i64]) -> Vec<i64> {
    let id = hub.session_ids().await[0];
    let session = hub.get(id).await.unwrap();
    for _ in 0..200 {
        let history = session.snapshot().await.history;
        if history == want {
            return history;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    session.snapshot().await.history
}

#[tokio::test]
async fn test_handle_publishes_with_increasing_nonces() {
    let hub = hub();
    hub.connect(None).await.unwrap();
    let ingestor = Ingestor::new(hub.clone());

    assert_eq!(ingestor.handle(&typing(1)).await.unwrap(), Some(0));
    let delete = DomainEvent::DeletePost(DeletePost {
        chat_id: 42,
        post_id: 9,
    });
    assert_eq!(ingestor.handle(&delete.encode().unwrap()).await.unwrap(), Some(1));

    assert_eq!(wait_for_history(&hub, &[0, 1]).await, vec![0, 1]);
}

#[tokio::test]
async fn test_handle_skips_unbroadcast_opcode_without_spending_nonce() {
    let hub = hub();
    let ingestor = Ingestor::new(hub.clone());

    let mut raw = vec![Opcode::RevokeSession as u8];
    raw.extend(typing(1).into_iter().skip(1));
    assert_eq!(ingestor.handle(&raw).await.unwrap(), None);
    assert_eq!(hub.next_nonce(), 0);
}

#[tokio::test]
async fn test_handle_rejects_poison_messages() {
    let ingestor = Ingestor::new(hub());

    assert!(matches!(ingestor.handle(&[]).await, Err(IngestError::Empty)));
    assert!(matches!(
        ingestor.handle(&[200, 0x80]).await,
        Err(IngestError::UnknownOpcode(200))
    ));
    assert!(matches!(
        ingestor.handle(&[Opcode::CreatePost as u8, 0xc1]).await,
        Err(IngestError::Decode { opcode: Opcode::CreatePost, .. })
    ));
}

#[tokio::test]
async fn test_run_skips_bad_messages_and_stops_when_exhausted() {
    let hub = hub();
    hub.connect(None).await.unwrap();
    let (tx, source) = ChannelSource::new(16);

    let post = DomainEvent::CreatePost(PostEvent {
        post: Post {
            id: 1234,
            chat_id: 0,
            author_id: Some(5),
            reply_to_ids: None,
            content: Some("hi".into()),
            emoji_ids: None,
            sticker_ids: None,
            attachment_ids: None,
            reactions: None,
            last_edited: None,
            pinned: None,
        },
        reply_to: HashMap::new(),
        users: HashMap::from([(5, Some(user(5, "alice")))]),
        emotes: HashMap::new(),
        attachments: HashMap::new(),
    });
    let profile = DomainEvent::UpdateUser(UpdateUser {
        user: user(5, "alice"),
    });

    tx.send(typing(0)).await.unwrap();
    tx.send(Vec::new()).await.unwrap();
    tx.send(vec![99]).await.unwrap();
    tx.send(vec![Opcode::Typing as u8, 0x01]).await.unwrap();
    tx.send(post.encode().unwrap()).await.unwrap();
    tx.send(profile.encode().unwrap()).await.unwrap();
    drop(tx);

    Ingestor::new(hub.clone()).run(source).await.unwrap();

    assert_eq!(wait_for_history(&hub, &[0, 1, 2]).await, vec![0, 1, 2]);
    assert_eq!(hub.next_nonce(), 3);
}
