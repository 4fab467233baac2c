//! End-to-end chat between real clients and a real server

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use parley_client::{ChatPeer, PeerState};
use parley_protocol::messages::status;
use parley_protocol::{ChannelObserver, ChatEvent, SharedObserver};
use parley_server::{BroadcastServer, ServerConfig, ServerState};

const WAIT: Duration = Duration::from_secs(5);

fn local_config() -> ServerConfig {
    config_with_buffer(1024)
}

fn config_with_buffer(buffer_size: usize) -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1".parse().unwrap(),
        port: 0,
        buffer_size,
    }
}

/// Server plus two connected clients, all using `buffer_size`
async fn alice_and_bob(
    buffer_size: usize,
) -> (
    BroadcastServer,
    UnboundedReceiver<ChatEvent>,
    (ChatPeer, UnboundedReceiver<ChatEvent>),
    (ChatPeer, UnboundedReceiver<ChatEvent>),
) {
    let (server, mut server_events) = observed(BroadcastServer::new);
    let addr = server.listen(&config_with_buffer(buffer_size)).await.unwrap();

    let (alice, mut alice_events) = observed(ChatPeer::new);
    alice
        .connect("127.0.0.1", addr.port(), "Alice", buffer_size)
        .await
        .unwrap();
    expect_line(&mut server_events, "Alice joined the chat!").await;

    let (bob, bob_events) = observed(ChatPeer::new);
    bob.connect("127.0.0.1", addr.port(), "Bob", buffer_size)
        .await
        .unwrap();
    expect_line(&mut alice_events, "Bob joined the chat!").await;

    (server, server_events, (alice, alice_events), (bob, bob_events))
}

fn observed<T>(make: impl FnOnce(SharedObserver) -> T) -> (T, UnboundedReceiver<ChatEvent>) {
    let (observer, events) = ChannelObserver::new();
    let observer: SharedObserver = Arc::new(observer);
    (make(observer), events)
}

async fn expect_line(events: &mut UnboundedReceiver<ChatEvent>, line: &str) {
    let expected = ChatEvent::Line(line.to_string());
    loop {
        match tokio::time::timeout(WAIT, events.recv()).await {
            Ok(Some(event)) if event == expected => return,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("observer channel closed waiting for {:?}", line),
            Err(_) => panic!("timed out waiting for {:?}", line),
        }
    }
}

#[tokio::test]
async fn test_alice_and_bob() {
    let (server, mut server_events) = observed(BroadcastServer::new);
    let addr = server.listen(&local_config()).await.unwrap();

    let (alice, mut alice_events) = observed(ChatPeer::new);
    alice
        .connect("127.0.0.1", addr.port(), "Alice", 1024)
        .await
        .unwrap();
    expect_line(&mut server_events, "Alice joined the chat!").await;

    let (bob, mut bob_events) = observed(ChatPeer::new);
    bob.connect("127.0.0.1", addr.port(), "Bob", 1024)
        .await
        .unwrap();
    expect_line(&mut alice_events, "Bob joined the chat!").await;

    alice.send("hi").await.unwrap();
    expect_line(&mut alice_events, "You: hi").await;
    expect_line(&mut bob_events, "Alice: hi").await;
    expect_line(&mut server_events, "Alice: hi").await;

    bob.send("exit").await.unwrap();
    assert_eq!(bob.state(), PeerState::Disconnected);
    expect_line(&mut alice_events, "Bob left the chat!").await;
    assert_eq!(server.peer_count().await, 1);
}

#[tokio::test]
async fn test_server_shutdown_disconnects_everyone() {
    let (server, mut server_events) = observed(BroadcastServer::new);
    let addr = server.listen(&local_config()).await.unwrap();

    let mut peers = Vec::new();
    for name in ["Alice", "Bob", "Carol"] {
        let (peer, events) = observed(ChatPeer::new);
        peer.connect("127.0.0.1", addr.port(), name, 1024)
            .await
            .unwrap();
        expect_line(&mut server_events, &format!("{} joined the chat!", name)).await;
        peers.push((peer, events));
    }

    server.stop_listening().await.unwrap();

    // Every client acknowledges, so the drain completes on its own
    tokio::time::timeout(WAIT, server.wait_closed())
        .await
        .expect("server did not close after all clients left");
    assert_eq!(server.state(), ServerState::Closed);
    assert_eq!(server.peer_count().await, 0);
    expect_line(&mut server_events, status::SERVER_STOPPED).await;

    for (peer, events) in peers.iter_mut() {
        tokio::time::timeout(WAIT, peer.wait_disconnected()).await.unwrap();
        expect_line(events, status::SERVER_CLOSED).await;
        expect_line(events, status::DISCONNECTED).await;
    }
}

#[tokio::test]
async fn test_server_message_reaches_clients() {
    let (server, mut server_events) = observed(BroadcastServer::new);
    let addr = server.listen(&local_config()).await.unwrap();

    let (alice, mut alice_events) = observed(ChatPeer::new);
    alice
        .connect("127.0.0.1", addr.port(), "Alice", 1024)
        .await
        .unwrap();
    expect_line(&mut server_events, "Alice joined the chat!").await;

    server.send_to_all("welcome").await.unwrap();
    expect_line(&mut alice_events, "Server: welcome").await;
    expect_line(&mut server_events, "You: welcome").await;
}

#[tokio::test]
async fn test_message_of_buffer_size_keeps_everyone_connected() {
    let (server, mut server_events, (alice, mut alice_events), (bob, mut bob_events)) =
        alice_and_bob(1024).await;

    let text = "x".repeat(1024);
    alice.send(&text).await.unwrap();
    expect_line(&mut bob_events, &format!("Alice: {}", text)).await;
    expect_line(&mut server_events, &format!("Alice: {}", text)).await;

    server.send_to_all(&text).await.unwrap();
    expect_line(&mut alice_events, &format!("Server: {}", text)).await;
    expect_line(&mut bob_events, &format!("Server: {}", text)).await;

    // Still chatting afterwards
    bob.send("still here").await.unwrap();
    expect_line(&mut alice_events, "Bob: still here").await;
    assert_eq!(alice.state(), PeerState::Connected);
    assert_eq!(bob.state(), PeerState::Connected);
    assert_eq!(server.peer_count().await, 2);
}

#[tokio::test]
async fn test_line_longer_than_buffer_is_relayed_whole() {
    let (server, mut server_events, (alice, _alice_events), (bob, mut bob_events)) =
        alice_and_bob(16).await;

    let text = "long line ".repeat(30);
    alice.send(&text).await.unwrap();
    expect_line(&mut bob_events, &format!("Alice: {}", text)).await;
    expect_line(&mut server_events, &format!("Alice: {}", text)).await;

    bob.send("got it").await.unwrap();
    expect_line(&mut server_events, "Bob: got it").await;
    assert_eq!(alice.state(), PeerState::Connected);
    assert_eq!(bob.state(), PeerState::Connected);
    assert_eq!(server.peer_count().await, 2);
}
