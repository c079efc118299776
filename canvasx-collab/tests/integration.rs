//! Integration tests for end-to-end canvas replication.
//!
//! These tests start a real relay and connect real WebSocket clients,
//! verifying the full sync pipeline.

use std::sync::Arc;

use canvasx_collab::client::{ConnectionState, SyncClient, SyncEvent};
use canvasx_collab::controller::ControllerConfig;
use canvasx_collab::hub::HubHandle;
use canvasx_collab::server::{RelayServer, ServerConfig};
use canvasx_core::{MemoryScene, SceneEditor};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a relay on a free port; return its URL and hub.
async fn start_test_server() -> (String, HubHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = RelayServer::new(ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        mailbox_capacity: 256,
    });
    let hub = server.hub().clone();
    tokio::spawn(async move {
        server.serve(listener).await;
    });
    (format!("ws://127.0.0.1:{port}"), hub)
}

async fn wait_for_sessions(hub: &HubHandle, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while hub.stats().await.unwrap().sessions != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("hub never reached {expected} sessions"));
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn open(url: &str) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, value: Value) {
    socket
        .send(Message::text(value.to_string()))
        .await
        .unwrap();
}

/// Next text frame as JSON, or None if nothing arrives within `wait`.
async fn next_event(socket: &mut Socket, wait: Duration) -> Option<Value> {
    loop {
        match timeout(wait, socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

const QUIET: Duration = Duration::from_millis(200);
const PATIENT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_server_accepts_connections() {
    let (url, hub) = start_test_server().await;
    let _socket = open(&url).await;
    wait_for_sessions(&hub, 1).await;
}

#[tokio::test]
async fn test_two_sessions_update_then_clear() {
    let (url, hub) = start_test_server().await;
    let mut a = open(&url).await;
    let mut b = open(&url).await;
    wait_for_sessions(&hub, 2).await;

    let payload = json!({ "elements": [{ "id": "t1", "text": "hi" }] });
    send(&mut a, json!({ "event": "canvas-update", "data": payload })).await;

    let received = next_event(&mut b, PATIENT).await.unwrap();
    assert_eq!(received, json!({ "event": "canvas-update", "data": payload }));
    assert!(next_event(&mut b, QUIET).await.is_none(), "B got a second event");
    assert!(next_event(&mut a, QUIET).await.is_none(), "update echoed to sender");

    send(&mut a, json!({ "event": "canvas-clear" })).await;
    assert_eq!(
        next_event(&mut a, PATIENT).await.unwrap(),
        json!({ "event": "canvas-clear" })
    );
    assert_eq!(
        next_event(&mut b, PATIENT).await.unwrap(),
        json!({ "event": "canvas-clear" })
    );
    assert_eq!(hub.snapshot().await.unwrap(), None);

    let mut c = open(&url).await;
    wait_for_sessions(&hub, 3).await;
    assert!(next_event(&mut c, QUIET).await.is_none(), "C got state after clear");
}

#[tokio::test]
async fn test_late_joiner_receives_latest_snapshot_once() {
    let (url, hub) = start_test_server().await;
    let mut a = open(&url).await;
    wait_for_sessions(&hub, 1).await;

    for text in ["first", "second", "third"] {
        send(
            &mut a,
            json!({ "event": "canvas-update", "data": { "elements": [{ "id": "t", "text": text }] } }),
        )
        .await;
    }
    timeout(PATIENT, async {
        while hub.stats().await.unwrap().updates < 3 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let mut late = open(&url).await;
    let first = next_event(&mut late, PATIENT).await.unwrap();
    assert_eq!(first["event"], "canvas-update");
    assert_eq!(first["data"]["elements"][0]["text"], "third");
    assert!(next_event(&mut late, QUIET).await.is_none());
}

#[tokio::test]
async fn test_updates_arrive_in_send_order() {
    let (url, hub) = start_test_server().await;
    let mut a = open(&url).await;
    let mut b = open(&url).await;
    wait_for_sessions(&hub, 2).await;

    for i in 0..50 {
        send(&mut a, json!({ "event": "canvas-update", "data": { "seq": i } })).await;
    }
    for i in 0..50 {
        let event = next_event(&mut b, PATIENT).await.unwrap();
        assert_eq!(event["data"]["seq"], i);
    }
}

#[tokio::test]
async fn test_malformed_frames_do_not_drop_connection() {
    let (url, hub) = start_test_server().await;
    let mut a = open(&url).await;
    let mut b = open(&url).await;
    wait_for_sessions(&hub, 2).await;

    a.send(Message::text("{{ not json")).await.unwrap();
    send(&mut a, json!({ "event": "canvas-teleport" })).await;
    // Structurally wrong scene, still relayed as-is.
    send(&mut a, json!({ "event": "canvas-update", "data": [null, 7] })).await;

    let event = next_event(&mut b, PATIENT).await.unwrap();
    assert_eq!(event["data"], json!([null, 7]));
    assert_eq!(hub.stats().await.unwrap().sessions, 2);
}

#[tokio::test]
async fn test_disconnect_deregisters_session() {
    let (url, hub) = start_test_server().await;
    let a = open(&url).await;
    let _b = open(&url).await;
    wait_for_sessions(&hub, 2).await;

    drop(a);
    wait_for_sessions(&hub, 1).await;
}

async fn sync_client(url: &str) -> (SyncClient<MemoryScene>, tokio::sync::mpsc::Receiver<SyncEvent>) {
    let mut client = SyncClient::new(url, Arc::new(MemoryScene::new()), ControllerConfig::default());
    let events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    (client, events)
}

fn drain(events: &mut tokio::sync::mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_clients_replicate_without_echo() {
    let (url, hub) = start_test_server().await;
    let (alice, mut alice_events) = sync_client(&url).await;
    let (bob, _bob_events) = sync_client(&url).await;
    wait_for_sessions(&hub, 2).await;
    assert_eq!(alice.connection_state().await, ConnectionState::Connected);

    let id = alice.editor().add_text_box(100.0, 100.0);

    wait_for(|| bob.editor().element(&id).is_some()).await;
    bob.controller().flush().await;
    sleep(QUIET).await;

    // Bob's apply fired change events, none of which went back out.
    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.updates, 1);
    assert_eq!(bob.controller().stats().updates_sent, 0);
    assert!(bob.controller().stats().echoes_suppressed >= 1);
    assert!(!drain(&mut alice_events)
        .iter()
        .any(|e| matches!(e, SyncEvent::RemoteUpdate(_))));
    assert_eq!(alice.editor().scene(), bob.editor().scene());
}

#[tokio::test]
async fn test_accepted_suggestion_reaches_peer_once() {
    let (url, hub) = start_test_server().await;
    let (alice, _alice_events) = sync_client(&url).await;
    let (bob, _bob_events) = sync_client(&url).await;
    wait_for_sessions(&hub, 2).await;

    let id = alice.editor().add_text_box(0.0, 0.0);
    wait_for(|| bob.editor().element(&id).is_some()).await;

    alice
        .controller()
        .accept_suggestion(&id, "Think bigger.")
        .unwrap();

    wait_for(|| {
        bob.editor()
            .element(&id)
            .and_then(|e| e.text)
            .as_deref()
            == Some("Think bigger.")
    })
    .await;
    bob.controller().flush().await;
    sleep(QUIET).await;

    assert_eq!(hub.stats().await.unwrap().updates, 2);
}

#[tokio::test]
async fn test_request_clear_blanks_everyone() {
    let (url, hub) = start_test_server().await;
    let (alice, mut alice_events) = sync_client(&url).await;
    let (bob, mut bob_events) = sync_client(&url).await;
    wait_for_sessions(&hub, 2).await;

    let id = alice.editor().add_text_box(0.0, 0.0);
    wait_for(|| bob.editor().element(&id).is_some()).await;
    bob.controller().flush().await;

    alice.request_clear();
    assert!(alice.editor().is_blank());

    wait_for(|| bob.editor().is_blank()).await;
    sleep(QUIET).await;

    assert!(drain(&mut bob_events)
        .iter()
        .any(|e| matches!(e, SyncEvent::RemoteClear)));
    // The originator hears its own clear back.
    assert!(drain(&mut alice_events)
        .iter()
        .any(|e| matches!(e, SyncEvent::RemoteClear)));
    assert!(alice.editor().is_blank());
    assert_eq!(hub.snapshot().await.unwrap(), None);
}

#[tokio::test]
async fn test_client_joining_late_catches_up() {
    let (url, hub) = start_test_server().await;
    let (alice, _alice_events) = sync_client(&url).await;
    wait_for_sessions(&hub, 1).await;

    alice.editor().add_text_box(1.0, 2.0);
    alice.editor().add_text_box(3.0, 4.0);
    timeout(PATIENT, async {
        while hub.stats().await.unwrap().updates < 2 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let (carol, _carol_events) = sync_client(&url).await;
    wait_for(|| carol.editor().elements().len() == 2).await;
    carol.controller().flush().await;
    assert_eq!(carol.editor().scene(), alice.editor().scene());
    assert_eq!(carol.controller().stats().updates_sent, 0);
}

#[tokio::test]
async fn test_client_disconnect() {
    let (url, hub) = start_test_server().await;
    let (mut alice, _events) = sync_client(&url).await;
    wait_for_sessions(&hub, 1).await;

    alice.disconnect().await;
    assert_eq!(alice.connection_state().await, ConnectionState::Disconnected);
    wait_for_sessions(&hub, 0).await;

    // Edits after disconnect stay local.
    alice.editor().add_text_box(0.0, 0.0);
    sleep(QUIET).await;
    assert_eq!(hub.stats().await.unwrap().updates, 0);
    assert_eq!(alice.editor().snapshot().unwrap().element_count(), Some(1));
}

#[tokio::test]
async fn test_relay_survives_aborted_connections() {
    let (url, hub) = start_test_server().await;
    let mut a = open(&url).await;
    wait_for_sessions(&hub, 1).await;
    send(
        &mut a,
        json!({ "event": "canvas-update", "data": { "elements": [{ "id": "t", "text": "kept" }] } }),
    )
    .await;

    // Bare TCP peers that hang up before the handshake.
    let addr = url.trim_start_matches("ws://").to_string();
    for _ in 0..20 {
        let stream = TcpStream::connect(&addr).await.unwrap();
        drop(stream);
    }
    sleep(QUIET).await;

    let mut late = open(&url).await;
    let first = next_event(&mut late, PATIENT).await.unwrap();
    assert_eq!(first["data"]["elements"][0]["text"], "kept");
    wait_for_sessions(&hub, 2).await;
}
