//! End-to-end tests: real WebSocket clients against a running server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use shoutbox::prelude::*;
use tokio_tungstenite::tungstenite::Message as Frame;

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// =========================================================================
// Helpers
// =========================================================================

/// Starts a server on a random port and returns the address.
async fn start_server(config: ServerConfig) -> String {
    let server = ShoutboxServer::builder()
        .config(ServerConfig {
            bind: "127.0.0.1:0".into(),
            ..config
        })
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, frame: Value) {
    ws.send(Frame::Text(frame.to_string().into()))
        .await
        .expect("send");
}

/// Next frame as JSON. Fails the test if nothing arrives within 2 s.
async fn recv(ws: &mut ClientWs) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame should arrive")
            .expect("stream open")
            .expect("frame ok");
        match frame {
            Frame::Text(_) | Frame::Binary(_) => {
                return serde_json::from_slice(&frame.into_data()).expect("decode");
            }
            _ => continue,
        }
    }
}

/// Next frame, which must be `event`. Returns its data.
async fn expect_event(ws: &mut ClientWs, event: &str) -> Value {
    let frame = recv(ws).await;
    assert_eq!(frame["event"], event, "unexpected frame {frame}");
    frame["data"].clone()
}

async fn expect_error(ws: &mut ClientWs, code: &str) {
    let data = expect_event(ws, "error").await;
    assert_eq!(data["code"], code, "unexpected error {data}");
}

/// Connects and sets a display name. Returns the socket and the user id.
async fn named_client(addr: &str, name: &str) -> (ClientWs, String) {
    let mut ws = connect(addr).await;
    send(&mut ws, json!({"event": "set_name", "data": {"displayName": name}})).await;
    let data = expect_event(&mut ws, "session_created").await;
    let user_id = data["userId"].as_str().expect("userId").to_string();
    (ws, user_id)
}

/// alice creates a room and bob joins it. All join traffic is drained.
async fn two_person_room(addr: &str) -> (ClientWs, ClientWs, String) {
    let (mut alice, _) = named_client(addr, "alice").await;
    send(&mut alice, json!({"event": "create_room"})).await;
    let joined = expect_event(&mut alice, "room_joined").await;
    let code = joined["roomCode"].as_str().expect("roomCode").to_string();

    let (mut bob, _) = named_client(addr, "bob").await;
    send(&mut bob, json!({"event": "join_room", "data": {"roomCode": code}})).await;
    expect_event(&mut bob, "room_joined").await;
    expect_event(&mut alice, "new_message").await;
    expect_event(&mut alice, "participant_update").await;

    (alice, bob, code)
}

fn chat(text: &str) -> Value {
    json!({"event": "send_message", "data": {"text": text}})
}

// =========================================================================
// Sessions
// =========================================================================

#[tokio::test]
async fn test_set_name_creates_session() {
    let addr = start_server(ServerConfig::default()).await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({"event": "set_name", "data": {"displayName": "alice"}})).await;
    let frame = recv(&mut ws).await;
    let event: ServerEvent = serde_json::from_value(frame).expect("server event");
    match event {
        ServerEvent::SessionCreated { session_token, user_id } => {
            assert!(!session_token.is_empty());
            assert!(!user_id.as_str().is_empty());
        }
        other => panic!("expected SessionCreated, got {other:?}"),
    }
}

#[tokio::test]
async fn test_set_name_keeps_local_id() {
    let addr = start_server(ServerConfig::default()).await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        json!({"event": "set_name", "data": {"displayName": "alice", "localUUID": "browser-1"}}),
    )
    .await;
    let data = expect_event(&mut ws, "session_created").await;
    assert_eq!(data["userId"], "browser-1");
}

#[tokio::test]
async fn test_invalid_name_rejected() {
    let addr = start_server(ServerConfig::default()).await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({"event": "set_name", "data": {"displayName": "a"}})).await;
    expect_error(&mut ws, "invalid_name").await;
}

#[tokio::test]
async fn test_room_requests_need_a_session() {
    let addr = start_server(ServerConfig::default()).await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({"event": "create_room"})).await;
    expect_error(&mut ws, "not_authenticated").await;

    send(&mut ws, json!({"event": "join_room", "data": {"roomCode": "ABC234"}})).await;
    expect_error(&mut ws, "not_authenticated").await;
}

#[tokio::test]
async fn test_malformed_frame_does_not_close_connection() {
    let addr = start_server(ServerConfig::default()).await;
    let mut ws = connect(&addr).await;

    ws.send(Frame::Text("not json".into())).await.expect("send");
    expect_error(&mut ws, "bad_request").await;

    send(&mut ws, json!({"event": "set_name", "data": {"bogus": true}})).await;
    expect_error(&mut ws, "invalid_name").await;

    send(&mut ws, json!({"event": "set_name", "data": {"displayName": "alice"}})).await;
    expect_event(&mut ws, "session_created").await;
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test]
async fn test_create_room_sends_snapshot() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut ws, user_id) = named_client(&addr, "alice").await;

    send(&mut ws, json!({"event": "create_room"})).await;
    let data = expect_event(&mut ws, "room_joined").await;

    let code = data["roomCode"].as_str().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    let state = &data["roomState"];
    assert_eq!(state["ownerId"], user_id.as_str());
    assert_eq!(state["participants"].as_array().unwrap().len(), 1);
    assert_eq!(state["messages"][0]["type"], "system");
    assert_eq!(state["messages"][0]["payload"]["event"], "room_created");
    assert!(state["gameState"]["activeGame"].is_null());
}

#[tokio::test]
async fn test_join_notifies_existing_members() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut alice, _) = named_client(&addr, "alice").await;
    send(&mut alice, json!({"event": "create_room"})).await;
    let code = expect_event(&mut alice, "room_joined").await["roomCode"].clone();

    let (mut bob, bob_id) = named_client(&addr, "bob").await;
    // Lowercase codes are accepted.
    let lower = code.as_str().unwrap().to_lowercase();
    send(&mut bob, json!({"event": "join_room", "data": {"roomCode": lower}})).await;

    let joined = expect_event(&mut bob, "room_joined").await;
    assert_eq!(joined["roomCode"], code);
    assert_eq!(joined["roomState"]["participants"].as_array().unwrap().len(), 2);

    let notice = expect_event(&mut alice, "new_message").await;
    assert_eq!(notice["message"]["payload"]["event"], "user_joined");
    assert_eq!(notice["message"]["payload"]["metadata"]["userName"], "bob");

    let update = expect_event(&mut alice, "participant_update").await;
    let participants = update["participants"].as_array().unwrap();
    assert!(participants.iter().any(|p| p["userId"] == bob_id.as_str() && p["isOnline"] == true));
}

#[tokio::test]
async fn test_join_rejections() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut alice, _) = named_client(&addr, "alice").await;
    send(&mut alice, json!({"event": "create_room"})).await;
    let code = expect_event(&mut alice, "room_joined").await["roomCode"].clone();

    let (mut other, _) = named_client(&addr, "ALICE").await;

    send(&mut other, json!({"event": "join_room", "data": {"roomCode": "AB"}})).await;
    expect_error(&mut other, "invalid_room_code").await;

    send(&mut other, json!({"event": "join_room", "data": {"roomCode": "ZZZZZZ"}})).await;
    expect_error(&mut other, "room_not_found").await;

    send(&mut other, json!({"event": "join_room", "data": {"roomCode": code}})).await;
    expect_error(&mut other, "name_taken").await;
}

#[tokio::test]
async fn test_leave_room() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob, code) = two_person_room(&addr).await;

    send(&mut bob, json!({"event": "leave_room"})).await;
    let left = expect_event(&mut bob, "room_left").await;
    assert_eq!(left["roomCode"], code.as_str());

    let notice = expect_event(&mut alice, "new_message").await;
    assert_eq!(notice["message"]["payload"]["event"], "user_left");
    let update = expect_event(&mut alice, "participant_update").await;
    let bob_record = update["participants"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["displayName"] == "bob")
        .cloned()
        .expect("bob keeps a record");
    assert_eq!(bob_record["isOnline"], false);

    send(&mut bob, json!({"event": "leave_room"})).await;
    expect_error(&mut bob, "not_in_room").await;
}

#[tokio::test]
async fn test_dropped_connection_is_silent() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut alice, bob, _) = two_person_room(&addr).await;

    drop(bob);

    // Only the presence change is broadcast; no user_left message.
    let update = expect_event(&mut alice, "participant_update").await;
    let bob_record = update["participants"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["displayName"] == "bob")
        .cloned()
        .unwrap();
    assert_eq!(bob_record["isOnline"], false);
}

#[tokio::test]
async fn test_leave_after_shutdown_reports_error() {
    let server = ShoutboxServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("local addr").to_string();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let (mut ws, _) = named_client(&addr, "alice").await;
    send(&mut ws, json!({"event": "create_room"})).await;
    expect_event(&mut ws, "room_joined").await;

    // Stopping the server stops every room actor; open connections remain.
    stop_tx.send(()).expect("server still running");
    running.await.expect("server task").expect("clean shutdown");

    send(&mut ws, json!({"event": "leave_room"})).await;
    expect_error(&mut ws, "server_error").await;

    send(&mut ws, json!({"event": "leave_room"})).await;
    expect_error(&mut ws, "not_in_room").await;
}

// =========================================================================
// Chat
// =========================================================================

#[tokio::test]
async fn test_chat_broadcasts_to_room() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob, _) = two_person_room(&addr).await;

    send(&mut bob, chat("  hello there  ")).await;

    for ws in [&mut alice, &mut bob] {
        let data = expect_event(ws, "new_message").await;
        let message = &data["message"];
        assert_eq!(message["type"], "chat");
        assert_eq!(message["payload"]["text"], "hello there");
        assert_eq!(message["payload"]["displayName"], "bob");
    }
}

#[tokio::test]
async fn test_silent_reader_stays_online() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob, _) = two_person_room(&addr).await;

    for i in 0..5 {
        send(&mut alice, chat(&format!("update {i}"))).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    for ws in [&mut alice, &mut bob] {
        for i in 0..5 {
            let data = expect_event(ws, "new_message").await;
            assert_eq!(data["message"]["payload"]["text"], format!("update {i}"));
        }
    }
    // bob never went offline, so alice saw no presence change.
    let quiet = tokio::time::timeout(Duration::from_millis(200), alice.next()).await;
    assert!(quiet.is_err(), "unexpected frame {quiet:?}");

    send(&mut bob, chat("still here")).await;
    let data = expect_event(&mut alice, "new_message").await;
    assert_eq!(data["message"]["payload"]["displayName"], "bob");
}

#[tokio::test]
async fn test_chat_rejections() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut ws, _) = named_client(&addr, "alice").await;

    send(&mut ws, chat("hi")).await;
    expect_error(&mut ws, "not_in_room").await;

    send(&mut ws, json!({"event": "create_room"})).await;
    expect_event(&mut ws, "room_joined").await;

    send(&mut ws, chat("   ")).await;
    expect_error(&mut ws, "invalid_message").await;

    send(&mut ws, chat(&"x".repeat(501))).await;
    expect_error(&mut ws, "message_too_long").await;

    send(&mut ws, chat(&"x".repeat(500))).await;
    expect_event(&mut ws, "new_message").await;
}

#[tokio::test]
async fn test_chat_rate_limit() {
    let mut config = ServerConfig::default();
    config.chat_limit.limit = 2;
    let addr = start_server(config).await;
    let (mut ws, _) = named_client(&addr, "alice").await;
    send(&mut ws, json!({"event": "create_room"})).await;
    expect_event(&mut ws, "room_joined").await;

    for text in ["one", "two"] {
        send(&mut ws, chat(text)).await;
        let data = expect_event(&mut ws, "new_message").await;
        assert_eq!(data["message"]["payload"]["text"], text);
    }

    send(&mut ws, chat("three")).await;
    let data = expect_event(&mut ws, "error").await;
    assert_eq!(data["code"], "rate_limit");
    assert_eq!(data["message"], "Too many messages. Slow down!");
}

// =========================================================================
// Games
// =========================================================================

#[tokio::test]
async fn test_poll_over_the_wire() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut alice, mut bob, _) = two_person_room(&addr).await;

    let start = json!({
        "event": "start_game",
        "data": {
            "gameType": "poll",
            "gameData": {"question": "Lunch?", "options": ["pizza", "salad"]}
        }
    });

    send(&mut bob, start.clone()).await;
    expect_error(&mut bob, "not_owner").await;

    send(&mut alice, start).await;
    for ws in [&mut alice, &mut bob] {
        let question = expect_event(ws, "new_message").await;
        assert_eq!(question["message"]["type"], "game-event");
        assert_eq!(question["message"]["payload"]["gameType"], "poll");
        assert_eq!(question["message"]["payload"]["action"], "question");
        let update = expect_event(ws, "game_update").await;
        assert_eq!(update["gameState"]["activeGame"], "poll");
    }

    send(&mut bob, json!({"event": "game_action", "data": {"action": "vote", "data": {"optionIndex": 5}}})).await;
    expect_error(&mut bob, "invalid_option").await;

    send(&mut bob, json!({"event": "game_action", "data": {"action": "vote", "data": {"optionIndex": 1}}})).await;
    for ws in [&mut alice, &mut bob] {
        let update = expect_event(ws, "game_update").await;
        let votes = &update["gameState"]["gameData"]["options"][1]["votes"];
        assert_eq!(votes.as_array().unwrap().len(), 1);
    }

    send(&mut alice, json!({"event": "game_action", "data": {"action": "end"}})).await;
    for ws in [&mut alice, &mut bob] {
        let result = expect_event(ws, "new_message").await;
        let payload = &result["message"]["payload"];
        assert_eq!(payload["action"], "result");
        assert_eq!(payload["data"]["totalVotes"], 1);
        assert_eq!(payload["data"]["percentages"], json!([0, 100]));
        let update = expect_event(ws, "game_update").await;
        assert!(update["gameState"]["activeGame"].is_null());
    }
}

#[tokio::test]
async fn test_game_action_without_game() {
    let addr = start_server(ServerConfig::default()).await;
    let (mut alice, _bob, _) = two_person_room(&addr).await;

    send(&mut alice, json!({"event": "game_action", "data": {"action": "end"}})).await;
    expect_error(&mut alice, "no_active_game").await;

    send(&mut alice, json!({"event": "start_game", "data": {"gameType": "chess", "gameData": {}}})).await;
    expect_error(&mut alice, "invalid_game_data").await;
}
