mod support;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};

use support::{RunningServer, TestApp};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn next_frame(socket: &mut Socket) -> Message {
    timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("frame before timeout")
        .expect("stream open")
        .expect("frame ok")
}

async fn next_event(socket: &mut Socket) -> Value {
    loop {
        if let Message::Text(text) = next_frame(socket).await {
            return serde_json::from_str(text.as_str()).expect("json event");
        }
    }
}

async fn send_event(socket: &mut Socket, event: Value) {
    socket
        .send(Message::Text(event.to_string().into()))
        .await
        .expect("send frame");
}

async fn assert_silent(socket: &mut Socket) {
    let pending = timeout(Duration::from_millis(150), socket.next()).await;
    assert!(pending.is_err(), "unexpected frame: {pending:?}");
}

#[tokio::test]
async fn websocket_room_flow() {
    let app = TestApp::new();
    let (alice_id, alice_token) = app.user("alice").await;
    let (bob_id, bob_token) = app.user("bob").await;
    let server = RunningServer::start(app.router.clone()).await;
    let http = Client::new();

    let room: Value = http
        .post(server.http("/api/v1/rooms"))
        .bearer_auth(&alice_token)
        .json(&json!({ "name": "lobby", "max_participants": 5 }))
        .send()
        .await
        .expect("create room")
        .json()
        .await
        .expect("room json");
    let room_id = room["id"].as_str().expect("room id").to_string();

    // 令牌可以放在查询参数里，也可以放在 Authorization 头里
    let (mut alice, _) = connect_async(server.ws(&format!("?token={alice_token}")))
        .await
        .expect("alice connects");
    let mut request = server.ws("").into_client_request().expect("request");
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {bob_token}").parse().expect("header"),
    );
    let (mut bob, _) = connect_async(request).await.expect("bob connects");

    let connected = next_event(&mut alice).await;
    assert_eq!(connected["event"], "connected");
    assert_eq!(connected["data"]["user_id"], alice_id.to_string());
    assert_eq!(next_event(&mut bob).await["data"]["display_name"], "bob");

    send_event(&mut alice, json!({ "event": "join_room", "data": { "room_id": room_id } })).await;
    assert_eq!(next_event(&mut alice).await["event"], "room_joined");
    assert_eq!(next_event(&mut alice).await["event"], "user_joined");

    send_event(&mut bob, json!({ "event": "join_room", "data": { "room_id": room_id } })).await;
    let ack = next_event(&mut bob).await;
    assert_eq!(ack["event"], "room_joined");
    assert_eq!(ack["data"]["name"], "lobby");
    assert_eq!(next_event(&mut bob).await["event"], "user_joined");
    let joined = next_event(&mut alice).await;
    assert_eq!(joined["event"], "user_joined");
    assert_eq!(joined["data"]["user_id"], bob_id.to_string());
    assert_eq!(joined["data"]["display_name"], "bob");

    send_event(
        &mut bob,
        json!({ "event": "send_message", "data": { "room_id": room_id, "content": "hi all" } }),
    )
    .await;
    let mut message_id = String::new();
    for socket in [&mut alice, &mut bob] {
        let event = next_event(socket).await;
        assert_eq!(event["event"], "new_message");
        assert_eq!(event["data"]["content"], "hi all");
        assert_eq!(event["data"]["type"], "text");
        assert_eq!(event["data"]["author"]["display_name"], "bob");
        message_id = event["data"]["id"].as_str().expect("message id").to_string();
    }

    // 打字状态不回显给发送者
    send_event(&mut bob, json!({ "event": "typing_start", "data": { "room_id": room_id } })).await;
    let typing = next_event(&mut alice).await;
    assert_eq!(typing["event"], "user_typing");
    assert_eq!(typing["data"]["display_name"], "bob");
    assert_silent(&mut bob).await;

    // REST 变更同样推送给实时客户端
    let response = http
        .put(server.http(&format!("/api/v1/messages/{message_id}")))
        .bearer_auth(&bob_token)
        .json(&json!({ "content": "hi everyone" }))
        .send()
        .await
        .expect("edit message");
    assert_eq!(response.status(), 200);
    let edited = next_event(&mut alice).await;
    assert_eq!(edited["event"], "message_edited");
    assert_eq!(edited["data"]["content"], "hi everyone");
    assert_eq!(next_event(&mut bob).await["event"], "message_edited");

    // 失败只通知发起者
    send_event(
        &mut alice,
        json!({ "event": "edit_message", "data": { "message_id": message_id, "content": "mine now" } }),
    )
    .await;
    let error = next_event(&mut alice).await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["data"]["code"], "FORBIDDEN");
    assert_silent(&mut bob).await;

    send_event(&mut bob, json!({ "event": "leave_room", "data": { "room_id": room_id } })).await;
    assert_eq!(next_event(&mut bob).await["event"], "room_left");
    let left = next_event(&mut alice).await;
    assert_eq!(left["event"], "user_left");
    assert_eq!(left["data"]["user_id"], bob_id.to_string());

    alice.close(None).await.ok();
    bob.close(None).await.ok();
}

#[tokio::test]
async fn handshake_without_valid_credential_is_rejected() {
    let app = TestApp::new();
    let (_, inactive_token) = app.user_with_status("ghost", false).await;
    let server = RunningServer::start(app.router.clone()).await;

    let inactive = format!("?token={inactive_token}");
    for query in ["", "?token=not-a-jwt", inactive.as_str()] {
        match connect_async(server.ws(query)).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            other => panic!("handshake should fail, got {:?}", other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn ping_is_answered_and_disconnect_keeps_membership() {
    let app = TestApp::new();
    let (_, alice_token) = app.user("alice").await;
    let server = RunningServer::start(app.router.clone()).await;
    let http = Client::new();

    let room: Value = http
        .post(server.http("/api/v1/rooms"))
        .bearer_auth(&alice_token)
        .json(&json!({ "name": "quiet" }))
        .send()
        .await
        .expect("create room")
        .json()
        .await
        .expect("room json");
    let room_id = room["id"].as_str().expect("room id").to_string();

    let (mut socket, _) = connect_async(server.ws(&format!("?token={alice_token}")))
        .await
        .expect("connects");
    next_event(&mut socket).await;

    socket
        .send(Message::Ping("heartbeat".into()))
        .await
        .expect("ping");
    loop {
        match next_frame(&mut socket).await {
            Message::Pong(payload) => {
                assert_eq!(payload.as_ref(), b"heartbeat");
                break;
            }
            Message::Text(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }

    socket.close(None).await.ok();
    drop(socket);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let room: Value = http
        .get(server.http(&format!("/api/v1/rooms/{room_id}")))
        .bearer_auth(&alice_token)
        .send()
        .await
        .expect("get room")
        .json()
        .await
        .expect("room json");
    assert_eq!(room["participants"].as_array().map(Vec::len), Some(1));
}
