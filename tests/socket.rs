use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use stewdy::{
    AppState, app,
    config::Config,
    db,
    rooms::{RoomGateway, SqliteMessageStore},
};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve() -> (String, RoomGateway) {
    let db_pool = db::memory().await.unwrap();
    let config = Config::from_lookup(|_| None).unwrap();
    let gateway = RoomGateway::new(SqliteMessageStore::new(db_pool.clone()), config.history_limit);
    let app_state = AppState {
        db_pool,
        gateway: gateway.clone(),
        config,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(app_state)).await.unwrap();
    });
    (format!("ws://{addr}/ws"), gateway)
}

async fn open(url: &str) -> Socket {
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next event frame, skipping control frames.
async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn join_voice(room_id: &str, user_id: &str, username: &str) -> Value {
    json!({
        "event": "joinVoice",
        "data": {"roomId": room_id, "userId": user_id, "username": username}
    })
}

#[tokio::test]
async fn chat_round_trips_over_the_socket() {
    let (url, _gateway) = serve().await;
    let mut ann = open(&url).await;
    let mut bob = open(&url).await;

    send(&mut ann, json!({"event": "joinRoom", "data": "r1"})).await;
    assert_eq!(next_event(&mut ann).await["event"], "previousMessages");
    assert_eq!(next_event(&mut ann).await["event"], "userActivity");

    send(&mut bob, json!({"event": "joinRoom", "data": "r1"})).await;
    assert_eq!(next_event(&mut bob).await["event"], "previousMessages");
    assert_eq!(next_event(&mut bob).await["event"], "userActivity");
    assert_eq!(next_event(&mut ann).await["event"], "userActivity");

    send(
        &mut bob,
        json!({"event": "chatMessage", "data": {"roomId": "r1", "message": "hello", "username": "bob"}}),
    )
    .await;

    for socket in [&mut ann, &mut bob] {
        let frame = next_event(socket).await;
        assert_eq!(frame["event"], "message");
        assert_eq!(frame["data"]["message"], "hello");
        assert_eq!(frame["data"]["username"], "bob");
    }
}

#[tokio::test]
async fn closing_the_socket_evicts_voice_presence() {
    let (url, gateway) = serve().await;
    let mut ann = open(&url).await;
    let mut bob = open(&url).await;

    send(&mut ann, join_voice("r2", "a", "Ann")).await;
    assert_eq!(next_event(&mut ann).await["event"], "voiceUsersList");

    send(&mut bob, join_voice("r2", "b", "Bob")).await;
    let roster = next_event(&mut bob).await;
    assert_eq!(roster["event"], "voiceUsersList");
    assert_eq!(roster["data"]["users"].as_array().unwrap().len(), 2);
    assert_eq!(
        next_event(&mut ann).await,
        json!({"event": "voiceUserJoined", "data": {"roomId": "r2", "userId": "b", "username": "Bob"}})
    );

    ann.close(None).await.unwrap();
    drop(ann);

    assert_eq!(
        next_event(&mut bob).await,
        json!({"event": "voiceUserLeft", "data": {"roomId": "r2", "userId": "a"}})
    );
    let users: Vec<_> = gateway
        .voice()
        .list_voice("r2")
        .into_iter()
        .map(|p| p.user_id)
        .collect();
    assert_eq!(users, ["b"]);
}

#[tokio::test]
async fn malformed_frames_do_not_close_the_socket() {
    let (url, _gateway) = serve().await;
    let mut ann = open(&url).await;

    ann.send(Message::Text("{not json".to_owned())).await.unwrap();
    send(&mut ann, json!({"event": "joinRoom", "data": "@me"})).await;

    assert_eq!(
        next_event(&mut ann).await,
        json!({"event": "previousMessages", "data": []})
    );
}
