use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade, ws::Message},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;

use super::RoomGateway;

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(gateway): State<RoomGateway>,
    State(config): State<Config>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        let conn = Uuid::now_v7();
        let (tx, mut rx) = mpsc::channel::<String>(config.outbox_capacity);
        gateway.connect(conn, tx);

        let (mut sender, mut receiver) = stream.split();

        let send_task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        });

        // one event at a time per connection; handlers are never cancelled
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => gateway.handle_frame(conn, text.as_str()).await,
                Message::Close(_) => break,
                _ => debug!(%conn, "ignoring non-text frame"),
            }
        }

        gateway.disconnect(conn);
        send_task.abort();
    })
}
