//! WebSocket 处理器
//!
//! 握手阶段完成认证，之后把文本帧交给协调器，把出站事件写回套接字。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use domain::User;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::{auth::bearer_token, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// 凭证来自 `?token=` 或 `Authorization: Bearer`；认证失败时不升级
pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let credential = query.token.as_deref().or_else(|| bearer_token(&headers));
    let user = state
        .coordinator
        .authenticate(credential)
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "websocket handshake rejected");
            ApiError::from(err)
        })?;

    Ok(ws.on_upgrade(move |socket| run_connection(socket, state, user)))
}

async fn run_connection(socket: WebSocket, state: AppState, user: User) {
    let (session, mut events) = state.coordinator.connect(&user);
    let (mut sender, mut incoming) = socket.split();

    let connection_id = session.connection.id();
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let payload = match event.to_json() {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize websocket payload");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                tracing::debug!(connection_id = %connection_id, "websocket writer closed");
                break;
            }
        }
    });

    // 读循环不会被中途取消，已经开始的服务调用总能落库
    let coordinator = state.coordinator.clone();
    let reader_session = session.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(frame) = incoming.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    coordinator.handle_text(&reader_session, text.as_str()).await;
                }
                Ok(WsMessage::Close(_)) => break,
                // ping 由传输层自动回复 pong
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
                Ok(WsMessage::Binary(_)) => {
                    tracing::debug!(connection_id = %reader_session.connection.id(), "binary frame ignored");
                }
                Err(err) => {
                    tracing::debug!(error = %err, "websocket read failed");
                    break;
                }
            }
        }
    });

    if let Err(err) = recv_task.await {
        tracing::warn!(error = %err, "websocket reader task failed");
    }
    state.coordinator.disconnect(&session);
    drop(session);

    // 把已排队的事件写完再退出
    if tokio::time::timeout(std::time::Duration::from_secs(1), &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
}
