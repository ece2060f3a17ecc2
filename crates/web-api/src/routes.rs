use application::{
    CreateRoomRequest, HistoryEntry, HistoryQuery, MessageView, RoomView, UserSummary,
};
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use domain::{MessageId, MessageType, RoomId};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::{auth::bearer_token, error::ApiError, state::AppState, websocket::websocket_upgrade};

#[derive(Debug, Deserialize, Validate)]
struct CreateRoomPayload {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[validate(length(max = 500))]
    description: Option<String>,
    #[serde(default)]
    is_private: bool,
    #[validate(range(min = 1, max = 100))]
    max_participants: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
struct SendMessagePayload {
    #[validate(length(min = 1, max = 1000))]
    content: String,
    #[serde(default, rename = "type")]
    message_type: MessageType,
}

#[derive(Debug, Deserialize, Validate)]
struct EditMessagePayload {
    #[validate(length(min = 1, max = 1000))]
    content: String,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

/// 通过 Bearer 令牌认证的当前用户
struct AuthUser(UserSummary);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = state
            .coordinator
            .authenticate(bearer_token(&parts.headers))
            .await?;
        Ok(AuthUser(UserSummary::from(&user)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/{room_id}", get(get_room))
        .route("/rooms/{room_id}/join", post(join_room))
        .route("/rooms/{room_id}/leave", post(leave_room))
        .route(
            "/rooms/{room_id}/messages",
            post(send_message).get(get_history),
        )
        .route("/messages/{message_id}", put(edit_message).delete(delete_message))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<RoomView>), ApiError> {
    payload.validate()?;
    let room = state
        .room_service
        .create_room(CreateRoomRequest {
            name: payload.name,
            description: payload.description,
            is_private: payload.is_private,
            max_participants: payload.max_participants,
            creator_id: user.id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(room)))
}

async fn list_rooms(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<RoomView>>, ApiError> {
    let rooms = state.room_service.list_rooms(Some(user.id)).await?;
    Ok(Json(rooms))
}

async fn get_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomView>, ApiError> {
    let room = state.room_service.get_room(room_id, Some(user.id)).await?;
    Ok(Json(room))
}

async fn join_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomView>, ApiError> {
    let room = state.coordinator.join_room(&user, None, room_id).await?;
    Ok(Json(room))
}

async fn leave_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.leave_room(&user, None, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    payload.validate()?;
    let message = state
        .coordinator
        .send_message(&user, room_id, payload.content, payload.message_type)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let entries = state
        .room_service
        .get_room_messages(
            room_id,
            HistoryQuery {
                limit: params.limit,
                offset: params.offset,
            },
            Some(user.id),
        )
        .await?;
    Ok(Json(entries))
}

async fn edit_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(message_id): Path<MessageId>,
    Json(payload): Json<EditMessagePayload>,
) -> Result<Json<MessageView>, ApiError> {
    payload.validate()?;
    let message = state
        .coordinator
        .edit_message(&user, message_id, payload.content)
        .await?;
    Ok(Json(message))
}

async fn delete_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(message_id): Path<MessageId>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.delete_message(&user, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
