//! 实时通道的入站/出站事件
//!
//! 文本帧统一为 `{"event": "...", "data": {...}}`。

use domain::{MessageId, MessageType, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{dto::MessageView, error::ApplicationError, registry::ConnectionId};

#[derive(Debug, Clone, Deserialize)]
pub struct RoomPayload {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendMessagePayload {
    pub room_id: RoomId,
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: MessageType,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EditMessagePayload {
    pub message_id: MessageId,
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    pub message_id: MessageId,
}

/// 客户端发来的意图
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom(RoomPayload),
    LeaveRoom(RoomPayload),
    SendMessage(SendMessagePayload),
    EditMessage(EditMessagePayload),
    DeleteMessage(MessagePayload),
    TypingStart(RoomPayload),
    TypingStop(RoomPayload),
}

impl ClientEvent {
    /// 解析并校验负载形状，失败时不会触达业务服务
    pub fn parse(text: &str) -> Result<Self, ApplicationError> {
        let event: ClientEvent = serde_json::from_str(text)
            .map_err(|err| ApplicationError::validation("event", err.to_string()))?;
        match &event {
            ClientEvent::SendMessage(payload) => payload.validate()?,
            ClientEvent::EditMessage(payload) => payload.validate()?,
            _ => {}
        }
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => "join_room",
            ClientEvent::LeaveRoom(_) => "leave_room",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::EditMessage(_) => "edit_message",
            ClientEvent::DeleteMessage(_) => "delete_message",
            ClientEvent::TypingStart(_) => "typing_start",
            ClientEvent::TypingStop(_) => "typing_stop",
        }
    }
}

/// 服务端推送的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: String,
    },
    RoomJoined {
        room_id: RoomId,
        name: String,
    },
    UserJoined {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        timestamp: Timestamp,
    },
    RoomLeft {
        room_id: RoomId,
    },
    UserLeft {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        timestamp: Timestamp,
    },
    NewMessage(MessageView),
    MessageEdited {
        id: MessageId,
        room_id: RoomId,
        content: String,
        edited_at: Option<Timestamp>,
    },
    MessageDeleted {
        message_id: MessageId,
        room_id: RoomId,
    },
    UserTyping {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
    },
    UserStoppedTyping {
        room_id: RoomId,
        user_id: UserId,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &ApplicationError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
