use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{MessageId, RoomId, Timestamp, UserId};

const MESSAGE_MAX_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::System => "system",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            "system" => Ok(MessageType::System),
            other => Err(DomainError::invalid_argument(
                "type",
                format!("unknown message type '{other}'"),
            )),
        }
    }
}

/// 消息正文内容（1-1000 个字符）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_argument("content", "cannot be empty"));
        }
        if value.chars().count() > MESSAGE_MAX_CHARS {
            return Err(DomainError::invalid_argument(
                "content",
                "must be at most 1000 characters",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MessageContent {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageContent> for String {
    fn from(value: MessageContent) -> Self {
        value.0
    }
}

/// 已持久化的消息。作者与所属房间在创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub is_edited: bool,
    pub edited_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Message {
    pub fn is_authored_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    pub fn edit(&mut self, content: MessageContent, at: Timestamp) {
        self.content = content;
        self.is_edited = true;
        self.edited_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn content_bounds() {
        assert!(MessageContent::new("").is_err());
        assert!(MessageContent::new(" \n").is_err());
        assert!(MessageContent::new("x".repeat(1000)).is_ok());
        assert!(MessageContent::new("x".repeat(1001)).is_err());
    }

    #[test]
    fn message_type_wire_names() {
        assert_eq!("image".parse::<MessageType>().unwrap(), MessageType::Image);
        assert!("video".parse::<MessageType>().is_err());
        assert_eq!(
            serde_json::to_string(&MessageType::System).unwrap(),
            "\"system\""
        );
        assert_eq!(MessageType::default(), MessageType::Text);
    }

    #[test]
    fn edit_marks_message() {
        let mut message = Message {
            id: MessageId::generate(),
            room_id: RoomId::generate(),
            user_id: UserId::generate(),
            content: MessageContent::new("hi").unwrap(),
            message_type: MessageType::Text,
            is_edited: false,
            edited_at: None,
            created_at: Utc::now(),
        };
        let at = Utc::now();
        message.edit(MessageContent::new("hi there").unwrap(), at);

        assert!(message.is_edited);
        assert_eq!(message.edited_at, Some(at));
        assert_eq!(message.content.as_str(), "hi there");
    }
}
