//! 聊天室系统核心领域模型
//!
//! 包含用户、房间、消息等核心实体，以及它们的校验规则。

pub mod chat_room;
pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

pub use chat_room::{JoinOutcome, Room, RoomCapacity, RoomDescription, RoomName, DEFAULT_MAX_PARTICIPANTS};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{Message, MessageContent, MessageType};
pub use user::User;
pub use value_objects::{MessageId, RoomId, Timestamp, UserId};
