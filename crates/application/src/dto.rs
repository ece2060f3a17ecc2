use std::collections::{BTreeSet, HashMap};

use domain::{Message, MessageId, MessageType, Room, RoomId, Timestamp, User, UserId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub display_name: String,
}

impl UserSummary {
    /// 作者记录已被外部删除时的占位
    pub fn unknown(id: UserId) -> Self {
        Self {
            id,
            display_name: "Unknown".to_string(),
        }
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub id: MessageId,
    pub room_id: RoomId,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub author: UserSummary,
    pub is_edited: bool,
    pub edited_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl MessageView {
    pub fn new(message: &Message, author: UserSummary) -> Self {
        Self {
            id: message.id,
            room_id: message.room_id,
            content: message.content.as_str().to_owned(),
            message_type: message.message_type,
            author,
            is_edited: message.is_edited,
            edited_at: message.edited_at,
            created_at: message.created_at,
        }
    }
}

/// 历史消息条目，`is_mine` 在读取时计算，不持久化。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub message: MessageView,
    pub is_mine: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    pub id: RoomId,
    pub name: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub max_participants: u32,
    pub participants: Vec<UserSummary>,
    pub admins: Vec<UserSummary>,
    pub last_message: Option<MessageView>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 一次批量查询得到的用户目录，用来组装视图
#[derive(Debug, Default)]
pub(crate) struct UserDirectory(HashMap<UserId, UserSummary>);

impl UserDirectory {
    pub(crate) fn new(users: &[User]) -> Self {
        Self(
            users
                .iter()
                .map(|user| (user.id, UserSummary::from(user)))
                .collect(),
        )
    }

    /// 房间视图需要解析的全部用户 ID
    pub(crate) fn ids_for<'a>(
        rooms: impl IntoIterator<Item = (&'a Room, Option<&'a Message>)>,
    ) -> Vec<UserId> {
        let mut ids = BTreeSet::new();
        for (room, last_message) in rooms {
            ids.extend(room.participants.iter().copied());
            ids.extend(room.admins.iter().copied());
            if let Some(message) = last_message {
                ids.insert(message.user_id);
            }
        }
        ids.into_iter().collect()
    }

    pub(crate) fn summary(&self, id: UserId) -> UserSummary {
        self.0
            .get(&id)
            .cloned()
            .unwrap_or_else(|| UserSummary::unknown(id))
    }

    pub(crate) fn room_view(&self, room: &Room, last_message: Option<&Message>) -> RoomView {
        RoomView {
            id: room.id,
            name: room.name.as_str().to_owned(),
            description: room
                .description
                .as_ref()
                .map(|description| description.as_str().to_owned()),
            is_private: room.is_private,
            max_participants: room.max_participants.get(),
            participants: room
                .participants
                .iter()
                .map(|id| self.summary(*id))
                .collect(),
            admins: room.admins.iter().map(|id| self.summary(*id)).collect(),
            last_message: last_message
                .map(|message| MessageView::new(message, self.summary(message.user_id))),
            created_at: room.created_at,
            updated_at: room.updated_at,
        }
    }
}
