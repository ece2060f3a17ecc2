//! 进程内的 `RoomStore`，用于测试和无数据库的本地运行

use std::collections::HashMap;

use application::{NewMessage, RoomStore};
use async_trait::async_trait;
use chrono::Utc;
use domain::{Message, MessageId, RepositoryError, Room, RoomId, Timestamp, User, UserId};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    rooms: HashMap<RoomId, Room>,
    messages: HashMap<MessageId, Message>,
    /// 每个房间的消息 ID，按写入顺序
    timeline: HashMap<RoomId, Vec<MessageId>>,
    last_created_at: Option<Timestamp>,
}

impl MemoryState {
    // 写入时间单调不减，与时间线顺序一致
    fn next_created_at(&mut self) -> Timestamp {
        let now = Utc::now();
        let stamped = match self.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_created_at = Some(stamped);
        stamped
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRoomStore {
    state: RwLock<MemoryState>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用户由外部系统拥有，这里只提供预置入口
    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn create_room(&self, room: Room) -> Result<Room, RepositoryError> {
        let mut state = self.state.write().await;
        if state.rooms.contains_key(&room.id) {
            return Err(RepositoryError::Conflict);
        }
        state.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        Ok(self.state.read().await.rooms.get(&id).cloned())
    }

    async fn save_room(&self, room: Room) -> Result<Room, RepositoryError> {
        let mut state = self.state.write().await;
        let slot = state
            .rooms
            .get_mut(&room.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = room.clone();
        Ok(room)
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, RepositoryError> {
        let mut rooms: Vec<Room> = self.state.read().await.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rooms)
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.rooms.contains_key(&message.room_id) {
            return Err(RepositoryError::NotFound);
        }
        if state.messages.contains_key(&message.id) {
            return Err(RepositoryError::Conflict);
        }

        let stored = Message {
            id: message.id,
            room_id: message.room_id,
            user_id: message.user_id,
            content: message.content,
            message_type: message.message_type,
            is_edited: false,
            edited_at: None,
            created_at: state.next_created_at(),
        };
        state
            .timeline
            .entry(stored.room_id)
            .or_default()
            .push(stored.id);
        state.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.state.read().await.messages.get(&id).cloned())
    }

    async fn save_message(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        let slot = state
            .messages
            .get_mut(&message.id)
            .ok_or(RepositoryError::NotFound)?;
        // 所属房间、作者和创建时间不随编辑改变
        slot.content = message.content;
        slot.is_edited = message.is_edited;
        slot.edited_at = message.edited_at;
        Ok(slot.clone())
    }

    async fn delete_message(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(message) = state.messages.remove(&id) else {
            return Ok(false);
        };
        if let Some(timeline) = state.timeline.get_mut(&message.room_id) {
            timeline.retain(|message_id| *message_id != id);
        }
        Ok(true)
    }

    async fn list_messages(
        &self,
        room_id: RoomId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let Some(timeline) = state.timeline.get(&room_id) else {
            return Ok(Vec::new());
        };
        Ok(timeline
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|id| state.messages.get(id).cloned())
            .collect())
    }

    async fn latest_message(&self, room_id: RoomId) -> Result<Option<Message>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .timeline
            .get(&room_id)
            .and_then(|timeline| timeline.last())
            .and_then(|id| state.messages.get(id).cloned()))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}
