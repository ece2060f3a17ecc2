use async_trait::async_trait;
use domain::{
    Message, MessageContent, MessageId, MessageType, RepositoryError, Room, RoomId, User, UserId,
};

/// 待持久化的新消息，`created_at` 由存储在写入时分配。
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
}

/// 房间/消息/用户的持久化端口。
///
/// 所有方法返回持久化后的规范实体；找不到时返回 `None` 或 `RepositoryError::NotFound`。
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn create_room(&self, room: Room) -> Result<Room, RepositoryError>;
    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, RepositoryError>;
    /// 覆盖房间属性及两个成员集合
    async fn save_room(&self, room: Room) -> Result<Room, RepositoryError>;
    async fn list_rooms(&self) -> Result<Vec<Room>, RepositoryError>;

    async fn create_message(&self, message: NewMessage) -> Result<Message, RepositoryError>;
    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;
    /// 消息已被删除时返回 `RepositoryError::NotFound`
    async fn save_message(&self, message: Message) -> Result<Message, RepositoryError>;
    /// 返回是否真的删除了记录
    async fn delete_message(&self, id: MessageId) -> Result<bool, RepositoryError>;
    /// 按创建时间倒序分页
    async fn list_messages(
        &self,
        room_id: RoomId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError>;
    async fn latest_message(&self, room_id: RoomId) -> Result<Option<Message>, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;
}
