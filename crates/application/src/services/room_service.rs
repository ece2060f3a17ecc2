use std::sync::Arc;

use config::ChatConfig;
use domain::{
    JoinOutcome, Message, MessageContent, MessageId, MessageType, RepositoryError, Room,
    RoomCapacity, RoomDescription, RoomId, RoomName, User, UserId,
};

use crate::{
    clock::Clock,
    dto::{HistoryEntry, MessageView, RoomView, UserDirectory, UserSummary},
    error::ApplicationError,
    repository::{NewMessage, RoomStore},
    services::room_locks::RoomLocks,
};

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub max_participants: Option<u32>,
    pub creator_id: UserId,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: String,
    pub message_type: MessageType,
}

/// 历史分页参数，缺省值与上限取自 `ChatConfig`
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub struct RoomServiceDependencies {
    pub store: Arc<dyn RoomStore>,
    pub clock: Arc<dyn Clock>,
    pub chat: ChatConfig,
}

/// 房间生命周期、成员变更、消息增删改以及授权规则。
///
/// 与连接状态无关；每个成功的变更在返回前都已经持久化。
pub struct RoomService {
    deps: RoomServiceDependencies,
    locks: RoomLocks,
}

impl RoomService {
    pub fn new(deps: RoomServiceDependencies) -> Self {
        Self {
            deps,
            locks: RoomLocks::default(),
        }
    }

    async fn require_user(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", user_id))
    }

    async fn require_room(&self, room_id: RoomId) -> Result<Room, ApplicationError> {
        self.deps
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("room", room_id))
    }

    async fn require_message(&self, message_id: MessageId) -> Result<Message, ApplicationError> {
        self.deps
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("message", message_id))
    }

    async fn author_of(&self, message: &Message) -> Result<UserSummary, ApplicationError> {
        Ok(self
            .deps
            .store
            .get_user(message.user_id)
            .await?
            .map(|user| UserSummary::from(&user))
            .unwrap_or_else(|| UserSummary::unknown(message.user_id)))
    }

    async fn render_rooms(
        &self,
        rooms: Vec<Room>,
    ) -> Result<Vec<RoomView>, ApplicationError> {
        let mut latest = Vec::with_capacity(rooms.len());
        for room in &rooms {
            latest.push(self.deps.store.latest_message(room.id).await?);
        }

        let ids = UserDirectory::ids_for(rooms.iter().zip(latest.iter().map(Option::as_ref)));
        let directory = UserDirectory::new(&self.deps.store.get_users(&ids).await?);

        Ok(rooms
            .iter()
            .zip(latest.iter())
            .map(|(room, last_message)| directory.room_view(room, last_message.as_ref()))
            .collect())
    }

    async fn render_room(&self, room: Room) -> Result<RoomView, ApplicationError> {
        let mut views = self.render_rooms(vec![room]).await?;
        views
            .pop()
            .ok_or_else(|| ApplicationError::Storage("room view missing".to_string()))
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.require_user(user_id).await
    }

    pub async fn create_room(
        &self,
        request: CreateRoomRequest,
    ) -> Result<RoomView, ApplicationError> {
        let name = RoomName::parse(request.name)?;
        let description = request
            .description
            .map(RoomDescription::parse)
            .transpose()?;
        let capacity = request
            .max_participants
            .map(RoomCapacity::new)
            .transpose()?
            .unwrap_or_default();

        let creator = self.require_user(request.creator_id).await?;
        let room = Room::create(
            RoomId::generate(),
            name,
            description,
            request.is_private,
            capacity,
            creator.id,
            self.deps.clock.now(),
        );

        let stored = self.deps.store.create_room(room).await?;
        tracing::info!(room_id = %stored.id, creator_id = %creator.id, "room created");
        self.render_room(stored).await
    }

    /// 公开房间，加上请求者参与的私有房间
    pub async fn list_rooms(
        &self,
        requester: Option<UserId>,
    ) -> Result<Vec<RoomView>, ApplicationError> {
        let rooms: Vec<Room> = self
            .deps
            .store
            .list_rooms()
            .await?
            .into_iter()
            .filter(|room| room.is_visible_to(requester))
            .collect();
        self.render_rooms(rooms).await
    }

    /// 对请求者不可见的私有房间按不存在处理
    pub async fn get_room(
        &self,
        room_id: RoomId,
        requester: Option<UserId>,
    ) -> Result<RoomView, ApplicationError> {
        let room = self.require_room(room_id).await?;
        if !room.is_visible_to(requester) {
            return Err(ApplicationError::not_found("room", room_id));
        }
        self.render_room(room).await
    }

    pub async fn join_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomView, ApplicationError> {
        self.join_room_with(room_id, user_id, |_| {}).await
    }

    /// `on_joined` 在房间锁内、成员变更持久化之后执行，已是成员时同样执行
    pub async fn join_room_with<F>(
        &self,
        room_id: RoomId,
        user_id: UserId,
        on_joined: F,
    ) -> Result<RoomView, ApplicationError>
    where
        F: FnOnce(&Room),
    {
        let room = {
            let _guard = self.locks.acquire(room_id).await;
            let mut room = self.require_room(room_id).await?;
            self.require_user(user_id).await?;

            let room = match room.add_participant(user_id, self.deps.clock.now()) {
                JoinOutcome::AlreadyMember => room,
                JoinOutcome::Full => {
                    return Err(ApplicationError::CapacityExceeded {
                        room_id,
                        max: room.max_participants.get(),
                    })
                }
                JoinOutcome::Joined => {
                    let saved = self.deps.store.save_room(room).await?;
                    tracing::info!(room_id = %room_id, user_id = %user_id, "user joined room");
                    saved
                }
            };
            on_joined(&room);
            room
        };
        self.render_room(room).await
    }

    /// 同时移除参与者与管理员身份；返回成员关系是否发生了变化
    pub async fn leave_room(&self, room_id: RoomId, user_id: UserId) -> Result<bool, ApplicationError> {
        self.leave_room_with(room_id, user_id, |_| {}).await
    }

    /// `on_left` 在房间锁内执行，参数为成员关系是否发生了变化
    pub async fn leave_room_with<F>(
        &self,
        room_id: RoomId,
        user_id: UserId,
        on_left: F,
    ) -> Result<bool, ApplicationError>
    where
        F: FnOnce(bool),
    {
        let _guard = self.locks.acquire(room_id).await;
        let mut room = self.require_room(room_id).await?;

        let changed = room.remove_member(user_id, self.deps.clock.now());
        if changed {
            self.deps.store.save_room(room).await?;
            tracing::info!(room_id = %room_id, user_id = %user_id, "user left room");
        }
        on_left(changed);
        Ok(changed)
    }

    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<MessageView, ApplicationError> {
        let content = MessageContent::new(request.content)?;
        let room = self.require_room(request.room_id).await?;
        if !room.is_participant(request.user_id) {
            return Err(ApplicationError::forbidden("send message to a room you have not joined"));
        }
        let author = self.require_user(request.user_id).await?;

        let stored = self
            .deps
            .store
            .create_message(NewMessage {
                id: MessageId::generate(),
                room_id: room.id,
                user_id: author.id,
                content,
                message_type: request.message_type,
            })
            .await?;

        tracing::debug!(room_id = %room.id, message_id = %stored.id, "message persisted");
        Ok(MessageView::new(&stored, UserSummary::from(&author)))
    }

    /// 只有作者本人可以编辑，管理员也不例外
    pub async fn edit_message(
        &self,
        message_id: MessageId,
        user_id: UserId,
        new_content: String,
    ) -> Result<MessageView, ApplicationError> {
        let content = MessageContent::new(new_content)?;
        let mut message = self.require_message(message_id).await?;
        if !message.is_authored_by(user_id) {
            return Err(ApplicationError::forbidden("edit another user's message"));
        }

        message.edit(content, self.deps.clock.now());
        let saved = self
            .deps
            .store
            .save_message(message)
            .await
            .map_err(|err| match err {
                // 与删除并发时按普通的不存在处理
                RepositoryError::NotFound => ApplicationError::not_found("message", message_id),
                other => other.into(),
            })?;

        let author = self.author_of(&saved).await?;
        Ok(MessageView::new(&saved, author))
    }

    /// 作者或房间当前的管理员可以删除；返回被删除的消息
    pub async fn delete_message(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> Result<Message, ApplicationError> {
        let message = self.require_message(message_id).await?;
        if !message.is_authored_by(user_id) {
            let room = self.require_room(message.room_id).await?;
            if !room.is_admin(user_id) {
                return Err(ApplicationError::forbidden("delete another user's message"));
            }
        }

        if !self.deps.store.delete_message(message_id).await? {
            return Err(ApplicationError::not_found("message", message_id));
        }
        tracing::info!(room_id = %message.room_id, message_id = %message_id, user_id = %user_id, "message deleted");
        Ok(message)
    }

    /// 按创建时间倒序分页；`limit` 超出 1..=上限 时返回校验错误
    pub async fn get_room_messages(
        &self,
        room_id: RoomId,
        query: HistoryQuery,
        requester: Option<UserId>,
    ) -> Result<Vec<HistoryEntry>, ApplicationError> {
        let chat = &self.deps.chat;
        let limit = query.limit.unwrap_or(chat.history_default_limit);
        if limit == 0 || limit > chat.history_max_limit {
            return Err(ApplicationError::validation(
                "limit",
                format!("must be between 1 and {}", chat.history_max_limit),
            ));
        }
        let offset = query.offset.unwrap_or(0);

        let room = self.require_room(room_id).await?;
        if !room.is_visible_to(requester) {
            return Err(ApplicationError::not_found("room", room_id));
        }

        let messages = self
            .deps
            .store
            .list_messages(room_id, limit, offset)
            .await?;

        let mut author_ids: Vec<UserId> = messages.iter().map(|message| message.user_id).collect();
        author_ids.sort();
        author_ids.dedup();
        let directory = UserDirectory::new(&self.deps.store.get_users(&author_ids).await?);

        Ok(messages
            .iter()
            .map(|message| HistoryEntry {
                message: MessageView::new(message, directory.summary(message.user_id)),
                is_mine: requester == Some(message.user_id),
            })
            .collect())
    }
}
