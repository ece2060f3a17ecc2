//! 实时协调器
//!
//! 每个连接：握手认证 → 订阅 0..N 个房间 → 关闭。
//! 入站事件被翻译为 `RoomService` 调用，成功后再向房间的订阅者快照扇出。

use std::sync::Arc;

use domain::{MessageId, MessageType, RoomId, User};
use tokio::sync::mpsc;

use crate::{
    auth::IdentityVerifier,
    clock::Clock,
    dto::{MessageView, RoomView, UserSummary},
    error::ApplicationError,
    events::{ClientEvent, ServerEvent},
    registry::{ConnectionHandle, ConnectionRegistry},
    services::{RoomService, SendMessageRequest},
};

/// 已通过认证的连接
#[derive(Debug, Clone)]
pub struct Session {
    pub connection: ConnectionHandle,
    pub user: UserSummary,
}

pub struct RealtimeCoordinator {
    rooms: Arc<RoomService>,
    registry: Arc<ConnectionRegistry>,
    verifier: Arc<dyn IdentityVerifier>,
    clock: Arc<dyn Clock>,
}

impl RealtimeCoordinator {
    pub fn new(
        rooms: Arc<RoomService>,
        registry: Arc<ConnectionRegistry>,
        verifier: Arc<dyn IdentityVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rooms,
            registry,
            verifier,
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 校验凭证并加载用户；缺失凭证、未知用户与停用用户一律按认证失败处理
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<User, ApplicationError> {
        let credential = credential
            .map(str::trim)
            .filter(|credential| !credential.is_empty())
            .ok_or(ApplicationError::Authentication)?;
        let user_id = self.verifier.verify(credential)?;

        let user = match self.rooms.get_user(user_id).await {
            Ok(user) => user,
            Err(ApplicationError::NotFound { .. }) => return Err(ApplicationError::Authentication),
            Err(err) => return Err(err),
        };
        if !user.is_active {
            tracing::warn!(user_id = %user.id, "inactive user rejected");
            return Err(ApplicationError::Authentication);
        }
        Ok(user)
    }

    /// 注册新连接并向其发送 `connected`
    pub fn connect(&self, user: &User) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (connection, receiver) = ConnectionHandle::new(user.id);
        self.registry.attach(connection.clone());

        let session = Session {
            connection,
            user: UserSummary::from(user),
        };
        session.connection.send(ServerEvent::Connected {
            connection_id: session.connection.id(),
            user_id: user.id,
            display_name: user.display_name.clone(),
        });
        tracing::info!(
            connection_id = %session.connection.id(),
            user_id = %user.id,
            "connection authenticated"
        );
        (session, receiver)
    }

    pub async fn open(
        &self,
        credential: Option<&str>,
    ) -> Result<(Session, mpsc::UnboundedReceiver<ServerEvent>), ApplicationError> {
        let user = self.authenticate(credential).await?;
        Ok(self.connect(&user))
    }

    /// 只移除实时订阅，持久化的成员关系保持不变
    pub fn disconnect(&self, session: &Session) {
        let rooms = self.registry.detach(session.connection.id());
        tracing::info!(
            connection_id = %session.connection.id(),
            user_id = %session.user.id,
            rooms = rooms.len(),
            "connection closed"
        );
    }

    pub async fn handle_text(&self, session: &Session, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => self.dispatch(session, event).await,
            Err(err) => {
                tracing::warn!(connection_id = %session.connection.id(), error = %err, "malformed client event");
                session.connection.send(ServerEvent::error(&err));
            }
        }
    }

    /// 失败只通知发起连接
    pub async fn dispatch(&self, session: &Session, event: ClientEvent) {
        let name = event.name();
        let origin = Some(&session.connection);
        let actor = &session.user;

        let result = match event {
            ClientEvent::JoinRoom(payload) => self
                .join_room(actor, origin, payload.room_id)
                .await
                .map(drop),
            ClientEvent::LeaveRoom(payload) => {
                self.leave_room(actor, origin, payload.room_id).await
            }
            ClientEvent::SendMessage(payload) => self
                .send_message(
                    actor,
                    payload.room_id,
                    payload.content,
                    payload.message_type,
                )
                .await
                .map(drop),
            ClientEvent::EditMessage(payload) => self
                .edit_message(actor, payload.message_id, payload.content)
                .await
                .map(drop),
            ClientEvent::DeleteMessage(payload) => {
                self.delete_message(actor, payload.message_id).await
            }
            ClientEvent::TypingStart(payload) => {
                self.typing_start(actor, origin, payload.room_id);
                Ok(())
            }
            ClientEvent::TypingStop(payload) => {
                self.typing_stop(actor, origin, payload.room_id);
                Ok(())
            }
        };

        if let Err(err) = result {
            tracing::warn!(
                connection_id = %session.connection.id(),
                user_id = %actor.id,
                event = name,
                error = %err,
                "client event failed"
            );
            session.connection.send(ServerEvent::error(&err));
        }
    }

    /// 在房间锁内订阅发起连接、回执，再向包括加入者在内的全体订阅者广播
    pub async fn join_room(
        &self,
        actor: &UserSummary,
        origin: Option<&ConnectionHandle>,
        room_id: RoomId,
    ) -> Result<RoomView, ApplicationError> {
        self.rooms
            .join_room_with(room_id, actor.id, |room| {
                if let Some(connection) = origin {
                    self.registry.subscribe(connection.id(), room_id);
                    connection.send(ServerEvent::RoomJoined {
                        room_id,
                        name: room.name.as_str().to_string(),
                    });
                }
                self.registry.broadcast(
                    room_id,
                    &ServerEvent::UserJoined {
                        room_id,
                        user_id: actor.id,
                        display_name: actor.display_name.clone(),
                        timestamp: self.clock.now(),
                    },
                    None,
                );
            })
            .await
    }

    /// 该身份的所有连接都退订；只有成员关系确实变化时才向剩下的订阅者广播离开事件
    pub async fn leave_room(
        &self,
        actor: &UserSummary,
        origin: Option<&ConnectionHandle>,
        room_id: RoomId,
    ) -> Result<(), ApplicationError> {
        self.rooms
            .leave_room_with(room_id, actor.id, |changed| {
                self.registry.unsubscribe(actor.id, room_id);
                if let Some(connection) = origin {
                    connection.send(ServerEvent::RoomLeft { room_id });
                }
                if changed {
                    self.registry.broadcast(
                        room_id,
                        &ServerEvent::UserLeft {
                            room_id,
                            user_id: actor.id,
                            display_name: actor.display_name.clone(),
                            timestamp: self.clock.now(),
                        },
                        None,
                    );
                }
            })
            .await?;
        Ok(())
    }

    pub async fn send_message(
        &self,
        actor: &UserSummary,
        room_id: RoomId,
        content: String,
        message_type: MessageType,
    ) -> Result<MessageView, ApplicationError> {
        let message = self
            .rooms
            .send_message(SendMessageRequest {
                room_id,
                user_id: actor.id,
                content,
                message_type,
            })
            .await?;
        self.registry
            .broadcast(room_id, &ServerEvent::NewMessage(message.clone()), None);
        Ok(message)
    }

    /// 广播目标取消息所属的房间
    pub async fn edit_message(
        &self,
        actor: &UserSummary,
        message_id: MessageId,
        content: String,
    ) -> Result<MessageView, ApplicationError> {
        let message = self.rooms.edit_message(message_id, actor.id, content).await?;
        self.registry.broadcast(
            message.room_id,
            &ServerEvent::MessageEdited {
                id: message.id,
                room_id: message.room_id,
                content: message.content.clone(),
                edited_at: message.edited_at,
            },
            None,
        );
        Ok(message)
    }

    pub async fn delete_message(
        &self,
        actor: &UserSummary,
        message_id: MessageId,
    ) -> Result<(), ApplicationError> {
        let message = self.rooms.delete_message(message_id, actor.id).await?;
        self.registry.broadcast(
            message.room_id,
            &ServerEvent::MessageDeleted {
                message_id: message.id,
                room_id: message.room_id,
            },
            None,
        );
        Ok(())
    }

    pub fn typing_start(
        &self,
        actor: &UserSummary,
        origin: Option<&ConnectionHandle>,
        room_id: RoomId,
    ) {
        let delivered = self.registry.broadcast(
            room_id,
            &ServerEvent::UserTyping {
                room_id,
                user_id: actor.id,
                display_name: actor.display_name.clone(),
            },
            origin.map(ConnectionHandle::id),
        );
        tracing::debug!(room_id = %room_id, user_id = %actor.id, delivered, "typing started");
    }

    pub fn typing_stop(
        &self,
        actor: &UserSummary,
        origin: Option<&ConnectionHandle>,
        room_id: RoomId,
    ) {
        let delivered = self.registry.broadcast(
            room_id,
            &ServerEvent::UserStoppedTyping {
                room_id,
                user_id: actor.id,
            },
            origin.map(ConnectionHandle::id),
        );
        tracing::debug!(room_id = %room_id, user_id = %actor.id, delivered, "typing stopped");
    }
}
