//! 内存中的连接注册表
//!
//! 维护 身份 → 连接、房间 → 连接 两个互逆索引，两者在同一把锁内一起更新。
//! 广播时先在锁内复制订阅者快照，释放锁后再逐个投递。

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use domain::{RoomId, UserId};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::ServerEvent;

/// 单个传输连接的标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 连接的出站句柄。投递不会阻塞；连接关闭后投递静默失败。
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(user_id: UserId) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            id: ConnectionId::generate(),
            user_id,
            sender,
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

#[derive(Debug)]
struct ConnectionEntry {
    handle: ConnectionHandle,
    rooms: HashSet<RoomId>,
}

#[derive(Debug, Default)]
struct RegistryIndex {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    by_identity: HashMap<UserId, HashSet<ConnectionId>>,
    by_room: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl RegistryIndex {
    fn remove_from_room(&mut self, room_id: RoomId, connection_id: ConnectionId) {
        if let Some(members) = self.by_room.get_mut(&room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.by_room.remove(&room_id);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    index: Mutex<RegistryIndex>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // 临界区内不会 panic，中毒后的数据仍然一致
    fn index(&self) -> MutexGuard<'_, RegistryIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach(&self, handle: ConnectionHandle) {
        let mut index = self.index();
        index
            .by_identity
            .entry(handle.user_id)
            .or_default()
            .insert(handle.id);
        index.connections.insert(
            handle.id,
            ConnectionEntry {
                handle,
                rooms: HashSet::new(),
            },
        );
    }

    /// 从身份索引和所有房间订阅中移除连接，返回它曾订阅的房间
    pub fn detach(&self, connection_id: ConnectionId) -> Vec<RoomId> {
        let mut index = self.index();
        let Some(entry) = index.connections.remove(&connection_id) else {
            return Vec::new();
        };

        let user_id = entry.handle.user_id;
        if let Some(connections) = index.by_identity.get_mut(&user_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                index.by_identity.remove(&user_id);
            }
        }
        for room_id in &entry.rooms {
            index.remove_from_room(*room_id, connection_id);
        }
        entry.rooms.into_iter().collect()
    }

    /// 连接已经断开时返回 false
    pub fn subscribe(&self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        let mut index = self.index();
        let Some(entry) = index.connections.get_mut(&connection_id) else {
            return false;
        };
        entry.rooms.insert(room_id);
        index
            .by_room
            .entry(room_id)
            .or_default()
            .insert(connection_id);
        true
    }

    /// 取消该身份所有连接对房间的订阅，返回受影响的连接数
    pub fn unsubscribe(&self, user_id: UserId, room_id: RoomId) -> usize {
        let mut index = self.index();
        let connection_ids: Vec<ConnectionId> = index
            .by_identity
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for connection_id in connection_ids {
            let subscribed = index
                .connections
                .get_mut(&connection_id)
                .is_some_and(|entry| entry.rooms.remove(&room_id));
            if subscribed {
                index.remove_from_room(room_id, connection_id);
                removed += 1;
            }
        }
        removed
    }

    /// 当前订阅房间的连接快照
    pub fn members_of(&self, room_id: RoomId) -> Vec<ConnectionHandle> {
        let index = self.index();
        index
            .by_room
            .get(&room_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| index.connections.get(id))
                    .map(|entry| entry.handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn connections_of(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        let index = self.index();
        index
            .by_identity
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| index.connections.get(id))
                    .map(|entry| entry.handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 该身份任一连接当前订阅的房间
    pub fn rooms_of(&self, user_id: UserId) -> BTreeSet<RoomId> {
        let index = self.index();
        index
            .by_identity
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| index.connections.get(id))
            .flat_map(|entry| entry.rooms.iter().copied())
            .collect()
    }

    pub fn is_subscribed(&self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        self.index()
            .connections
            .get(&connection_id)
            .is_some_and(|entry| entry.rooms.contains(&room_id))
    }

    pub fn connection_count(&self) -> usize {
        self.index().connections.len()
    }

    /// 向房间快照投递事件，返回成功投递的连接数
    pub fn broadcast(
        &self,
        room_id: RoomId,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let recipients = self.members_of(room_id);
        let delivered = recipients
            .iter()
            .filter(|handle| Some(handle.id) != exclude)
            .filter(|handle| handle.send(event.clone()))
            .count();
        tracing::debug!(
            room_id = %room_id,
            recipients = recipients.len(),
            delivered,
            "room broadcast"
        );
        delivered
    }
}
