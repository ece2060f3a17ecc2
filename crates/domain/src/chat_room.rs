use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{RoomId, Timestamp, UserId};

pub const DEFAULT_MAX_PARTICIPANTS: u32 = 50;
const MAX_PARTICIPANTS_LIMIT: u32 = 100;
const ROOM_NAME_MAX_CHARS: usize = 100;
const DESCRIPTION_MAX_CHARS: usize = 500;

/// 经过验证的房间名称（1-100 个字符）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("name", "cannot be empty"));
        }
        if value.chars().count() > ROOM_NAME_MAX_CHARS {
            return Err(DomainError::invalid_argument(
                "name",
                "must be at most 100 characters",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomName> for String {
    fn from(value: RoomName) -> Self {
        value.0
    }
}

/// 房间描述（最多 500 个字符）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomDescription(String);

impl RoomDescription {
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.chars().count() > DESCRIPTION_MAX_CHARS {
            return Err(DomainError::invalid_argument(
                "description",
                "must be at most 500 characters",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomDescription {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomDescription> for String {
    fn from(value: RoomDescription) -> Self {
        value.0
    }
}

/// 房间容量上限，取值 1-100。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RoomCapacity(u32);

impl RoomCapacity {
    pub fn new(value: u32) -> DomainResult<Self> {
        if !(1..=MAX_PARTICIPANTS_LIMIT).contains(&value) {
            return Err(DomainError::invalid_argument(
                "max_participants",
                "must be between 1 and 100",
            ));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for RoomCapacity {
    fn default() -> Self {
        Self(DEFAULT_MAX_PARTICIPANTS)
    }
}

impl TryFrom<u32> for RoomCapacity {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomCapacity> for u32 {
    fn from(value: RoomCapacity) -> Self {
        value.0
    }
}

/// 聊天室。
///
/// `participants` 与 `admins` 是两个独立集合：管理员离开房间后不再保留管理员身份。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: RoomName,
    pub description: Option<RoomDescription>,
    pub is_private: bool,
    pub max_participants: RoomCapacity,
    pub participants: BTreeSet<UserId>,
    pub admins: BTreeSet<UserId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 加入房间的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    Full,
}

impl Room {
    /// 创建房间，创建者同时成为唯一的参与者和管理员。
    pub fn create(
        id: RoomId,
        name: RoomName,
        description: Option<RoomDescription>,
        is_private: bool,
        max_participants: RoomCapacity,
        creator: UserId,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            name,
            description,
            is_private,
            max_participants,
            participants: BTreeSet::from([creator]),
            admins: BTreeSet::from([creator]),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_participants.get() as usize
    }

    /// 公开房间对所有人可见，私有房间只对参与者可见。
    pub fn is_visible_to(&self, user_id: Option<UserId>) -> bool {
        !self.is_private || user_id.is_some_and(|id| self.is_participant(id))
    }

    pub fn add_participant(&mut self, user_id: UserId, now: Timestamp) -> JoinOutcome {
        if self.is_participant(user_id) {
            return JoinOutcome::AlreadyMember;
        }
        if self.is_full() {
            return JoinOutcome::Full;
        }
        self.participants.insert(user_id);
        self.updated_at = now;
        JoinOutcome::Joined
    }

    /// 移除参与者身份和管理员身份，返回是否发生了变化。
    pub fn remove_member(&mut self, user_id: UserId, now: Timestamp) -> bool {
        let was_participant = self.participants.remove(&user_id);
        let was_admin = self.admins.remove(&user_id);
        let changed = was_participant || was_admin;
        if changed {
            self.updated_at = now;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn room_with_capacity(capacity: u32, creator: UserId) -> Room {
        Room::create(
            RoomId::generate(),
            RoomName::parse("general").unwrap(),
            None,
            false,
            RoomCapacity::new(capacity).unwrap(),
            creator,
            Utc::now(),
        )
    }

    #[test]
    fn creator_is_participant_and_admin() {
        let creator = UserId::generate();
        let room = room_with_capacity(10, creator);
        assert!(room.is_participant(creator));
        assert!(room.is_admin(creator));
        assert_eq!(room.participants.len(), 1);
    }

    #[test]
    fn join_respects_capacity_and_is_idempotent() {
        let creator = UserId::generate();
        let other = UserId::generate();
        let mut room = room_with_capacity(2, creator);

        assert_eq!(room.add_participant(other, Utc::now()), JoinOutcome::Joined);
        assert_eq!(
            room.add_participant(other, Utc::now()),
            JoinOutcome::AlreadyMember
        );
        assert_eq!(
            room.add_participant(UserId::generate(), Utc::now()),
            JoinOutcome::Full
        );
        assert_eq!(room.participants.len(), 2);
    }

    #[test]
    fn leaving_drops_admin_status() {
        let creator = UserId::generate();
        let mut room = room_with_capacity(5, creator);

        assert!(room.remove_member(creator, Utc::now()));
        assert!(!room.is_admin(creator));
        assert!(!room.remove_member(creator, Utc::now()));

        room.add_participant(creator, Utc::now());
        assert!(room.is_participant(creator));
        assert!(!room.is_admin(creator));
    }

    #[test]
    fn private_room_visibility() {
        let creator = UserId::generate();
        let mut room = room_with_capacity(5, creator);
        room.is_private = true;

        assert!(room.is_visible_to(Some(creator)));
        assert!(!room.is_visible_to(Some(UserId::generate())));
        assert!(!room.is_visible_to(None));
    }

    #[test]
    fn name_and_capacity_bounds() {
        assert!(RoomName::parse("   ").is_err());
        assert!(RoomName::parse("é".repeat(100)).is_ok());
        assert!(RoomName::parse("a".repeat(101)).is_err());
        assert!(RoomDescription::parse("d".repeat(501)).is_err());
        assert!(RoomCapacity::new(0).is_err());
        assert!(RoomCapacity::new(101).is_err());
        assert_eq!(RoomCapacity::default().get(), 50);
    }
}
