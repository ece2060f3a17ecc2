use std::collections::{BTreeSet, HashMap};

use application::{NewMessage, RoomStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Message, MessageContent, MessageId, MessageType, RepositoryError, Room, RoomCapacity,
    RoomDescription, RoomId, RoomName, User, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let Some(db_err) = err.as_database_error() {
        match db_err.code().as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => return RepositoryError::NotFound,
            Some(UNIQUE_VIOLATION) => return RepositoryError::Conflict,
            _ => {}
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    display_name: String,
    is_active: bool,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        User::new(UserId::from(value.id), value.display_name, value.is_active)
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    name: String,
    description: Option<String>,
    is_private: bool,
    max_participants: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct MembershipRecord {
    room_id: Uuid,
    user_id: Uuid,
}

#[derive(Debug, Default)]
struct Membership {
    participants: BTreeSet<UserId>,
    admins: BTreeSet<UserId>,
}

impl RoomRecord {
    fn into_room(self, membership: Membership) -> Result<Room, RepositoryError> {
        let name = RoomName::parse(self.name).map_err(|err| invalid_data(err.to_string()))?;
        let description = self
            .description
            .map(RoomDescription::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let capacity = u32::try_from(self.max_participants)
            .map_err(|err| invalid_data(err.to_string()))
            .and_then(|value| {
                RoomCapacity::new(value).map_err(|err| invalid_data(err.to_string()))
            })?;

        Ok(Room {
            id: RoomId::from(self.id),
            name,
            description,
            is_private: self.is_private,
            max_participants: capacity,
            participants: membership.participants,
            admins: membership.admins,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_id: Uuid,
    user_id: Uuid,
    content: String,
    message_type: String,
    is_edited: bool,
    edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        let message_type = value
            .message_type
            .parse::<MessageType>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message {
            id: MessageId::from(value.id),
            room_id: RoomId::from(value.room_id),
            user_id: UserId::from(value.user_id),
            content,
            message_type,
            is_edited: value.is_edited,
            edited_at: value.edited_at,
            created_at: value.created_at,
        })
    }
}

const MESSAGE_COLUMNS: &str =
    "id, room_id, user_id, content, message_type, is_edited, edited_at, created_at";
const ROOM_COLUMNS: &str =
    "id, name, description, is_private, max_participants, created_at, updated_at";

fn uuids(ids: &BTreeSet<UserId>) -> Vec<Uuid> {
    ids.iter().map(|id| Uuid::from(*id)).collect()
}

#[derive(Clone)]
pub struct PgRoomStore {
    pool: PgPool,
}

impl PgRoomStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_memberships(
        &self,
        room_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Membership>, RepositoryError> {
        let mut memberships: HashMap<Uuid, Membership> = HashMap::new();

        let participants = sqlx::query_as::<_, MembershipRecord>(
            "SELECT room_id, user_id FROM room_participants WHERE room_id = ANY($1)",
        )
        .bind(room_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        for record in participants {
            memberships
                .entry(record.room_id)
                .or_default()
                .participants
                .insert(UserId::from(record.user_id));
        }

        let admins = sqlx::query_as::<_, MembershipRecord>(
            "SELECT room_id, user_id FROM room_admins WHERE room_id = ANY($1)",
        )
        .bind(room_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        for record in admins {
            memberships
                .entry(record.room_id)
                .or_default()
                .admins
                .insert(UserId::from(record.user_id));
        }

        Ok(memberships)
    }

    async fn hydrate(&self, records: Vec<RoomRecord>) -> Result<Vec<Room>, RepositoryError> {
        let ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();
        let mut memberships = self.load_memberships(&ids).await?;
        records
            .into_iter()
            .map(|record| {
                let membership = memberships.remove(&record.id).unwrap_or_default();
                record.into_room(membership)
            })
            .collect()
    }

    /// 在同一事务内用房间当前的两个集合覆盖成员表
    async fn write_membership(
        tx: &mut Transaction<'_, Postgres>,
        room: &Room,
    ) -> Result<(), RepositoryError> {
        let room_id = Uuid::from(room.id);

        sqlx::query("DELETE FROM room_participants WHERE room_id = $1 AND NOT (user_id = ANY($2))")
            .bind(room_id)
            .bind(uuids(&room.participants))
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query(
            r#"
            INSERT INTO room_participants (room_id, user_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(uuids(&room.participants))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query("DELETE FROM room_admins WHERE room_id = $1")
            .bind(room_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query("INSERT INTO room_admins (room_id, user_id) SELECT $1, UNNEST($2::uuid[])")
            .bind(room_id)
            .bind(uuids(&room.admins))
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_err)?;

        Ok(())
    }
}

#[async_trait]
impl RoomStore for PgRoomStore {
    async fn create_room(&self, room: Room) -> Result<Room, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            INSERT INTO rooms (id, name, description, is_private, max_participants, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(room.name.as_str())
        .bind(room.description.as_ref().map(|description| description.as_str()))
        .bind(room.is_private)
        .bind(room.max_participants.get() as i32)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        Self::write_membership(&mut tx, &room).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(room)
    }

    async fn get_room(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => Ok(self.hydrate(vec![record]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn save_room(&self, room: Room) -> Result<Room, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // UPDATE 持有行锁直到提交，同一房间的成员写入因此串行
        let updated = sqlx::query(
            r#"
            UPDATE rooms
            SET name = $2, description = $3, is_private = $4, max_participants = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(room.name.as_str())
        .bind(room.description.as_ref().map(|description| description.as_str()))
        .bind(room.is_private)
        .bind(room.max_participants.get() as i32)
        .bind(room.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Self::write_membership(&mut tx, &room).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(room)
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        self.hydrate(records).await
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (id, room_id, user_id, content, message_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.room_id))
        .bind(Uuid::from(message.user_id))
        .bind(message.content.as_str())
        .bind(message.message_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .map(Message::try_from)
        .transpose()
    }

    async fn save_message(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages
            SET content = $2, is_edited = $3, edited_at = $4
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(message.content.as_str())
        .bind(message.is_edited)
        .bind(message.edited_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Message::try_from(record)
    }

    async fn delete_message(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_messages(
        &self,
        room_id: RoomId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE room_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(Uuid::from(room_id))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }

    async fn latest_message(&self, room_id: RoomId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.list_messages(room_id, 1, 0).await?.pop())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, display_name, is_active FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(User::from))
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| Uuid::from(*id)).collect();
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT id, display_name, is_active FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(User::from).collect())
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
