use std::sync::Arc;

use application::{MembershipOracle, MessageRepository, SequenceAllocator};
use async_trait::async_trait;
use domain::{
    CursorPage, Message, MessageId, MessageKind, MessageStatus, RepositoryError, RoomId,
    Timestamp, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        other => RepositoryError::storage(other.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

const MESSAGE_COLUMNS: &str =
    "id, room_id, sender_id, content, kind, status, sequence, created_at, updated_at";

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_id: Uuid,
    sender_id: Option<Uuid>,
    content: String,
    kind: String,
    status: String,
    sequence: i64,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let kind = MessageKind::parse(&value.kind).map_err(|err| invalid_data(err.to_string()))?;
        let status =
            MessageStatus::parse(&value.status).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message {
            id: MessageId::from(value.id),
            room_id: RoomId::from(value.room_id),
            sender_id: value.sender_id.map(UserId::from),
            content: value.content,
            kind,
            status,
            sequence: value.sequence,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

fn into_messages(records: Vec<MessageRecord>) -> Result<Vec<Message>, RepositoryError> {
    records.into_iter().map(Message::try_from).collect()
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn cursor_sequence(
        &self,
        room_id: RoomId,
        cursor: MessageId,
    ) -> Result<i64, RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT sequence FROM messages WHERE id = $1 AND room_id = $2")
            .bind(Uuid::from(cursor))
            .bind(Uuid::from(room_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (id, room_id, sender_id, content, kind, status, sequence, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.room_id))
        .bind(message.sender_id.map(Uuid::from))
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.status.as_str())
        .bind(message.sequence)
        .bind(message.created_at)
        .bind(message.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn get_by_id(&self, id: MessageId) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Message::try_from(record)
    }

    async fn list_by_room(
        &self,
        room_id: RoomId,
        cursor: Option<MessageId>,
        limit: u32,
    ) -> Result<CursorPage, RepositoryError> {
        // 多取一条用来判断是否还有下一页
        let fetch = i64::from(limit) + 1;

        let records = match cursor {
            Some(cursor) => {
                let upper = self.cursor_sequence(room_id, cursor).await?;
                sqlx::query_as::<_, MessageRecord>(&format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS} FROM messages
                    WHERE room_id = $1 AND sequence < $2
                    ORDER BY sequence DESC
                    LIMIT $3
                    "#
                ))
                .bind(Uuid::from(room_id))
                .bind(upper)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, MessageRecord>(&format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS} FROM messages
                    WHERE room_id = $1
                    ORDER BY sequence DESC
                    LIMIT $2
                    "#
                ))
                .bind(Uuid::from(room_id))
                .bind(fetch)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx_err)?;

        Ok(CursorPage::from_overfetched(
            into_messages(records)?,
            limit as usize,
        ))
    }

    async fn list_by_room_up_to(
        &self,
        room_id: RoomId,
        max_sequence: i64,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE room_id = $1 AND sequence <= $2
            ORDER BY sequence DESC
            LIMIT $3
            "#
        ))
        .bind(Uuid::from(room_id))
        .bind(max_sequence)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        into_messages(records)
    }

    async fn get_next_in_room(
        &self,
        room_id: RoomId,
        after_sequence: i64,
    ) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE room_id = $1 AND sequence > $2
            ORDER BY sequence ASC
            LIMIT 1
            "#
        ))
        .bind(Uuid::from(room_id))
        .bind(after_sequence)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Message::try_from(record)
    }

    async fn update_ai_response(
        &self,
        id: MessageId,
        content: String,
        status: MessageStatus,
        updated_at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content = $2, status = $3, updated_at = $4
            WHERE id = $1 AND kind = 'ai'
            "#,
        )
        .bind(Uuid::from(id))
        .bind(content)
        .bind(status.as_str())
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// 基于 `room_sequences` 表的序号分配器
#[derive(Clone)]
pub struct PgSequenceAllocator {
    pool: PgPool,
}

impl PgSequenceAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建房时写入计数器；已存在时保持原值
    pub async fn initialize(&self, room_id: RoomId, start: i64) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO room_sequences (room_id, next_sequence)
            VALUES ($1, $2)
            ON CONFLICT (room_id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(start)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl SequenceAllocator for PgSequenceAllocator {
    async fn next(&self, room_id: RoomId) -> Result<i64, RepositoryError> {
        // 单条 UPDATE 由行锁串行化，不需要应用层加锁
        sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE room_sequences
            SET next_sequence = next_sequence + 1
            WHERE room_id = $1
            RETURNING next_sequence - 1
            "#,
        )
        .bind(Uuid::from(room_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)
    }
}

#[derive(Clone)]
pub struct PgRoomMemberRepository {
    pool: PgPool,
}

impl PgRoomMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn add_member(&self, room_id: RoomId, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO room_members (room_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(user_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl MembershipOracle for PgRoomMemberRepository {
    async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM room_members WHERE room_id = $1 AND user_id = $2)",
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }
}

pub struct PgStorage {
    pub pool: PgPool,
    pub message_repository: Arc<PgMessageRepository>,
    pub sequence_allocator: Arc<PgSequenceAllocator>,
    pub member_repository: Arc<PgRoomMemberRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            sequence_allocator: Arc::new(PgSequenceAllocator::new(pool.clone())),
            member_repository: Arc::new(PgRoomMemberRepository::new(pool.clone())),
            pool,
        }
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
