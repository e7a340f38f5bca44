//! 内存版存储：同时实现序号分配、消息仓储与成员关系查询。
//!
//! 用于测试和本地开发（`--in-memory`）。每个房间的计数器放在同一把写锁下自增，
//! 与 PostgreSQL 版本的单条 `UPDATE ... RETURNING` 语义一致。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

use async_trait::async_trait;
use domain::{
    CursorPage, Message, MessageId, MessageKind, MessageStatus, RepositoryError, RoomId,
    Timestamp, UserId,
};
use tokio::sync::RwLock;

use crate::repository::{MembershipOracle, MessageRepository, SequenceAllocator};

#[derive(Default)]
struct MessageTables {
    by_id: HashMap<MessageId, Message>,
    /// room_id -> (sequence -> message_id)
    by_room: HashMap<RoomId, BTreeMap<i64, MessageId>>,
}

impl MessageTables {
    fn collect(&self, ids: impl Iterator<Item = MessageId>) -> Vec<Message> {
        ids.filter_map(|id| self.by_id.get(&id).cloned()).collect()
    }
}

pub struct InMemoryMessageStore {
    sequences: RwLock<HashMap<RoomId, i64>>,
    messages: RwLock<MessageTables>,
    members: RwLock<HashSet<(RoomId, UserId)>>,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            sequences: RwLock::new(HashMap::new()),
            messages: RwLock::new(MessageTables::default()),
            members: RwLock::new(HashSet::new()),
        }
    }

    /// 初始化房间计数器，`start` 为第一次分配得到的序号
    pub async fn create_room(&self, room_id: RoomId, start: i64) {
        self.sequences.write().await.entry(room_id).or_insert(start);
    }

    pub async fn add_member(&self, room_id: RoomId, user_id: UserId) {
        self.members.write().await.insert((room_id, user_id));
    }

    pub async fn message_count(&self, room_id: RoomId) -> usize {
        self.messages
            .read()
            .await
            .by_room
            .get(&room_id)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl SequenceAllocator for InMemoryMessageStore {
    async fn next(&self, room_id: RoomId) -> Result<i64, RepositoryError> {
        let mut sequences = self.sequences.write().await;
        let counter = sequences
            .get_mut(&room_id)
            .ok_or(RepositoryError::NotFound)?;
        let allocated = *counter;
        *counter += 1;
        Ok(allocated)
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageStore {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut tables = self.messages.write().await;
        if tables.by_id.contains_key(&message.id) {
            return Err(RepositoryError::Conflict);
        }
        let index = tables.by_room.entry(message.room_id).or_default();
        if index.contains_key(&message.sequence) {
            return Err(RepositoryError::Conflict);
        }
        index.insert(message.sequence, message.id);
        tables.by_id.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_by_id(&self, id: MessageId) -> Result<Message, RepositoryError> {
        self.messages
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_by_room(
        &self,
        room_id: RoomId,
        cursor: Option<MessageId>,
        limit: u32,
    ) -> Result<CursorPage, RepositoryError> {
        let tables = self.messages.read().await;

        let upper = match cursor {
            Some(cursor_id) => {
                let cursor_message = tables
                    .by_id
                    .get(&cursor_id)
                    .filter(|message| message.room_id == room_id)
                    .ok_or(RepositoryError::NotFound)?;
                Bound::Excluded(cursor_message.sequence)
            }
            None => Bound::Unbounded,
        };

        let Some(index) = tables.by_room.get(&room_id) else {
            return Ok(CursorPage::default());
        };

        let rows = tables.collect(
            index
                .range((Bound::Unbounded, upper))
                .rev()
                .take(limit as usize + 1)
                .map(|(_, id)| *id),
        );
        Ok(CursorPage::from_overfetched(rows, limit as usize))
    }

    async fn list_by_room_up_to(
        &self,
        room_id: RoomId,
        max_sequence: i64,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.messages.read().await;
        let Some(index) = tables.by_room.get(&room_id) else {
            return Ok(Vec::new());
        };
        Ok(tables.collect(
            index
                .range(..=max_sequence)
                .rev()
                .take(limit as usize)
                .map(|(_, id)| *id),
        ))
    }

    async fn get_next_in_room(
        &self,
        room_id: RoomId,
        after_sequence: i64,
    ) -> Result<Message, RepositoryError> {
        let tables = self.messages.read().await;
        tables
            .by_room
            .get(&room_id)
            .and_then(|index| {
                index
                    .range((Bound::Excluded(after_sequence), Bound::Unbounded))
                    .next()
            })
            .and_then(|(_, id)| tables.by_id.get(id).cloned())
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_ai_response(
        &self,
        id: MessageId,
        content: String,
        status: MessageStatus,
        updated_at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.messages.write().await;
        let message = tables
            .by_id
            .get_mut(&id)
            .filter(|message| message.kind == MessageKind::Ai)
            .ok_or(RepositoryError::NotFound)?;
        message.content = content;
        message.status = status;
        message.updated_at = updated_at;
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError> {
        let mut tables = self.messages.write().await;
        let removed = tables.by_id.remove(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(index) = tables.by_room.get_mut(&removed.room_id) {
            index.remove(&removed.sequence);
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipOracle for InMemoryMessageStore {
    async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.members.read().await.contains(&(room_id, user_id)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::MessageContent;
    use uuid::Uuid;

    use super::*;

    async fn seeded_room(store: &InMemoryMessageStore, count: i64) -> (RoomId, Vec<Message>) {
        let room_id = RoomId::from(Uuid::new_v4());
        let user_id = UserId::from(Uuid::new_v4());
        store.create_room(room_id, 0).await;

        let mut created = Vec::new();
        for i in 0..count {
            let sequence = store.next(room_id).await.unwrap();
            let message = Message::human(
                MessageId::generate(),
                room_id,
                user_id,
                MessageContent::new(format!("message {i}")).unwrap(),
                sequence,
                Utc::now(),
            );
            created.push(store.create(message).await.unwrap());
        }
        (room_id, created)
    }

    fn sequences(messages: &[Message]) -> Vec<i64> {
        messages.iter().map(|m| m.sequence).collect()
    }

    #[tokio::test]
    async fn allocator_requires_seeded_room() {
        let store = InMemoryMessageStore::new();
        let room_id = RoomId::from(Uuid::new_v4());
        assert_eq!(store.next(room_id).await, Err(RepositoryError::NotFound));

        store.create_room(room_id, 1).await;
        assert_eq!(store.next(room_id).await, Ok(1));
        assert_eq!(store.next(room_id).await, Ok(2));
    }

    #[tokio::test]
    async fn pagination_walks_history_without_gaps() {
        let store = InMemoryMessageStore::new();
        let (room_id, created) = seeded_room(&store, 25).await;

        let page1 = store.list_by_room(room_id, None, 10).await.unwrap();
        assert_eq!(sequences(&page1.messages), (15..=24).rev().collect::<Vec<_>>());
        assert_eq!(page1.next_cursor, Some(created[15].id));

        let page2 = store
            .list_by_room(room_id, page1.next_cursor, 10)
            .await
            .unwrap();
        assert_eq!(sequences(&page2.messages), (5..=14).rev().collect::<Vec<_>>());
        assert_eq!(page2.next_cursor, Some(created[5].id));

        let page3 = store
            .list_by_room(room_id, page2.next_cursor, 10)
            .await
            .unwrap();
        assert_eq!(sequences(&page3.messages), (0..=4).rev().collect::<Vec<_>>());
        assert_eq!(page3.next_cursor, None);
    }

    #[tokio::test]
    async fn exact_page_size_has_no_cursor() {
        let store = InMemoryMessageStore::new();
        let (room_id, _) = seeded_room(&store, 10).await;

        let page = store.list_by_room(room_id, None, 10).await.unwrap();
        assert_eq!(page.messages.len(), 10);
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn cursor_from_another_room_is_not_found() {
        let store = InMemoryMessageStore::new();
        let (room_a, _) = seeded_room(&store, 3).await;
        let (_, other) = seeded_room(&store, 3).await;

        let result = store.list_by_room(room_a, Some(other[0].id), 10).await;
        assert_eq!(result, Err(RepositoryError::NotFound));

        let result = store
            .list_by_room(room_a, Some(MessageId::generate()), 10)
            .await;
        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn up_to_and_next_queries() {
        let store = InMemoryMessageStore::new();
        let (room_id, _) = seeded_room(&store, 6).await;

        let upto = store.list_by_room_up_to(room_id, 3, 2).await.unwrap();
        assert_eq!(sequences(&upto), vec![3, 2]);

        let next = store.get_next_in_room(room_id, 3).await.unwrap();
        assert_eq!(next.sequence, 4);

        assert_eq!(
            store.get_next_in_room(room_id, 5).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn duplicates_and_missing_rows() {
        let store = InMemoryMessageStore::new();
        let (room_id, created) = seeded_room(&store, 2).await;

        assert_eq!(
            store.create(created[0].clone()).await,
            Err(RepositoryError::Conflict)
        );

        // 人类消息不能走 AI 更新路径
        assert_eq!(
            store
                .update_ai_response(
                    created[0].id,
                    "x".into(),
                    MessageStatus::Completed,
                    Utc::now()
                )
                .await,
            Err(RepositoryError::NotFound)
        );

        store.delete(created[1].id).await.unwrap();
        assert_eq!(store.message_count(room_id).await, 1);
        assert_eq!(
            store.delete(created[1].id).await,
            Err(RepositoryError::NotFound)
        );
        assert_eq!(
            store.get_by_id(created[1].id).await,
            Err(RepositoryError::NotFound)
        );
    }
}
