use async_trait::async_trait;
use domain::{
    CursorPage, Message, MessageId, MessageStatus, RepositoryError, RoomId, Timestamp, UserId,
};

/// 每个房间一个单调递增计数器。
///
/// 实现必须是单次原子的"自增并取值"，不能在应用层先读后写。
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// 房间计数器未初始化时返回 `RepositoryError::NotFound`
    async fn next(&self, room_id: RoomId) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化新消息；ID 或 (room_id, sequence) 重复时返回 `Conflict`
    async fn create(&self, message: Message) -> Result<Message, RepositoryError>;

    async fn get_by_id(&self, id: MessageId) -> Result<Message, RepositoryError>;

    // 按序号倒序分页。cursor 为空时从最新消息开始，否则只返回序号严格小于游标消息的记录；
    // 游标不属于该房间时返回 NotFound
    async fn list_by_room(
        &self,
        room_id: RoomId,
        cursor: Option<MessageId>,
        limit: u32,
    ) -> Result<CursorPage, RepositoryError>;

    // 序号 <= max_sequence 的最多 limit 条消息，倒序
    async fn list_by_room_up_to(
        &self,
        room_id: RoomId,
        max_sequence: i64,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    // 序号严格大于 after_sequence 的第一条消息
    async fn get_next_in_room(
        &self,
        room_id: RoomId,
        after_sequence: i64,
    ) -> Result<Message, RepositoryError>;

    /// 原地更新 AI 消息的内容、状态与更新时间
    async fn update_ai_response(
        &self,
        id: MessageId,
        content: String,
        status: MessageStatus,
        updated_at: Timestamp,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, id: MessageId) -> Result<(), RepositoryError>;
}

/// 房间成员关系查询，由房间管理模块维护
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError>;
}
