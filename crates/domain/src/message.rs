use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 消息作者类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Human,
    Ai,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "human" => Ok(Self::Human),
            "ai" => Ok(Self::Ai),
            other => Err(DomainError::invalid_argument(
                "message_kind",
                format!("unknown kind: {other}"),
            )),
        }
    }
}

/// 消息状态，只对 AI 消息有意义；人类消息总是 `Completed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Completed,
    /// 占位消息：内容为空，仅用于保留排序位置
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::invalid_argument(
                "message_status",
                format!("unknown status: {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    /// AI 消息没有发送者
    pub sender_id: Option<UserId>,
    pub content: String,
    pub kind: MessageKind,
    pub status: MessageStatus,
    /// 房间内唯一且只在创建时分配一次
    pub sequence: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    pub fn human(
        id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        content: MessageContent,
        sequence: i64,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id: Some(sender_id),
            content: content.into_inner(),
            kind: MessageKind::Human,
            status: MessageStatus::Completed,
            sequence,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ai_completed(
        id: MessageId,
        room_id: RoomId,
        content: impl Into<String>,
        sequence: i64,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id: None,
            content: content.into(),
            kind: MessageKind::Ai,
            status: MessageStatus::Completed,
            sequence,
            created_at: now,
            updated_at: now,
        }
    }

    /// AI 调用失败时写入的占位消息
    pub fn ai_placeholder(id: MessageId, room_id: RoomId, sequence: i64, now: Timestamp) -> Self {
        Self {
            id,
            room_id,
            sender_id: None,
            content: String::new(),
            kind: MessageKind::Ai,
            status: MessageStatus::Failed,
            sequence,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_human(&self) -> bool {
        self.kind == MessageKind::Human
    }

    pub fn is_ai(&self) -> bool {
        self.kind == MessageKind::Ai
    }

    pub fn is_failed(&self) -> bool {
        self.status == MessageStatus::Failed
    }

    /// 原地替换 AI 回复内容。`id`、`sequence`、`created_at` 保持不变。
    pub fn apply_regeneration(
        &mut self,
        content: impl Into<String>,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        if !self.is_ai() {
            return Err(DomainError::NotAnAiMessage);
        }
        self.content = content.into();
        self.status = MessageStatus::Completed;
        self.updated_at = at;
        Ok(())
    }
}

/// 按序号倒序排列的一页消息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPage {
    pub messages: Vec<Message>,
    /// 仅当还有更早的消息时存在，等于本页最后一条消息的 ID
    pub next_cursor: Option<MessageId>,
}

impl CursorPage {
    /// 从多取一条的查询结果构造分页：`rows` 已按序号倒序排列。
    pub fn from_overfetched(mut rows: Vec<Message>, limit: usize) -> Self {
        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().map(|message| message.id)
        } else {
            None
        };

        Self {
            messages: rows,
            next_cursor,
        }
    }
}
