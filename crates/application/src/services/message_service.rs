//! 消息编排服务
//!
//! 负责人类消息的写入、游标分页，以及 AI 回复的生成与重新生成。
//! 发送 AI 消息时补全失败会写入占位消息；重新生成时补全失败直接返回错误，
//! 已有消息保持不变。

use std::sync::Arc;

use domain::{
    CompletionRequest, CursorPage, DomainError, Message, MessageContent, MessageId, MessageStatus,
    ModelInfo, RoomId, UserId,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::ApplicationError,
    gateway::{CompletionGateway, GatewayError},
    policy::ConversationPolicy,
    repository::{MembershipOracle, MessageRepository, SequenceAllocator},
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: Uuid,
    pub user_id: Uuid, // 发送者（从JWT获取）
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ListMessagesRequest {
    pub room_id: Uuid,
    pub user_id: Uuid,
    /// 上一页最后一条消息的 ID，原样来自调用方
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SendAiMessageRequest {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RegenerateAiMessageRequest {
    pub room_id: Uuid,
    pub user_id: Uuid,
    /// 触发 AI 回复的那条人类消息
    pub message_id: Uuid,
    pub model: String,
}

/// 一次 AI 对话的结果。AI 消息的 `status` 表示补全是否成功。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendAiMessageResult {
    pub human_message: Message,
    pub ai_message: Message,
}

pub struct MessageServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub sequence_allocator: Arc<dyn SequenceAllocator>,
    pub membership: Arc<dyn MembershipOracle>,
    pub completion_gateway: Arc<dyn CompletionGateway>,
    pub clock: Arc<dyn Clock>,
    pub policy: ConversationPolicy,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    // 非成员统一返回 Forbidden，不暴露房间是否存在
    async fn ensure_member(&self, room_id: RoomId, user_id: UserId) -> Result<(), ApplicationError> {
        match self.deps.membership.is_member(room_id, user_id).await {
            Ok(true) => Ok(()),
            Ok(false) | Err(domain::RepositoryError::NotFound) => Err(ApplicationError::Forbidden),
            Err(other) => Err(ApplicationError::Repository(other)),
        }
    }

    async fn allocate_sequence(&self, room_id: RoomId) -> Result<i64, ApplicationError> {
        self.deps
            .sequence_allocator
            .next(room_id)
            .await
            .map_err(|err| ApplicationError::from_repository(err, "room"))
    }

    pub async fn send_message(&self, request: SendMessageRequest) -> Result<Message, ApplicationError> {
        let room_id = RoomId::from(request.room_id);
        let user_id = UserId::from(request.user_id);

        self.ensure_member(room_id, user_id).await?;
        self.store_human_message(room_id, user_id, request.content)
            .await
    }

    async fn store_human_message(
        &self,
        room_id: RoomId,
        user_id: UserId,
        content: String,
    ) -> Result<Message, ApplicationError> {
        let content = MessageContent::new(content)?;

        let sequence = self.allocate_sequence(room_id).await?;
        let message = Message::human(
            MessageId::generate(),
            room_id,
            user_id,
            content,
            sequence,
            self.deps.clock.now(),
        );

        let stored = self.deps.message_repository.create(message).await?;
        info!(
            room_id = %room_id,
            message_id = %stored.id,
            sequence = stored.sequence,
            "消息已写入"
        );
        Ok(stored)
    }

    pub async fn list_messages(
        &self,
        request: ListMessagesRequest,
    ) -> Result<CursorPage, ApplicationError> {
        let room_id = RoomId::from(request.room_id);
        self.ensure_member(room_id, UserId::from(request.user_id))
            .await?;

        // 无法解析的游标与不存在的游标同样处理
        let cursor = match request.cursor.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(MessageId::from(
                Uuid::parse_str(raw).map_err(|_| ApplicationError::NotFound("cursor"))?,
            )),
        };

        let limit = self.deps.policy.clamp_limit(request.limit);
        self.deps
            .message_repository
            .list_by_room(room_id, cursor, limit)
            .await
            .map_err(|err| ApplicationError::from_repository(err, "cursor"))
    }

    pub async fn send_ai_message(
        &self,
        request: SendAiMessageRequest,
        cancel: &CancellationToken,
    ) -> Result<SendAiMessageResult, ApplicationError> {
        let room_id = RoomId::from(request.room_id);
        let user_id = UserId::from(request.user_id);

        self.ensure_member(room_id, user_id).await?;
        ensure_model(&request.model)?;

        let human_message = self
            .store_human_message(room_id, user_id, request.content)
            .await?;

        let context = self
            .deps
            .message_repository
            .list_by_room(room_id, None, self.deps.policy.context_window)
            .await?;
        let transcript = self.deps.policy.build_transcript(&context.messages);

        // 先占住 AI 回复的位置，再调用补全服务
        let ai_sequence = self.allocate_sequence(room_id).await?;
        let ai_id = MessageId::generate();

        let completion = CompletionRequest {
            model: request.model,
            messages: transcript,
            max_tokens: self.deps.policy.max_tokens,
            temperature: self.deps.policy.temperature,
        };

        let ai_message = match self.request_completion(completion, cancel).await {
            Ok(response) => {
                let message = Message::ai_completed(
                    ai_id,
                    room_id,
                    response.content,
                    ai_sequence,
                    self.deps.clock.now(),
                );
                let stored = self.deps.message_repository.create(message).await?;
                info!(
                    room_id = %room_id,
                    message_id = %stored.id,
                    sequence = stored.sequence,
                    model = %response.model,
                    prompt_tokens = response.prompt_tokens,
                    output_tokens = response.output_tokens,
                    "AI 回复已写入"
                );
                stored
            }
            Err(gateway_err) => {
                warn!(
                    room_id = %room_id,
                    sequence = ai_sequence,
                    error = %gateway_err,
                    "补全失败，写入占位消息"
                );
                let placeholder =
                    Message::ai_placeholder(ai_id, room_id, ai_sequence, self.deps.clock.now());
                match self.deps.message_repository.create(placeholder.clone()).await {
                    Ok(stored) => stored,
                    Err(store_err) => {
                        error!(
                            room_id = %room_id,
                            message_id = %ai_id,
                            error = %store_err,
                            "占位消息写入失败"
                        );
                        placeholder
                    }
                }
            }
        };

        Ok(SendAiMessageResult {
            human_message,
            ai_message,
        })
    }

    pub async fn regenerate_ai_message(
        &self,
        request: RegenerateAiMessageRequest,
        cancel: &CancellationToken,
    ) -> Result<Message, ApplicationError> {
        let room_id = RoomId::from(request.room_id);
        self.ensure_member(room_id, UserId::from(request.user_id))
            .await?;
        ensure_model(&request.model)?;

        let target = self
            .deps
            .message_repository
            .get_by_id(MessageId::from(request.message_id))
            .await
            .map_err(|err| ApplicationError::from_repository(err, "message"))?;
        if target.room_id != room_id {
            return Err(ApplicationError::NotFound("message"));
        }
        if !target.is_human() {
            return Err(ApplicationError::InvalidMessageType(
                "regeneration must target a human message",
            ));
        }

        let mut reply = self
            .deps
            .message_repository
            .get_next_in_room(room_id, target.sequence)
            .await
            .map_err(|err| ApplicationError::from_repository(err, "ai reply"))?;
        if !reply.is_ai() {
            return Err(ApplicationError::NotFound("ai reply"));
        }

        let context = self
            .deps
            .message_repository
            .list_by_room_up_to(room_id, target.sequence, self.deps.policy.context_window)
            .await?;

        let completion = CompletionRequest {
            model: request.model,
            messages: self.deps.policy.build_transcript(&context),
            max_tokens: self.deps.policy.max_tokens,
            temperature: self.deps.policy.temperature,
        };
        let response = self.request_completion(completion, cancel).await?;

        let now = self.deps.clock.now();
        self.deps
            .message_repository
            .update_ai_response(reply.id, response.content.clone(), MessageStatus::Completed, now)
            .await
            .map_err(|err| ApplicationError::from_repository(err, "ai reply"))?;
        reply.apply_regeneration(response.content, now)?;

        info!(
            room_id = %room_id,
            message_id = %reply.id,
            sequence = reply.sequence,
            model = %response.model,
            "AI 回复已重新生成"
        );
        Ok(reply)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ApplicationError> {
        Ok(self.deps.completion_gateway.list_models().await?)
    }

    async fn request_completion(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<domain::CompletionResponse, GatewayError> {
        let call = tokio::time::timeout(
            self.deps.policy.completion_timeout,
            self.deps.completion_gateway.complete(request),
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            outcome = call => match outcome {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout),
            },
        }
    }
}

fn ensure_model(model: &str) -> Result<(), DomainError> {
    if model.trim().is_empty() {
        return Err(DomainError::invalid_argument("model", "cannot be empty"));
    }
    Ok(())
}
