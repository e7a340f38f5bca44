//! HTTP 请求体与响应体

use domain::{Message, MessageId, ModelInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SendMessagePayload {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendAiMessagePayload {
    pub content: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct RegeneratePayload {
    pub model: String,
}

/// 游标保持字符串形式，无法解析时按"游标不存在"处理
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MessagePageResponse {
    pub messages: Vec<Message>,
    pub next_cursor: Option<MessageId>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}
