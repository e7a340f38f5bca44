//! 会话策略：分页大小、AI 上下文窗口与角色映射

use std::time::Duration;

use config::AppConfig;
use domain::{ChatMessage, Message, MessageKind};

#[derive(Debug, Clone)]
pub struct ConversationPolicy {
    pub context_window: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub human_role: String,
    pub ai_role: String,
    pub completion_timeout: Duration,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for ConversationPolicy {
    fn default() -> Self {
        Self {
            context_window: 50,
            default_page_size: 20,
            max_page_size: 100,
            human_role: "user".to_string(),
            ai_role: "assistant".to_string(),
            completion_timeout: Duration::from_secs(60),
            max_tokens: None,
            temperature: None,
        }
    }
}

impl ConversationPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            context_window: config.chat.context_window,
            default_page_size: config.chat.default_page_size,
            max_page_size: config.chat.max_page_size,
            human_role: config.chat.human_role.clone(),
            ai_role: config.chat.ai_role.clone(),
            completion_timeout: Duration::from_secs(config.llm.timeout_secs),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        }
    }

    /// 未设置、为 0 或超过上限时使用默认页大小
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(limit) if limit > 0 && limit <= self.max_page_size => limit,
            _ => self.default_page_size,
        }
    }

    pub fn role_for(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Human => &self.human_role,
            MessageKind::Ai => &self.ai_role,
        }
    }

    /// 把倒序排列的消息转换成按时间正序的对话上下文。
    ///
    /// 失败的占位消息没有内容，不会发给补全服务。
    pub fn build_transcript(&self, newest_first: &[Message]) -> Vec<ChatMessage> {
        newest_first
            .iter()
            .rev()
            .filter(|message| !message.is_failed())
            .map(|message| ChatMessage::new(self.role_for(message.kind), message.content.clone()))
            .collect()
    }
}
