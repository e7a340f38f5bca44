//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：消息序号分配、分页查询，以及人类消息与
//! AI 回复的编排。外部依赖（存储、成员关系、补全服务、时钟）都通过 trait 抽象。

pub mod clock;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod policy;
pub mod repository;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use gateway::{CompletionGateway, GatewayError};
pub use memory::InMemoryMessageStore;
pub use policy::ConversationPolicy;
pub use repository::{MembershipOracle, MessageRepository, SequenceAllocator};
pub use services::{
    ListMessagesRequest, MessageService, MessageServiceDependencies, RegenerateAiMessageRequest,
    SendAiMessageRequest, SendAiMessageResult, SendMessageRequest,
};
