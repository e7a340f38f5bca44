//! 多人 AI 聊天室核心领域模型
//!
//! 包含消息、分页游标、对话上下文等实体，以及仓储层与领域层共用的错误类型。

pub mod completion;
pub mod errors;
pub mod message;
pub mod value_objects;

// 重新导出常用类型
pub use completion::*;
pub use errors::*;
pub use message::*;
pub use value_objects::*;
