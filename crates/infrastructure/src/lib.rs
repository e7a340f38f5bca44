//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、序号分配器、成员关系查询和 LLM 网关客户端，
//! 实现应用层定义的接口。

pub mod builder;
pub mod llm_client;
pub mod migrations;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use llm_client::HttpCompletionGateway;
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgMessageRepository, PgRoomMemberRepository, PgSequenceAllocator, PgStorage,
};
