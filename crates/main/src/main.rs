//! 主应用程序入口
//!
//! 启动 Axum Web API 服务。默认连接 PostgreSQL；传入 `--in-memory` 时使用内存存储，
//! 并创建一个演示房间方便本地调试。

use std::sync::Arc;

use anyhow::Context;
use application::{
    CompletionGateway, ConversationPolicy, InMemoryMessageStore, MembershipOracle,
    MessageRepository, MessageService, MessageServiceDependencies, SequenceAllocator, SystemClock,
};
use config::AppConfig;
use domain::{RoomId, UserId};
use infrastructure::{HttpCompletionGateway, Infrastructure, InfrastructureConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use web_api::{router, AppState, JwtService, TokenIssuer};

struct Stores {
    message_repository: Arc<dyn MessageRepository>,
    sequence_allocator: Arc<dyn SequenceAllocator>,
    membership: Arc<dyn MembershipOracle>,
    completion_gateway: Arc<dyn CompletionGateway>,
}

async fn postgres_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );
    let infrastructure = Infrastructure::connect(InfrastructureConfig::from(config))
        .await
        .context("failed to initialise infrastructure")?;

    Ok(Stores {
        message_repository: infrastructure.message_repository(),
        sequence_allocator: infrastructure.sequence_allocator(),
        membership: infrastructure.membership(),
        completion_gateway: infrastructure.completion_gateway_trait(),
    })
}

async fn in_memory_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    let store = Arc::new(InMemoryMessageStore::new());
    let room_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    store.create_room(RoomId::from(room_id), 1).await;
    store
        .add_member(RoomId::from(room_id), UserId::from(user_id))
        .await;

    let token = TokenIssuer::new(&config.jwt)
        .issue(user_id)
        .context("failed to issue demo token")?;
    tracing::warn!(%room_id, %user_id, %token, "使用内存存储，已创建演示房间");

    let gateway = HttpCompletionGateway::new(
        config.llm.base_url.clone(),
        std::time::Duration::from_secs(config.llm.timeout_secs),
    )?;

    Ok(Stores {
        message_repository: store.clone(),
        sequence_allocator: store.clone(),
        membership: store,
        completion_gateway: Arc::new(gateway),
    })
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
    }
    tracing::info!("收到关闭信号，取消进行中的补全请求");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    if config.uses_development_secret() {
        tracing::warn!("正在使用开发环境 JWT 密钥，生产环境请设置 JWT_SECRET");
    }

    let jwt_service = Arc::new(JwtService::new(&config.jwt));
    let in_memory = std::env::args().any(|arg| arg == "--in-memory");

    let stores = if in_memory {
        in_memory_stores(&config).await?
    } else {
        postgres_stores(&config).await?
    };

    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        message_repository: stores.message_repository,
        sequence_allocator: stores.sequence_allocator,
        membership: stores.membership,
        completion_gateway: stores.completion_gateway,
        clock: Arc::new(SystemClock),
        policy: ConversationPolicy::from_config(&config),
    }));

    let shutdown = CancellationToken::new();
    let state = AppState::new(message_service, jwt_service, shutdown.clone());

    let app = router(state);
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("聊天室服务器启动在 http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}
