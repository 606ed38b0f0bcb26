//! 主应用程序入口
//!
//! 装配事件存储、事件分发器和应用服务。传输层（gRPC/WebSocket）
//! 在独立的接入层挂接 `AppServices`。

use std::sync::Arc;

use application::{
    ChatService, ChatServiceDependencies, SubscriptionSettings, SystemClock, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, BcryptPasswordHasher, MemoryEventBroker, PgEventStore, PgUserRepository,
};
use tracing_subscriber::EnvFilter;

/// 聚合的应用服务，供接入层消费。
pub struct AppServices {
    pub users: UserService,
    pub chat: ChatService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取并校验配置
    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 创建适配器
    let user_repository = Arc::new(PgUserRepository::new(pg_pool.clone()));
    let event_store = Arc::new(PgEventStore::new(pg_pool));
    let broker = Arc::new(MemoryEventBroker::new(config.broker.channel_capacity));
    let password_hasher = Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost));
    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock);

    // 创建应用层服务
    let users = UserService::new(UserServiceDependencies {
        user_repository,
        password_hasher,
        clock: clock.clone(),
    });

    let chat = ChatService::new(ChatServiceDependencies {
        event_store,
        broker,
        clock,
        settings: SubscriptionSettings {
            backlog_limit: config.subscription.backlog_limit,
            live_buffer_capacity: config.subscription.live_buffer_capacity,
        },
    });

    let services = AppServices { users, chat };

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "chatstream 服务就绪"
    );

    // 等待停机信号；进行中的订阅由各自的取消信号收尾
    tokio::signal::ctrl_c().await?;
    tracing::info!("收到停机信号，退出");
    drop(services);

    Ok(())
}
