//! 主应用程序入口
//!
//! 装配会话注册表、投递调度器、扇出通道与各用例服务，启动 Axum
//! 服务。配置了 REDIS_URL 时使用跨进程 Redis 扇出（多实例部署），
//! 否则退化为单进程本地扇出。

use std::sync::Arc;

use application::{
    AuthService, AuthServiceDependencies, DeliveryDispatcher, InMemorySessionRegistry,
    LocalFanout, MessageFanout, MessageService, MessageServiceDependencies, RoomService,
    SessionRegistry, SystemClock, TokenIssuer, TokenVerifier,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, spawn_fanout_listener, BcryptPasswordHasher, JwtManager,
    PgMessageRepository, PgRefreshTokenRepository, PgRoomRepository, PgUserRepository,
    RedisFanout,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    if let Err(err) = config.validate() {
        tracing::warn!(error = %err, "配置校验未通过（开发模式继续运行）");
    }

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 仓储
    let user_repository = Arc::new(PgUserRepository::new(pg_pool.clone()));
    let room_repository = Arc::new(PgRoomRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pg_pool.clone()));
    let refresh_token_repository = Arc::new(PgRefreshTokenRepository::new(pg_pool));

    // 会话/扇出子系统
    let clock = Arc::new(SystemClock);
    let registry = Arc::new(InMemorySessionRegistry::new(clock.clone()));
    let dispatcher = Arc::new(DeliveryDispatcher::new(
        registry.clone() as Arc<dyn SessionRegistry>
    ));

    let fanout: Arc<dyn MessageFanout> = match &config.fanout.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            // 句柄丢弃即分离，订阅循环随进程存活
            let _listener = spawn_fanout_listener(
                client.clone(),
                dispatcher.clone(),
                config.fanout.channel.as_str(),
            );
            tracing::info!(channel = %config.fanout.channel, "跨进程 Redis 扇出已启用");
            Arc::new(RedisFanout::new(client, config.fanout.channel.as_str()))
        }
        None => {
            tracing::info!("未配置 REDIS_URL，使用单进程本地扇出");
            Arc::new(LocalFanout::new(dispatcher))
        }
    };

    // 令牌与密码
    let jwt_manager = Arc::new(JwtManager::new(
        &config.jwt.secret,
        chrono::Duration::minutes(config.jwt.access_token_minutes),
        chrono::Duration::days(config.jwt.refresh_token_days),
    ));
    let password_hasher = Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost));

    // 用例服务
    let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
        user_repository: user_repository.clone(),
        refresh_token_repository,
        password_hasher,
        token_issuer: jwt_manager.clone() as Arc<dyn TokenIssuer>,
        clock: clock.clone(),
    }));
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        room_repository: room_repository.clone(),
        message_repository,
        registry: registry.clone(),
        fanout,
        clock: clock.clone(),
    }));
    let room_service = Arc::new(RoomService::new(room_repository, clock));

    let state = AppState::new(
        auth_service,
        message_service,
        room_service,
        jwt_manager as Arc<dyn TokenVerifier>,
    );

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("消息服务启动在 http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
