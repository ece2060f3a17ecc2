//! 主应用程序入口
//!
//! 读取配置、连接数据库并执行迁移，然后启动 HTTP / WebSocket 服务。

use std::sync::Arc;

use application::{
    Clock, ConnectionRegistry, RealtimeCoordinator, RoomService, RoomServiceDependencies,
    SystemClock,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;
    config.validate()?;

    let infrastructure = Infrastructure::connect(&config.database).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let room_service = Arc::new(RoomService::new(RoomServiceDependencies {
        store: infrastructure.store.clone(),
        clock: clock.clone(),
        chat: config.chat,
    }));
    let coordinator = Arc::new(RealtimeCoordinator::new(
        room_service.clone(),
        Arc::new(ConnectionRegistry::new()),
        Arc::new(JwtService::new(config.jwt.clone())),
        clock,
    ));

    let app = router(AppState::new(room_service, coordinator));
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(%address, "chat server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
