#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use application::{
    ConnectionRegistry, RealtimeCoordinator, RoomService, RoomServiceDependencies, SystemClock,
};
use axum::Router;
use config::ChatConfig;
use domain::{User, UserId};
use infrastructure::InMemoryRoomStore;
use tokio::{net::TcpListener, sync::oneshot};
use web_api::{router, AppState, JwtConfig, JwtService};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryRoomStore>,
    pub jwt: Arc<JwtService>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryRoomStore::new());
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "integration-test-secret-0123456789abcdef".to_string(),
            expiration_hours: 1,
        }));
        let rooms = Arc::new(RoomService::new(RoomServiceDependencies {
            store: store.clone(),
            clock: Arc::new(SystemClock),
            chat: ChatConfig::default(),
        }));
        let coordinator = Arc::new(RealtimeCoordinator::new(
            rooms.clone(),
            Arc::new(ConnectionRegistry::new()),
            jwt.clone(),
            Arc::new(SystemClock),
        ));

        Self {
            router: router(AppState::new(rooms, coordinator)),
            store,
            jwt,
        }
    }

    /// 预置用户并返回其令牌
    pub async fn user(&self, name: &str) -> (UserId, String) {
        self.user_with_status(name, true).await
    }

    pub async fn user_with_status(&self, name: &str, is_active: bool) -> (UserId, String) {
        let user = User::new(UserId::generate(), name, is_active);
        self.store.insert_user(user.clone()).await;
        let token = self.jwt.generate_token(user.id).expect("token");
        (user.id, token)
    }
}

pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl RunningServer {
    pub async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, query: &str) -> String {
        format!("ws://{}/api/v1/ws{}", self.addr, query)
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
