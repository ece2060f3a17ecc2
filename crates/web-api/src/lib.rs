//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给房间服务与实时协调器。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;

pub use auth::{bearer_token, Claims, JwtService};
pub use config::JwtConfig;
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
