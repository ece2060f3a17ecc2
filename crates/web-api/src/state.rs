use std::sync::Arc;

use application::{RealtimeCoordinator, RoomService};

/// 路由共享状态。HTTP 与 WebSocket 走同一个 `RoomService`，变更经协调器扇出。
#[derive(Clone)]
pub struct AppState {
    pub room_service: Arc<RoomService>,
    pub coordinator: Arc<RealtimeCoordinator>,
}

impl AppState {
    pub fn new(room_service: Arc<RoomService>, coordinator: Arc<RealtimeCoordinator>) -> Self {
        Self {
            room_service,
            coordinator,
        }
    }
}
