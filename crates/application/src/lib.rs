//! 应用层实现。
//!
//! 房间用例服务、连接注册表与实时协调器，以及它们依赖的端口（存储、时钟、身份校验）。

pub mod auth;
pub mod clock;
pub mod coordinator;
pub mod dto;
pub mod error;
pub mod events;
pub mod registry;
pub mod repository;
pub mod services;

pub use auth::IdentityVerifier;
pub use clock::{Clock, SystemClock};
pub use coordinator::{RealtimeCoordinator, Session};
pub use dto::{HistoryEntry, MessageView, RoomView, UserSummary};
pub use error::ApplicationError;
pub use events::{ClientEvent, ServerEvent};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use repository::{NewMessage, RoomStore};
pub use services::{
    CreateRoomRequest, HistoryQuery, RoomService, RoomServiceDependencies, SendMessageRequest,
};
