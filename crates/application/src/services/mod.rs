mod room_locks;
mod room_service;

pub use room_service::{
    CreateRoomRequest, HistoryQuery, RoomService, RoomServiceDependencies, SendMessageRequest,
};
