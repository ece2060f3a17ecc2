//! 基础设施层实现。
//!
//! 提供 `RoomStore` 的内存与 PostgreSQL 两种适配器，以及连接池和迁移的装配。

pub mod builder;
pub mod memory;
pub mod migrations;
pub mod postgres;

pub use builder::{Infrastructure, InfrastructureError};
pub use memory::InMemoryRoomStore;
pub use migrations::MIGRATOR;
pub use postgres::{create_pg_pool, PgRoomStore};
