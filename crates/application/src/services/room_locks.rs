use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use domain::RoomId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// 每个房间一把互斥锁，保证成员集合的读-改-写是原子的。
///
/// 不同房间之间互不阻塞。
#[derive(Debug, Default)]
pub(crate) struct RoomLocks {
    locks: Mutex<HashMap<RoomId, Arc<AsyncMutex<()>>>>,
}

impl RoomLocks {
    pub(crate) async fn acquire(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() > PRUNE_THRESHOLD {
                // 只有 map 自己持有的锁才是空闲的
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(room_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
