use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

/// A room never holds more than two live sockets; a third connect attempt
/// is refused so nobody can listen in on a pair's channel.
pub const ROOM_CAPACITY: usize = 2;

/// Outbound queue depth per socket. A recipient that can't drain this many
/// frames is treated as gone.
pub const SEND_QUEUE: usize = 32;

struct RoomHandle {
    id: u64,
    tx: mpsc::Sender<String>,
}

/// Live socket handles per chat room. One lock covers connect, disconnect
/// and the broadcast snapshot, which is the whole concurrency story: every
/// other structure in the engine is guarded by the database.
pub struct ConnectionRegistry {
    rooms: Mutex<HashMap<i64, Vec<RoomHandle>>>,
    order_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    next_handle: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            order_locks: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Serializes append-then-broadcast sequences within one room, so
    /// sockets always see frames in the id order storage assigned. Sends in
    /// other rooms are not held up.
    pub async fn order_lock(&self, room_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.order_locks.lock().await;
            Arc::clone(locks.entry(room_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Registers a sender under `room_id` and returns its handle id, or
    /// `None` when the room is already full. The caller owns the matching
    /// receiver and must call [`disconnect`](Self::disconnect) when the
    /// socket closes.
    pub async fn connect(&self, room_id: i64, tx: mpsc::Sender<String>) -> Option<u64> {
        let mut rooms = self.rooms.lock().await;
        let handles = rooms.entry(room_id).or_default();
        if handles.len() >= ROOM_CAPACITY {
            return None;
        }
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        handles.push(RoomHandle { id, tx });
        Some(id)
    }

    /// Removes the handle; the room entry itself goes away once empty so a
    /// reconnect is never refused against a ghost slot.
    pub async fn disconnect(&self, room_id: i64, handle_id: u64) {
        let mut rooms = self.rooms.lock().await;
        if let Some(handles) = rooms.get_mut(&room_id) {
            handles.retain(|h| h.id != handle_id);
            if handles.is_empty() {
                rooms.remove(&room_id);
                self.order_locks.lock().await.remove(&room_id);
            }
        }
    }

    /// Queues `payload` on every live handle in the room. Sends never block:
    /// a handle whose queue is closed or full is dropped on the spot, and
    /// delivery to the remaining handle still happens.
    pub async fn broadcast(&self, room_id: i64, payload: &str) {
        let mut rooms = self.rooms.lock().await;
        let Some(handles) = rooms.get_mut(&room_id) else {
            return;
        };
        handles.retain(|h| match h.tx.try_send(payload.to_owned()) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(room_id, handle = h.id, "dropping unresponsive socket");
                false
            }
        });
        if handles.is_empty() {
            rooms.remove(&room_id);
        }
    }

    pub async fn room_len(&self, room_id: i64) -> usize {
        self.rooms.lock().await.get(&room_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn third_connect_is_refused() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(SEND_QUEUE);
        let (tx2, mut rx2) = mpsc::channel(SEND_QUEUE);
        let (tx3, _rx3) = mpsc::channel(SEND_QUEUE);

        assert!(registry.connect(7, tx1).await.is_some());
        assert!(registry.connect(7, tx2).await.is_some());
        assert!(registry.connect(7, tx3).await.is_none());
        assert_eq!(registry.room_len(7).await, 2);

        // the two members are undisturbed by the refused attempt
        registry.broadcast(7, "hello").await;
        assert_eq!(rx1.recv().await.unwrap(), "hello");
        assert_eq!(rx2.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn disconnect_frees_the_slot() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(SEND_QUEUE);
        let (tx2, _rx2) = mpsc::channel(SEND_QUEUE);

        let h1 = registry.connect(3, tx1).await.unwrap();
        registry.connect(3, tx2).await.unwrap();

        registry.disconnect(3, h1).await;
        assert_eq!(registry.room_len(3).await, 1);

        let (tx3, _rx3) = mpsc::channel(SEND_QUEUE);
        assert!(registry.connect(3, tx3).await.is_some());
    }

    #[tokio::test]
    async fn empty_room_entry_is_removed() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(SEND_QUEUE);

        let h = registry.connect(5, tx).await.unwrap();
        registry.disconnect(5, h).await;

        assert!(registry.rooms.lock().await.get(&5).is_none());
    }

    #[tokio::test]
    async fn broadcast_preserves_order() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(SEND_QUEUE);
        registry.connect(1, tx).await.unwrap();

        registry.broadcast(1, "m1").await;
        registry.broadcast(1, "m2").await;
        registry.broadcast(1, "m3").await;

        assert_eq!(rx.recv().await.unwrap(), "m1");
        assert_eq!(rx.recv().await.unwrap(), "m2");
        assert_eq!(rx.recv().await.unwrap(), "m3");
    }

    #[tokio::test]
    async fn stale_handle_does_not_abort_delivery() {
        let registry = ConnectionRegistry::new();
        let (tx_dead, rx_dead) = mpsc::channel(SEND_QUEUE);
        let (tx_live, mut rx_live) = mpsc::channel(SEND_QUEUE);

        registry.connect(9, tx_dead).await.unwrap();
        registry.connect(9, tx_live).await.unwrap();
        drop(rx_dead);

        registry.broadcast(9, "still delivered").await;
        assert_eq!(rx_live.recv().await.unwrap(), "still delivered");
        assert_eq!(registry.room_len(9).await, 1);
    }

    #[tokio::test]
    async fn concurrent_connects_respect_capacity() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut joins = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            joins.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(SEND_QUEUE);
                registry.connect(42, tx).await.is_some()
            }));
        }

        let mut accepted = 0;
        for join in joins {
            if join.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, ROOM_CAPACITY);
        assert_eq!(registry.room_len(42).await, ROOM_CAPACITY);
    }
}
