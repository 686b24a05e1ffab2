//! Persistence port: a narrow interface over the durable
//! store. The core never blocks the apply path on this — failures are logged
//! and swallowed, never surfaced to clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PersistenceError;
use crate::ot::Operation;
use crate::protocol::Cursor;

/// A durably stored `{version, content}` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub version: u64,
    pub content: String,
}

/// Metadata attached to a snapshot write, for audit/debugging purposes only.
#[derive(Debug, Clone, Default)]
pub struct SnapshotMeta {
    pub updated_by: Option<String>,
}

/// A stored cursor, keyed by `userId` within a room.
#[derive(Debug, Clone)]
pub struct StoredCursor {
    pub user_id: String,
    pub cursor: Cursor,
}

/// The durable-store interface the core depends on. All
/// methods are async and infallible-to-the-caller in spirit: a `RoomManager`
/// logs and moves on when these return `Err`.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    async fn save_snapshot(
        &self,
        room_id: &str,
        version: u64,
        content: &str,
        meta: SnapshotMeta,
    ) -> Result<(), PersistenceError>;

    async fn load_latest_snapshot(&self, room_id: &str) -> Result<Option<StoredSnapshot>, PersistenceError>;

    /// Best-effort async append; must never block the apply path.
    async fn append_operation(&self, room_id: &str, op: &Operation) -> Result<(), PersistenceError>;

    async fn load_operations_since(&self, room_id: &str, version: u64) -> Result<Vec<Operation>, PersistenceError>;

    async fn save_cursor(&self, room_id: &str, user_id: &str, cursor: Cursor) -> Result<(), PersistenceError>;

    async fn load_cursors(&self, room_id: &str) -> Result<Vec<StoredCursor>, PersistenceError>;
}

/// An in-memory reference implementation, used in tests and as a default for
/// deployments that don't wire in a real store. Archival TTLs for snapshots,
/// operations, and cursors are the durable store's job, not this reference's;
/// this implementation keeps everything indefinitely.
#[derive(Default)]
pub struct InMemoryPersistence {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    snapshots: HashMap<String, (StoredSnapshot, SystemTime)>,
    operations: HashMap<String, Vec<Operation>>,
    cursors: HashMap<String, HashMap<String, Cursor>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn save_snapshot(
        &self,
        room_id: &str,
        version: u64,
        content: &str,
        _meta: SnapshotMeta,
    ) -> Result<(), PersistenceError> {
        let mut state = self.inner.lock();
        state.snapshots.insert(
            room_id.to_string(),
            (StoredSnapshot { version, content: content.to_string() }, SystemTime::now()),
        );
        Ok(())
    }

    async fn load_latest_snapshot(&self, room_id: &str) -> Result<Option<StoredSnapshot>, PersistenceError> {
        Ok(self.inner.lock().snapshots.get(room_id).map(|(s, _)| s.clone()))
    }

    async fn append_operation(&self, room_id: &str, op: &Operation) -> Result<(), PersistenceError> {
        self.inner.lock().operations.entry(room_id.to_string()).or_default().push(op.clone());
        Ok(())
    }

    async fn load_operations_since(&self, room_id: &str, version: u64) -> Result<Vec<Operation>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .operations
            .get(room_id)
            .map(|ops| ops.iter().filter(|o| o.base_version >= version).cloned().collect())
            .unwrap_or_default())
    }

    async fn save_cursor(&self, room_id: &str, user_id: &str, cursor: Cursor) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .cursors
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string(), cursor);
        Ok(())
    }

    async fn load_cursors(&self, room_id: &str) -> Result<Vec<StoredCursor>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .cursors
            .get(room_id)
            .map(|m| m.iter().map(|(user_id, cursor)| StoredCursor { user_id: user_id.clone(), cursor: *cursor }).collect())
            .unwrap_or_default())
    }
}

/// A `Persistence` whose every method fails, for exercising the
/// non-fatal-failure paths in tests.
pub struct FailingPersistence;

#[async_trait]
impl Persistence for FailingPersistence {
    async fn save_snapshot(&self, _: &str, _: u64, _: &str, _: SnapshotMeta) -> Result<(), PersistenceError> {
        Err(PersistenceError("store unavailable".into()))
    }

    async fn load_latest_snapshot(&self, _: &str) -> Result<Option<StoredSnapshot>, PersistenceError> {
        Err(PersistenceError("store unavailable".into()))
    }

    async fn append_operation(&self, _: &str, _: &Operation) -> Result<(), PersistenceError> {
        Err(PersistenceError("store unavailable".into()))
    }

    async fn load_operations_since(&self, _: &str, _: u64) -> Result<Vec<Operation>, PersistenceError> {
        Err(PersistenceError("store unavailable".into()))
    }

    async fn save_cursor(&self, _: &str, _: &str, _: Cursor) -> Result<(), PersistenceError> {
        Err(PersistenceError("store unavailable".into()))
    }

    async fn load_cursors(&self, _: &str) -> Result<Vec<StoredCursor>, PersistenceError> {
        Err(PersistenceError("store unavailable".into()))
    }
}

pub type SharedPersistence = Arc<dyn Persistence>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::OperationType;

    #[tokio::test]
    async fn round_trips_snapshot() {
        let store = InMemoryPersistence::new();
        store.save_snapshot("room1", 5, "hello", SnapshotMeta::default()).await.unwrap();
        let loaded = store.load_latest_snapshot("room1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 5);
        assert_eq!(loaded.content, "hello");
    }

    #[tokio::test]
    async fn missing_snapshot_is_none() {
        let store = InMemoryPersistence::new();
        assert!(store.load_latest_snapshot("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn appended_operations_are_retrievable() {
        let store = InMemoryPersistence::new();
        let op = Operation {
            id: "op1".into(),
            op_type: OperationType::Insert,
            position: 0,
            content: "hi".into(),
            base_version: 0,
            client_id: "c1".into(),
            user_id: "u1".into(),
        };
        store.append_operation("room1", &op).await.unwrap();
        let ops = store.load_operations_since("room1", 0).await.unwrap();
        assert_eq!(ops.len(), 1);
    }
}
