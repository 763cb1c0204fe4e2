//! In-memory snapshot store for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Mutex;

use super::{Snapshot, SnapshotStore};

/// Keeps the last saved snapshot in memory and counts saves.
///
/// `failing()` builds a store whose every call errors, for exercising the
/// engine's "persistence failure never touches in-memory state" path.
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: AtomicU32,
    fail: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(None),
            saves: AtomicU32::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        let store = Self::new();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn current(&self) -> Option<Snapshot> {
        self.snapshot.lock().await.clone()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("snapshot store unavailable"));
        }
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("snapshot store unavailable"));
        }
        *self.snapshot.lock().await = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
