use async_trait::async_trait;
use marova_core::{Snapshot, SnapshotStore};
use tokio::sync::RwLock;

/// Volatile store for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    document: RwLock<Option<Snapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            document: RwLock::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn read(&self) -> anyhow::Result<Option<Snapshot>> {
        Ok(self.document.read().await.clone())
    }

    async fn write(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        *self.document.write().await = Some(snapshot.clone());
        Ok(())
    }
}
