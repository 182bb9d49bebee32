//! Local session snapshots so a restarted client resumes where it left off.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::answers::AnswerValue;
use crate::error::DatabaseError;
use crate::store::Database;

/// Settings key snapshots are stored under.
pub const SNAPSHOT_KEY: &str = "form-wizard-storage";

/// Position plus the answers collected so far. Never carries the
/// submission timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub position: usize,
    pub answers: BTreeMap<String, AnswerValue>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_key: &str) -> Result<Option<SessionSnapshot>, DatabaseError>;

    async fn save(&self, session_key: &str, snapshot: &SessionSnapshot) -> Result<(), DatabaseError>;

    async fn clear(&self, session_key: &str) -> Result<(), DatabaseError>;
}

/// Snapshots kept in the `settings` table, one row per session key.
pub struct SettingsSessionStore {
    db: Arc<dyn Database>,
}

impl SettingsSessionStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SettingsSessionStore {
    async fn load(&self, session_key: &str) -> Result<Option<SessionSnapshot>, DatabaseError> {
        let Some(value) = self.db.get_setting(session_key, SNAPSHOT_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                // A snapshot from an older layout is not worth failing startup over.
                warn!(session = session_key, error = %e, "Discarding unreadable session snapshot");
                Ok(None)
            }
        }
    }

    async fn save(&self, session_key: &str, snapshot: &SessionSnapshot) -> Result<(), DatabaseError> {
        let value = serde_json::to_value(snapshot)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.db.set_setting(session_key, SNAPSHOT_KEY, &value).await
    }

    async fn clear(&self, session_key: &str) -> Result<(), DatabaseError> {
        self.db.delete_setting(session_key, SNAPSHOT_KEY).await?;
        Ok(())
    }
}

/// In-process snapshots, for tests and throwaway sessions.
#[derive(Default)]
pub struct MemorySessionStore {
    snapshots: RwLock<HashMap<String, SessionSnapshot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_key: &str) -> Result<Option<SessionSnapshot>, DatabaseError> {
        Ok(self.snapshots.read().await.get(session_key).cloned())
    }

    async fn save(&self, session_key: &str, snapshot: &SessionSnapshot) -> Result<(), DatabaseError> {
        self.snapshots
            .write()
            .await
            .insert(session_key.to_string(), snapshot.clone());
        Ok(())
    }

    async fn clear(&self, session_key: &str) -> Result<(), DatabaseError> {
        self.snapshots.write().await.remove(session_key);
        Ok(())
    }
}

pub(crate) enum SnapshotWrite {
    Save(SessionSnapshot),
    Clear,
}

/// Spawn the single writer that applies snapshot writes in order. Failures
/// are logged and never reach the wizard.
pub(crate) fn spawn_snapshot_writer(
    store: Arc<dyn SessionStore>,
    session_key: String,
) -> mpsc::UnboundedSender<SnapshotWrite> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(write) = rx.recv().await {
            let result = match &write {
                SnapshotWrite::Save(snapshot) => store.save(&session_key, snapshot).await,
                SnapshotWrite::Clear => store.clear(&session_key).await,
            };
            match result {
                Ok(()) => debug!(session = %session_key, "Session snapshot written"),
                Err(e) => warn!(session = %session_key, error = %e, "Failed to write session snapshot"),
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use serde_json::json;

    fn snapshot(position: usize) -> SessionSnapshot {
        let mut answers = BTreeMap::new();
        answers.insert("gender".to_string(), AnswerValue::from("Woman"));
        answers.insert(
            "goals".to_string(),
            AnswerValue::Choices(vec!["Friendship".to_string()]),
        );
        SessionSnapshot { position, answers }
    }

    #[tokio::test]
    async fn settings_store_roundtrip() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = SettingsSessionStore::new(Arc::clone(&db));

        assert!(store.load("local").await.unwrap().is_none());
        store.save("local", &snapshot(6)).await.unwrap();
        assert_eq!(store.load("local").await.unwrap(), Some(snapshot(6)));

        let raw = db.get_setting("local", SNAPSHOT_KEY).await.unwrap().unwrap();
        assert_eq!(raw["position"], 6);
        assert_eq!(raw["answers"]["goals"], json!(["Friendship"]));

        store.clear("local").await.unwrap();
        assert!(store.load("local").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_discarded() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.set_setting("local", SNAPSHOT_KEY, &json!({"step": "three"}))
            .await
            .unwrap();

        let store = SettingsSessionStore::new(db);
        assert!(store.load("local").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_are_keyed_separately() {
        let store = MemorySessionStore::new();
        store.save("a", &snapshot(2)).await.unwrap();
        store.save("b", &snapshot(9)).await.unwrap();
        assert_eq!(store.load("a").await.unwrap().unwrap().position, 2);
        store.clear("a").await.unwrap();
        assert!(store.load("a").await.unwrap().is_none());
        assert_eq!(store.load("b").await.unwrap().unwrap().position, 9);
    }

    #[tokio::test]
    async fn writer_applies_writes_in_order() {
        let store = Arc::new(MemorySessionStore::new());
        let writer = spawn_snapshot_writer(store.clone(), "local".to_string());

        writer.send(SnapshotWrite::Save(snapshot(2))).unwrap();
        writer.send(SnapshotWrite::Save(snapshot(3))).unwrap();
        writer.send(SnapshotWrite::Clear).unwrap();
        writer.send(SnapshotWrite::Save(snapshot(4))).unwrap();
        drop(writer);

        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.load("local").await.unwrap(), Some(snapshot(4)));
    }
}
