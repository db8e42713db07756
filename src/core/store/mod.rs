mod events;
mod tasks;
pub mod types;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::error::SecurityError;
use crate::platform::{NativePlatform, Platform};

/// Durable store for scheduled tasks and the append-only security event log.
/// The sole source of truth; both tables survive process restarts.
///
/// All access is serialized by the connection mutex. Callers never hold the
/// lock across a subprocess execution; the per-operation methods here acquire
/// and release it internally.
pub struct EventStore {
    db: Arc<Mutex<Connection>>,
}

impl EventStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, SecurityError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SecurityError::StoreUnavailable(e.to_string()))?;
        }

        let db = Connection::open(db_path)?;
        NativePlatform::restrict_file_permissions(db_path);
        Self::create_schema(&db)?;

        info!("Event store ready at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn create_schema(db: &Connection) -> Result<(), SecurityError> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                command TEXT NOT NULL,
                fire_time TEXT NOT NULL,
                frequency TEXT NOT NULL DEFAULT 'daily',
                active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS security_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                description TEXT NOT NULL,
                photo_path TEXT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(())
    }
}

/// Store backed by a throwaway on-disk database. Avoids sharing state
/// between tests.
#[cfg(test)]
pub(crate) fn test_store() -> EventStore {
    let tmpdir = std::env::temp_dir().join(format!("vigil-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&tmpdir).expect("create temp dir");
    EventStore::open(tmpdir.join("security.db")).expect("open test store")
}
