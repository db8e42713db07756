use rusqlite::params;
use tracing::info;

use super::EventStore;
use super::types::{EventType, SecurityEvent};
use crate::core::error::SecurityError;

impl EventStore {
    /// Append one event to the audit trail. Events are never updated or
    /// deleted; the log has no other write path.
    pub async fn record_event(
        &self,
        event_type: EventType,
        description: &str,
        photo_path: Option<&str>,
    ) -> Result<i64, SecurityError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO security_events (event_type, description, photo_path) VALUES (?1, ?2, ?3)",
            params![event_type.as_str(), description, photo_path],
        )?;
        let id = db.last_insert_rowid();
        info!("security event {}: {} - {}", id, event_type, description);
        Ok(id)
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: u32) -> Result<Vec<SecurityEvent>, SecurityError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, event_type, description, photo_path, timestamp
             FROM security_events ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok(SecurityEvent {
                id: row.get(0)?,
                event_type: row.get(1)?,
                description: row.get(2)?,
                photo_path: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn count_events(&self, event_type: EventType) -> Result<i64, SecurityError> {
        let db = self.db.lock().await;
        let count = db.query_row(
            "SELECT COUNT(*) FROM security_events WHERE event_type = ?1",
            params![event_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
