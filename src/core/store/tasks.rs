use rusqlite::{Row, params};

use super::EventStore;
use super::types::{FireTime, ScheduledTask, TaskFrequency};
use crate::core::error::SecurityError;

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<ScheduledTask> {
    let fire_time: String = row.get(3)?;
    let fire_time: FireTime = fire_time.parse().map_err(|e: SecurityError| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ScheduledTask {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        command: row.get(2)?,
        fire_time,
        frequency: TaskFrequency::Daily,
        active: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
    })
}

const TASK_COLUMNS: &str = "id, owner_id, command, fire_time, frequency, active, created_at";

impl EventStore {
    pub async fn create_task(
        &self,
        owner_id: i64,
        command: &str,
        fire_time: FireTime,
    ) -> Result<ScheduledTask, SecurityError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO scheduled_tasks (owner_id, command, fire_time, frequency)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                owner_id,
                command,
                fire_time.to_string(),
                TaskFrequency::Daily.as_str()
            ],
        )?;
        let id = db.last_insert_rowid();
        let task = db.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1"),
            params![id],
            row_to_task,
        )?;
        Ok(task)
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<ScheduledTask>, SecurityError> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare(&format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], row_to_task)?;
        match rows.next() {
            Some(task) => Ok(Some(task?)),
            None => Ok(None),
        }
    }

    pub async fn active_tasks(&self) -> Result<Vec<ScheduledTask>, SecurityError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE active = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_task)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Flip a task to cancelled. The row is kept for audit. Returns false when
    /// the task does not exist or is already cancelled.
    pub async fn deactivate_task(&self, id: i64) -> Result<bool, SecurityError> {
        let db = self.db.lock().await;
        let changed = db.execute(
            "UPDATE scheduled_tasks SET active = 0 WHERE id = ?1 AND active = 1",
            params![id],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;

    #[tokio::test]
    async fn create_assigns_ids_and_reads_back() {
        let store = test_store();
        let t1 = store
            .create_task(42, "uptime", "06:00".parse().unwrap())
            .await
            .unwrap();
        let t2 = store
            .create_task(42, "df -h", "22:30".parse().unwrap())
            .await
            .unwrap();
        assert!(t2.id > t1.id);
        assert_eq!(t1.owner_id, 42);
        assert_eq!(t1.command, "uptime");
        assert_eq!(t1.fire_time.to_string(), "06:00");
        assert!(t1.active);

        let got = store.get_task(t1.id).await.unwrap().unwrap();
        assert_eq!(got.command, "uptime");
        assert_eq!(got.fire_time, t1.fire_time);
    }

    #[tokio::test]
    async fn get_missing_task_is_none() {
        let store = test_store();
        assert!(store.get_task(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deactivate_keeps_the_row() {
        let store = test_store();
        let task = store
            .create_task(7, "uptime", "12:00".parse().unwrap())
            .await
            .unwrap();
        assert!(store.deactivate_task(task.id).await.unwrap());

        // row survives cancellation, flagged inactive
        let got = store.get_task(task.id).await.unwrap().unwrap();
        assert!(!got.active);
        assert_eq!(got.command, "uptime");

        // and no longer shows up as active
        assert!(store.active_tasks().await.unwrap().is_empty());

        // second deactivation reports nothing changed
        assert!(!store.deactivate_task(task.id).await.unwrap());
    }

    #[tokio::test]
    async fn active_tasks_excludes_cancelled() {
        let store = test_store();
        let keep = store
            .create_task(1, "uptime", "08:00".parse().unwrap())
            .await
            .unwrap();
        let cancelled = store
            .create_task(1, "free -h", "09:00".parse().unwrap())
            .await
            .unwrap();
        store.deactivate_task(cancelled.id).await.unwrap();

        let active = store.active_tasks().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep.id);
    }
}
