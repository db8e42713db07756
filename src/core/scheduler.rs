use chrono::{DateTime, Local, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::core::error::SecurityError;
use crate::core::executor::{CommandExecutor, CommandOrigin};
use crate::core::guard::WhitelistGuard;
use crate::core::store::EventStore;
use crate::core::store::types::{EventType, FireTime, ScheduledTask};

/// How often the tick loop evaluates due tasks.
const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Daily task scheduler over the persisted task table.
///
/// Delivery is at-most-once, best-effort: a task fires when a tick lands in
/// its exact hour:minute, a tick missed while the process was down or busy is
/// skipped rather than replayed, and a task that already fired today is never
/// fired again the same day even when several ticks land in the matching
/// minute. Failures never cancel a task; cancellation is an explicit operator
/// action.
pub struct Scheduler {
    store: Arc<EventStore>,
    executor: Arc<CommandExecutor>,
    guard: WhitelistGuard,
    /// Task id -> day it last fired. Stamped before dispatch.
    fired: Mutex<HashMap<i64, NaiveDate>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<EventStore>,
        executor: Arc<CommandExecutor>,
        guard: WhitelistGuard,
    ) -> Self {
        Self {
            store,
            executor,
            guard,
            fired: Mutex::new(HashMap::new()),
        }
    }

    /// Create a daily task. The command is not validated against the
    /// whitelist here (the executor re-checks at every firing), but the
    /// returned flag tells the caller whether it would currently pass, so the
    /// operator can be warned.
    pub async fn schedule(
        &self,
        owner_id: i64,
        fire_time: &str,
        command: &str,
    ) -> Result<(ScheduledTask, bool), SecurityError> {
        let fire_time: FireTime = fire_time.parse()?;
        let task = self.store.create_task(owner_id, command, fire_time).await?;
        let whitelisted = self.guard.is_allowed(command);
        if !whitelisted {
            warn!(
                "task {} scheduled with a command outside the whitelist: {}",
                task.id, command
            );
        }
        self.store
            .record_event(
                EventType::TaskScheduled,
                &format!(
                    "operator {owner_id} scheduled task {} at {}: `{command}`",
                    task.id, task.fire_time
                ),
                None,
            )
            .await?;
        info!(
            "task {} scheduled by {} at {}: {}",
            task.id, owner_id, task.fire_time, command
        );
        Ok((task, whitelisted))
    }

    /// Cancel a task. Only the owner may cancel. A nonexistent or
    /// already-cancelled id surfaces `TaskNotFound`; the row itself is
    /// retained for audit either way.
    pub async fn cancel(&self, task_id: i64, requester_id: i64) -> Result<(), SecurityError> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(SecurityError::TaskNotFound(task_id))?;
        if task.owner_id != requester_id {
            warn!(
                "operator {} tried to cancel task {} owned by {}",
                requester_id, task_id, task.owner_id
            );
            return Err(SecurityError::TaskOwnershipMismatch(task_id));
        }
        if !self.store.deactivate_task(task_id).await? {
            return Err(SecurityError::TaskNotFound(task_id));
        }
        self.store
            .record_event(
                EventType::TaskCancelled,
                &format!("operator {requester_id} cancelled task {task_id}"),
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ScheduledTask>, SecurityError> {
        self.store.active_tasks().await
    }

    /// Evaluate one tick against `now`. Crate-visible so tests can drive
    /// simulated time instead of sleeping.
    pub(crate) async fn tick_at(&self, now: DateTime<Local>) {
        let tasks = match self.store.active_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("tick skipped, store unavailable: {e}");
                return;
            }
        };
        let today = now.date_naive();

        for task in tasks.into_iter().filter(|t| t.fire_time.matches(&now)) {
            {
                let mut fired = self.fired.lock().await;
                if fired.get(&task.id) == Some(&today) {
                    continue;
                }
                // Stamp before dispatch: at most once per day even if the
                // dispatch itself fails partway.
                fired.insert(task.id, today);
            }
            self.dispatch(&task).await;
        }

        // Stamps from previous days are dead weight.
        self.fired.lock().await.retain(|_, day| *day == today);
    }

    /// Run one due task, fault-isolated: whatever happens here is logged and
    /// the task stays active for the next day.
    async fn dispatch(&self, task: &ScheduledTask) {
        info!(
            "firing task {} for owner {}: {}",
            task.id, task.owner_id, task.command
        );
        let origin = CommandOrigin::ScheduledTask {
            task_id: task.id,
            owner_id: task.owner_id,
        };

        let (event_type, description) = match self.executor.execute(&task.command, origin).await {
            Ok(result) if result.success() => (
                EventType::ScheduledTaskFired,
                format!(
                    "task {} (owner {}) ran `{}`: {}",
                    task.id,
                    task.owner_id,
                    task.command,
                    summarize(result.output())
                ),
            ),
            Ok(result) if result.timed_out => (
                EventType::ScheduledTaskFailed,
                format!(
                    "task {} (owner {}): {}",
                    task.id,
                    task.owner_id,
                    SecurityError::CommandTimedOut(result.duration.as_secs())
                ),
            ),
            Ok(result) => (
                EventType::ScheduledTaskFailed,
                format!(
                    "task {} (owner {}) ran `{}`: exit code {:?}",
                    task.id, task.owner_id, task.command, result.exit_code
                ),
            ),
            Err(e) => (
                EventType::ScheduledTaskFailed,
                format!("task {} (owner {}): {}", task.id, task.owner_id, e),
            ),
        };

        if let Err(e) = self.store.record_event(event_type, &description, None).await {
            error!("failed to record outcome of task {}: {}", task.id, e);
        }
    }

    /// Start the minute tick. Ticks run inline on this task, so a slow
    /// dispatch makes the next deadline miss, and `Skip` drops missed
    /// deadlines instead of queueing them: no overlapping ticks, no catch-up.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("scheduler tick started ({}s interval)", TICK_INTERVAL.as_secs());
            loop {
                interval.tick().await;
                self.tick_at(Local::now()).await;
            }
        })
    }
}

/// First chunk of command output, single line, for event descriptions.
fn summarize(output: &str) -> String {
    let line = output.trim().replace('\n', " | ");
    if line.chars().count() > 200 {
        let mut cut: String = line.chars().take(200).collect();
        cut.push('…');
        cut
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;
    use crate::core::tests::support;
    use crate::core::tests::support::local;

    fn fixture(whitelist: &[&str]) -> (Scheduler, Arc<EventStore>) {
        let store = Arc::new(test_store());
        let config = support::config(whitelist, 30);
        let guard = WhitelistGuard::new(config.clone());
        let executor = Arc::new(CommandExecutor::new(guard.clone(), config, store.clone()));
        (Scheduler::new(store.clone(), executor, guard), store)
    }

    #[tokio::test]
    async fn schedule_rejects_malformed_times() {
        let (scheduler, _store) = fixture(&["uptime"]);
        for bad in ["25:00", "12:75", "noon", "1200"] {
            let err = scheduler.schedule(42, bad, "uptime").await.unwrap_err();
            assert!(matches!(err, SecurityError::InvalidSchedule(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn schedule_warns_about_non_whitelisted_commands() {
        let (scheduler, _store) = fixture(&["uptime"]);
        let (_, whitelisted) = scheduler.schedule(42, "06:00", "uptime").await.unwrap();
        assert!(whitelisted);
        let (task, whitelisted) = scheduler.schedule(42, "07:00", "reboot").await.unwrap();
        assert!(!whitelisted);
        // scheduling still succeeds; enforcement happens at fire time
        assert!(task.active);
    }

    #[tokio::test]
    async fn cancel_enforces_ownership() {
        let (scheduler, store) = fixture(&["uptime"]);
        let (task, _) = scheduler.schedule(42, "06:00", "uptime").await.unwrap();

        let err = scheduler.cancel(task.id, 99).await.unwrap_err();
        assert!(matches!(err, SecurityError::TaskOwnershipMismatch(_)));
        assert!(store.get_task(task.id).await.unwrap().unwrap().active);

        scheduler.cancel(task.id, 42).await.unwrap();
        assert!(!store.get_task(task.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn cancel_of_missing_or_cancelled_task_is_not_found() {
        let (scheduler, _store) = fixture(&["uptime"]);
        let err = scheduler.cancel(424242, 42).await.unwrap_err();
        assert!(matches!(err, SecurityError::TaskNotFound(424242)));

        let (task, _) = scheduler.schedule(42, "06:00", "uptime").await.unwrap();
        scheduler.cancel(task.id, 42).await.unwrap();
        let err = scheduler.cancel(task.id, 42).await.unwrap_err();
        assert!(matches!(err, SecurityError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn fires_at_most_once_within_the_matching_minute() {
        let (scheduler, store) = fixture(&["echo tick"]);
        scheduler.schedule(42, "22:00", "echo tick").await.unwrap();

        // sub-minute ticks landing in the same minute
        scheduler.tick_at(local(2026, 3, 1, 22, 0, 5)).await;
        scheduler.tick_at(local(2026, 3, 1, 22, 0, 25)).await;
        scheduler.tick_at(local(2026, 3, 1, 22, 0, 55)).await;

        assert_eq!(
            store.count_events(EventType::ScheduledTaskFired).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn does_not_fire_outside_the_matching_minute() {
        let (scheduler, store) = fixture(&["echo tick"]);
        scheduler.schedule(42, "22:00", "echo tick").await.unwrap();
        scheduler.tick_at(local(2026, 3, 1, 21, 59, 59)).await;
        scheduler.tick_at(local(2026, 3, 1, 22, 1, 0)).await;
        assert_eq!(
            store.count_events(EventType::ScheduledTaskFired).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn revoked_whitelist_fails_the_firing_but_keeps_the_task() {
        let (scheduler, store) = fixture(&["uptime"]);
        let (task, _) = scheduler.schedule(42, "06:00", "echo gone").await.unwrap();

        scheduler.tick_at(local(2026, 3, 1, 6, 0, 0)).await;

        // the rejection is visible both as the executor's denial event and as
        // the scheduler's failure event
        assert_eq!(
            store.count_events(EventType::UnauthorizedAccess).await.unwrap(),
            1
        );
        assert_eq!(
            store.count_events(EventType::ScheduledTaskFailed).await.unwrap(),
            1
        );
        assert_eq!(
            store.count_events(EventType::ScheduledTaskFired).await.unwrap(),
            0
        );
        // fail-and-retry: the task stays active for the next day
        assert!(store.get_task(task.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn failing_command_does_not_cancel_the_task() {
        let (scheduler, store) = fixture(&["false"]);
        let (task, _) = scheduler.schedule(42, "06:00", "false").await.unwrap();

        scheduler.tick_at(local(2026, 3, 1, 6, 0, 0)).await;

        assert_eq!(
            store.count_events(EventType::ScheduledTaskFailed).await.unwrap(),
            1
        );
        assert!(store.get_task(task.id).await.unwrap().unwrap().active);

        // and it is eligible again the next day
        scheduler.tick_at(local(2026, 3, 2, 6, 0, 0)).await;
        assert_eq!(
            store.count_events(EventType::ScheduledTaskFailed).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn cancelled_tasks_never_fire() {
        let (scheduler, store) = fixture(&["echo tick"]);
        let (task, _) = scheduler.schedule(42, "06:00", "echo tick").await.unwrap();
        scheduler.cancel(task.id, 42).await.unwrap();

        scheduler.tick_at(local(2026, 3, 1, 6, 0, 0)).await;
        assert_eq!(
            store.count_events(EventType::ScheduledTaskFired).await.unwrap(),
            0
        );
    }

    #[test]
    fn summarize_collapses_and_caps() {
        assert_eq!(summarize("one\ntwo\n"), "one | two");
        let long = "x".repeat(500);
        let s = summarize(&long);
        assert_eq!(s.chars().count(), 201);
        assert!(s.ends_with('…'));
    }
}
