use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::config::ConfigHandle;
use crate::core::error::SecurityError;
use crate::core::store::EventStore;
use crate::core::store::types::EventType;

/// Outcome of one raw motion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionDecision {
    /// Alert: one `motion_detected` event was recorded, the caller should
    /// notify operators.
    Allowed,
    /// Inside the cooldown window; intentionally silent.
    Suppressed,
    /// Detection is switched off; no state change.
    Disabled,
}

impl MotionDecision {
    pub fn allowed(self) -> bool {
        self == Self::Allowed
    }
}

#[derive(Debug, Default)]
struct CooldownState {
    enabled: bool,
    last_alert_at: Option<DateTime<Utc>>,
}

/// Turns raw motion signals into allowed/suppressed alert decisions.
///
/// The cooldown state is owned exclusively here and lives for the process
/// lifetime only: every boot starts disabled with no last-alert timestamp.
/// The state lock is released before any store write, so a slow database
/// never blocks signal classification.
pub struct MotionGate {
    state: Mutex<CooldownState>,
    config: ConfigHandle,
    store: Arc<EventStore>,
}

impl MotionGate {
    pub fn new(config: ConfigHandle, store: Arc<EventStore>) -> Self {
        Self {
            state: Mutex::new(CooldownState::default()),
            config,
            store,
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    /// Toggle detection, recording `feature_toggled`. The cooldown timestamp
    /// is left alone; an off/on cycle cannot bypass the cooldown.
    pub async fn set_enabled(&self, enabled: bool, operator_id: i64) -> Result<(), SecurityError> {
        {
            let mut state = self.state.lock().await;
            state.enabled = enabled;
        }
        self.store
            .record_event(
                EventType::FeatureToggled,
                &format!(
                    "operator {operator_id} turned motion detection {}",
                    if enabled { "on" } else { "off" }
                ),
                None,
            )
            .await?;
        Ok(())
    }

    /// Classify one raw signal at `now`. Exactly the `Allowed` decisions
    /// record a `motion_detected` event; suppressed and disabled signals
    /// record nothing, to keep the log meaningful.
    pub async fn on_motion_signal(
        &self,
        now: DateTime<Utc>,
        photo_path: Option<&str>,
    ) -> Result<MotionDecision, SecurityError> {
        let cooldown_secs = self.config.snapshot().security.motion_cooldown_secs;
        let decision = {
            let mut state = self.state.lock().await;
            if !state.enabled {
                MotionDecision::Disabled
            } else {
                let off_cooldown = match state.last_alert_at {
                    None => true,
                    Some(prev) => {
                        now.signed_duration_since(prev)
                            >= ChronoDuration::seconds(cooldown_secs as i64)
                    }
                };
                if off_cooldown {
                    state.last_alert_at = Some(now);
                    MotionDecision::Allowed
                } else {
                    MotionDecision::Suppressed
                }
            }
        };

        if decision.allowed() {
            warn!("motion detected");
            self.store
                .record_event(EventType::MotionDetected, "motion detected", photo_path)
                .await?;
        }
        Ok(decision)
    }
}
