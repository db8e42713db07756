use chrono::{DateTime, TimeZone, Timelike};
use std::fmt;
use std::str::FromStr;

use crate::core::error::SecurityError;

/// Time of day a task fires, recurring daily. No date component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FireTime {
    pub hour: u8,
    pub minute: u8,
}

impl FireTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, SecurityError> {
        if hour > 23 || minute > 59 {
            return Err(SecurityError::InvalidSchedule(format!(
                "{hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Exact hour:minute equality against a wall-clock instant.
    pub fn matches<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        now.hour() == u32::from(self.hour) && now.minute() == u32::from(self.minute)
    }
}

impl FromStr for FireTime {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SecurityError::InvalidSchedule(s.to_string());
        let (hour, minute) = s.split_once(':').ok_or_else(invalid)?;
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for FireTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Recurrence kind. `Daily` is the only supported value; the field exists so
/// the schema does not change when other kinds arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFrequency {
    #[default]
    Daily,
}

impl TaskFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: i64,
    pub owner_id: i64,
    pub command: String,
    pub fire_time: FireTime,
    pub frequency: TaskFrequency,
    /// False means cancelled. Cancelled rows are retained for audit.
    pub active: bool,
    pub created_at: String,
}

/// Kinds of security-relevant occurrences recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    UnauthorizedAccess,
    CommandExecuted,
    MotionDetected,
    FeatureToggled,
    SystemReboot,
    ScheduledTaskFired,
    ScheduledTaskFailed,
    TaskScheduled,
    TaskCancelled,
    GpioControl,
    SystemStarted,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnauthorizedAccess => "unauthorized_access",
            Self::CommandExecuted => "command_executed",
            Self::MotionDetected => "motion_detected",
            Self::FeatureToggled => "feature_toggled",
            Self::SystemReboot => "system_reboot",
            Self::ScheduledTaskFired => "scheduled_task_fired",
            Self::ScheduledTaskFailed => "scheduled_task_failed",
            Self::TaskScheduled => "task_scheduled",
            Self::TaskCancelled => "task_cancelled",
            Self::GpioControl => "gpio_control",
            Self::SystemStarted => "system_started",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable row of the audit trail.
#[derive(Debug, Clone)]
pub struct SecurityEvent {
    pub id: i64,
    pub event_type: String,
    pub description: String,
    pub photo_path: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, Utc};

    #[test]
    fn fire_time_parses_well_formed_input() {
        let t: FireTime = "06:00".parse().unwrap();
        assert_eq!(t, FireTime { hour: 6, minute: 0 });
        let t: FireTime = "23:59".parse().unwrap();
        assert_eq!(
            t,
            FireTime {
                hour: 23,
                minute: 59
            }
        );
        assert_eq!(t.to_string(), "23:59");
    }

    #[test]
    fn fire_time_rejects_malformed_input() {
        for bad in ["24:00", "12:60", "7", "ab:cd", "", "12:", ":30", "-1:00"] {
            assert!(
                bad.parse::<FireTime>().is_err(),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn fire_time_matches_exact_minute_only() {
        let t: FireTime = "22:00".parse().unwrap();
        let at = |h, m, s| Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap();
        assert!(t.matches(&at(22, 0, 0)));
        assert!(t.matches(&at(22, 0, 59)));
        assert!(!t.matches(&at(22, 1, 0)));
        assert!(!t.matches(&at(21, 0, 0)));

        // also holds in local time
        let local = Local.with_ymd_and_hms(2026, 3, 1, 22, 0, 30).unwrap();
        assert!(t.matches(&local));
    }
}
