use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::core::config::ConfigHandle;
use crate::core::store::EventStore;
use crate::core::store::types::EventType;

/// Logical output level for a peripheral pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    High,
    Low,
}

impl PinLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" | "high" | "1" => Some(Self::High),
            "off" | "low" | "0" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for PinLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "on",
            Self::Low => "off",
        })
    }
}

/// Abstract pin driver. The controller only ever calls `set_pin`; swapping in
/// a different driver is a one-struct change.
#[async_trait]
pub trait GpioBackend: Send + Sync {
    async fn set_pin(&self, pin: u8, level: PinLevel) -> Result<()>;
}

/// Driver writing through `/sys/class/gpio`.
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/sys/class/gpio"),
        }
    }

    #[cfg(test)]
    fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GpioBackend for SysfsGpio {
    async fn set_pin(&self, pin: u8, level: PinLevel) -> Result<()> {
        let pin_dir = self.root.join(format!("gpio{pin}"));
        if !pin_dir.exists() {
            tokio::fs::write(self.root.join("export"), pin.to_string())
                .await
                .with_context(|| format!("failed to export gpio {pin}"))?;
        }
        tokio::fs::write(pin_dir.join("direction"), "out")
            .await
            .with_context(|| format!("failed to set gpio {pin} direction"))?;
        let value = match level {
            PinLevel::High => "1",
            PinLevel::Low => "0",
        };
        tokio::fs::write(pin_dir.join("value"), value)
            .await
            .with_context(|| format!("failed to drive gpio {pin}"))?;
        Ok(())
    }
}

/// Operator-facing pin control: allow-list check, backend call, audit event.
pub struct GpioController {
    backend: Arc<dyn GpioBackend>,
    config: ConfigHandle,
    store: Arc<EventStore>,
}

impl GpioController {
    pub fn new(backend: Arc<dyn GpioBackend>, config: ConfigHandle, store: Arc<EventStore>) -> Self {
        Self {
            backend,
            config,
            store,
        }
    }

    pub async fn set(&self, pin: u8, level: PinLevel, operator_id: i64) -> Result<()> {
        if !self.config.snapshot().pin_allowed(pin) {
            bail!("pin {pin} is not in the configured pin list");
        }
        self.backend.set_pin(pin, level).await?;
        self.store
            .record_event(
                EventType::GpioControl,
                &format!("operator {operator_id} set pin {pin} {level}"),
                None,
            )
            .await?;
        info!("pin {} set {} by operator {}", pin, level, operator_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;
    use crate::core::tests::support;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(u8, PinLevel)>>,
    }

    #[async_trait]
    impl GpioBackend for RecordingBackend {
        async fn set_pin(&self, pin: u8, level: PinLevel) -> Result<()> {
            self.calls.lock().await.push((pin, level));
            Ok(())
        }
    }

    #[test]
    fn level_parsing() {
        assert_eq!(PinLevel::parse("on"), Some(PinLevel::High));
        assert_eq!(PinLevel::parse("OFF"), Some(PinLevel::Low));
        assert_eq!(PinLevel::parse("high"), Some(PinLevel::High));
        assert_eq!(PinLevel::parse("0"), Some(PinLevel::Low));
        assert_eq!(PinLevel::parse("maybe"), None);
    }

    #[tokio::test]
    async fn allowed_pin_drives_backend_and_logs() {
        let backend = Arc::new(RecordingBackend::default());
        let store = Arc::new(test_store());
        let controller = GpioController::new(
            backend.clone(),
            support::config_with_pins(&[17, 27]),
            store.clone(),
        );

        controller.set(17, PinLevel::High, 42).await.unwrap();

        assert_eq!(*backend.calls.lock().await, vec![(17, PinLevel::High)]);
        let events = store.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "gpio_control");
        assert!(events[0].description.contains("pin 17 on"));
    }

    #[tokio::test]
    async fn unlisted_pin_is_refused_before_the_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let store = Arc::new(test_store());
        let controller =
            GpioController::new(backend.clone(), support::config_with_pins(&[17]), store.clone());

        assert!(controller.set(4, PinLevel::High, 42).await.is_err());
        assert!(backend.calls.lock().await.is_empty());
        assert!(store.recent_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sysfs_writes_direction_and_value() {
        let root = std::env::temp_dir().join(format!("vigil-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("gpio17")).unwrap();
        let gpio = SysfsGpio::with_root(root.clone());

        gpio.set_pin(17, PinLevel::High).await.unwrap();
        assert_eq!(std::fs::read_to_string(root.join("gpio17/direction")).unwrap(), "out");
        assert_eq!(std::fs::read_to_string(root.join("gpio17/value")).unwrap(), "1");

        gpio.set_pin(17, PinLevel::Low).await.unwrap();
        assert_eq!(std::fs::read_to_string(root.join("gpio17/value")).unwrap(), "0");
    }
}
