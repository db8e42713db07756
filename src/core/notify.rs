use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Outbound alert sink. The messaging transport implements this; the core
/// decides *when* to alert, never *how* alerts are delivered.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` (and an optional captured image) to every operator.
    async fn broadcast(&self, text: &str, photo: Option<&Path>) -> Result<()>;
}
