use std::sync::Arc;
use tracing::{error, warn};

use crate::core::config::ConfigHandle;
use crate::core::error::SecurityError;
use crate::core::store::EventStore;
use crate::core::store::types::EventType;

/// Checks an inbound identity against the configured operator set before any
/// other component is reachable. Scheduler-originated work never passes
/// through here; ticks are not operator-attributable.
pub struct AuthorizationGate {
    config: ConfigHandle,
    store: Arc<EventStore>,
}

impl AuthorizationGate {
    pub fn new(config: ConfigHandle, store: Arc<EventStore>) -> Self {
        Self { config, store }
    }

    pub fn is_authorized(&self, identity: i64) -> bool {
        self.config.snapshot().is_authorized(identity)
    }

    /// Deny-first check. A denial is security-relevant data: it is recorded in
    /// the event log before being reported to the caller. The denial itself
    /// never depends on the store write succeeding.
    pub async fn require(&self, identity: i64) -> Result<(), SecurityError> {
        if self.is_authorized(identity) {
            return Ok(());
        }
        warn!("unauthorized access attempt from {}", identity);
        if let Err(e) = self
            .store
            .record_event(
                EventType::UnauthorizedAccess,
                &format!("operator {identity} attempted access"),
                None,
            )
            .await
        {
            error!("failed to record unauthorized access by {}: {}", identity, e);
        }
        Err(SecurityError::AuthorizationDenied(identity))
    }
}
