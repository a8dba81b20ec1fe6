//! Inbound port. The Telegram adapter calls into the application.

use crate::domain::{DomainError, InboundEvent};

/// Handles one update. Events are delivered sequentially.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent) -> Result<(), DomainError>;
}
