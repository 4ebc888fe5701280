use aerobook_shared::BookingEvent;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::StoreResult;

/// Fire-and-forget outlet for booking lifecycle events. Callers log failures
/// and carry on; a lost notification never undoes a committed transition.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> StoreResult<()>;
}

/// Writes events to the log only.
#[derive(Debug, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn publish(&self, event: &BookingEvent) -> StoreResult<()> {
        info!("{} for booking {}", event.event_type(), event.reference());
        Ok(())
    }
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    events: Mutex<Vec<BookingEvent>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<BookingEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count_of(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn publish(&self, event: &BookingEvent) -> StoreResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
