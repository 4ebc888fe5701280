use aerobook_catalog::PricingEngine;
use aerobook_core::{Clock, LoggingNotificationSink, MockPaymentGateway, NotificationSink, SystemClock};
use aerobook_order::{AtomicTicketSequence, BookingManager, ExpirySweeper};
use aerobook_store::{Config, DbClient, EventProducer, PgBookingRepository, PgFlightRepository, PgPassengerRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Kafka when a `[kafka]` section is configured, the log otherwise.
pub fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn NotificationSink>> {
    match &config.kafka {
        Some(kafka) => {
            info!("Publishing booking events to Kafka topic {}", kafka.topic);
            Ok(Arc::new(EventProducer::new(kafka)?))
        }
        None => {
            warn!("No Kafka configured, booking events go to the log only");
            Ok(Arc::new(LoggingNotificationSink))
        }
    }
}

/// Continue numbering after the last serial already persisted.
pub fn ticket_sequence(prefix: &str, last_serial: Option<u64>) -> AtomicTicketSequence {
    AtomicTicketSequence::starting_at(prefix, last_serial.map_or(1, |n| n + 1))
}

pub async fn build_manager(config: &Config, db: &DbClient) -> anyhow::Result<Arc<BookingManager>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let flights = Arc::new(PgFlightRepository::new(db.pool.clone()).with_clock(clock.clone()));
    let bookings = Arc::new(PgBookingRepository::new(db.pool.clone()));
    let passengers = Arc::new(PgPassengerRepository::new(db.pool.clone()));

    let prefix = &config.booking.ticket_prefix;
    let last_serial = bookings
        .last_ticket_serial(prefix)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let manager = BookingManager::new(
        flights.clone(),
        flights,
        bookings,
        passengers,
        build_notifier(config)?,
        Arc::new(MockPaymentGateway::new()),
    )
    .with_clock(clock)
    .with_ticket_sequence(Arc::new(ticket_sequence(prefix, last_serial)))
    .with_pricing(PricingEngine::new(config.pricing.clone()))
    .with_policy(config.booking.clone());

    Ok(Arc::new(manager))
}

pub fn build_sweeper(config: &Config, manager: Arc<BookingManager>) -> ExpirySweeper {
    ExpirySweeper::new(manager, Duration::from_secs(config.worker.sweep_interval_seconds.max(1)))
        .with_batch_size(config.worker.batch_size)
}
