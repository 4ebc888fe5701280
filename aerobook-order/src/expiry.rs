use crate::manager::{BookingManager, BookingResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Periodically expires PENDING bookings whose hold has run out.
///
/// Runs independently of request handling; a booking a user confirms while
/// the sweep is looking at it ends up in whichever state committed first.
pub struct ExpirySweeper {
    manager: Arc<BookingManager>,
    interval: Duration,
    batch_size: usize,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<BookingManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            batch_size: 100,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Drain everything currently overdue, batch by batch. Bookings that
    /// could not be expired stay in the due list, so later pages start past
    /// them.
    pub async fn run_once(&self) -> BookingResult<usize> {
        let mut total = 0;
        let mut offset = 0;
        loop {
            let batch = self.manager.expire_due(offset, self.batch_size).await?;
            total += batch.expired;
            offset += batch.skipped;
            if batch.fetched < self.batch_size {
                break;
            }
        }
        if total > 0 {
            info!("Expiry sweep expired {} bookings", total);
        } else {
            debug!("Expiry sweep found nothing to expire");
        }
        Ok(total)
    }

    /// Sweep on every tick until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Expiry sweeper started, every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("Expiry sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Expiry sweeper stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Spawn [`ExpirySweeper::run`] on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
