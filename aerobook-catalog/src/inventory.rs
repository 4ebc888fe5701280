use crate::flight::{CabinClass, Flight, FlightStatus};
use crate::repository::FlightRepository;
use aerobook_core::{Clock, StoreError, StoreResult, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Minimum lead time between booking and departure.
pub const MIN_BOOKING_LEAD_HOURS: i64 = 2;

impl Flight {
    /// Take `count` seats out of the cabin's pool. Leaves the flight untouched
    /// on failure.
    pub fn reserve(&mut self, cabin_class: CabinClass, count: u32, now: DateTime<Utc>) -> Result<(), InventoryError> {
        let pool = cabin_class.seat_pool();
        let available = self.available.get(pool);

        if available < count {
            return Err(InventoryError::InsufficientSeats {
                flight_id: self.id,
                cabin_class,
                requested: count,
                available,
            });
        }

        *self.available.get_mut(pool) = available - count;
        self.available_seats = self.available.sum();
        self.updated_at = now;
        Ok(())
    }

    /// Return seats to the cabin's pool, clamped at the cabin total. Returns
    /// how many seats actually went back.
    pub fn release(&mut self, cabin_class: CabinClass, count: u32, now: DateTime<Utc>) -> u32 {
        let pool = cabin_class.seat_pool();
        let total = self.total_seats.get(pool);
        let before = self.available.get(pool);
        let after = before.saturating_add(count).min(total);

        if after - before < count {
            warn!(
                "Release of {} {} seats on flight {} clamped to {}",
                count, cabin_class, self.flight_number, after - before
            );
        }

        *self.available.get_mut(pool) = after;
        self.available_seats = self.available.sum();
        self.updated_at = now;
        after - before
    }

    /// Open for sale: scheduled, not sold out, and departing more than
    /// `min_lead` after `now`.
    pub fn is_bookable(&self, now: DateTime<Utc>, min_lead: Duration) -> bool {
        self.status == FlightStatus::Scheduled
            && self.available_seats > 0
            && self.departure_time > now + min_lead
    }

    /// Fraction of the cabin's seats already sold, in `[0, 1]`.
    pub fn occupancy_rate(&self, cabin_class: CabinClass) -> Decimal {
        let total = self.total_for(cabin_class);
        if total == 0 {
            return Decimal::ZERO;
        }
        let occupied = total.saturating_sub(self.available_for(cabin_class));
        Decimal::from(occupied) / Decimal::from(total)
    }
}

/// Atomic per-cabin seat counters. Implementations must make the
/// check-then-decrement of `reserve` a single critical section per flight.
#[async_trait]
pub trait SeatInventory: Send + Sync {
    async fn reserve(&self, flight_id: Uuid, cabin_class: CabinClass, count: u32) -> Result<(), InventoryError>;

    /// Returns the number of seats actually put back after clamping.
    async fn release(&self, flight_id: Uuid, cabin_class: CabinClass, count: u32) -> Result<u32, InventoryError>;
}

/// In-memory flight store. Each flight sits behind its own mutex so reserve
/// and release on one flight never contend with another.
pub struct InventoryManager {
    flights: RwLock<HashMap<Uuid, Arc<Mutex<Flight>>>>,
    clock: Arc<dyn Clock>,
}

impl InventoryManager {
    pub fn new() -> Self {
        Self {
            flights: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register (or replace) a flight. An existing slot is updated in place so
    /// holders of it keep seeing the same counters.
    pub async fn initialize(&self, flight: Flight) {
        let mut flights = self.flights.write().await;
        match flights.entry(flight.id) {
            Entry::Occupied(slot) => *slot.get().lock().await = flight,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(flight)));
            }
        }
    }

    /// Snapshot of a flight's current state.
    pub async fn get(&self, flight_id: &Uuid) -> Option<Flight> {
        let slot = self.flights.read().await.get(flight_id).cloned()?;
        let flight = slot.lock().await.clone();
        Some(flight)
    }

    pub async fn get_utilization(&self, flight_id: &Uuid, cabin_class: CabinClass) -> Option<Decimal> {
        self.get(flight_id).await.map(|f| f.occupancy_rate(cabin_class))
    }

    async fn slot(&self, flight_id: Uuid) -> Result<Arc<Mutex<Flight>>, InventoryError> {
        self.flights
            .read()
            .await
            .get(&flight_id)
            .cloned()
            .ok_or(InventoryError::FlightNotFound(flight_id))
    }
}

impl Default for InventoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeatInventory for InventoryManager {
    async fn reserve(&self, flight_id: Uuid, cabin_class: CabinClass, count: u32) -> Result<(), InventoryError> {
        let slot = self.slot(flight_id).await?;
        let mut flight = slot.lock().await;
        flight.reserve(cabin_class, count, self.clock.now())?;
        debug!(
            "Reserved {} {} seats on {} ({} left in cabin)",
            count,
            cabin_class,
            flight.flight_number,
            flight.available_for(cabin_class)
        );
        Ok(())
    }

    async fn release(&self, flight_id: Uuid, cabin_class: CabinClass, count: u32) -> Result<u32, InventoryError> {
        let slot = self.slot(flight_id).await?;
        let mut flight = slot.lock().await;
        let released = flight.release(cabin_class, count, self.clock.now());
        debug!("Released {} {} seats on {}", released, cabin_class, flight.flight_number);
        Ok(released)
    }
}

#[async_trait]
impl FlightRepository for InventoryManager {
    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        Ok(self.get(&id).await)
    }

    async fn save_flight(&self, flight: &Flight) -> StoreResult<()> {
        self.initialize(flight.clone()).await;
        Ok(())
    }

    async fn search_flights(&self, origin: &str, destination: &str, date: NaiveDate) -> StoreResult<Vec<Flight>> {
        let slots: Vec<_> = self.flights.read().await.values().cloned().collect();
        let mut matches = Vec::new();
        for slot in slots {
            let flight = slot.lock().await;
            if flight.origin.eq_ignore_ascii_case(origin)
                && flight.destination.eq_ignore_ascii_case(destination)
                && flight.departure_time.date_naive() == date
            {
                matches.push(flight.clone());
            }
        }
        matches.sort_by_key(|f| f.departure_time);
        Ok(matches)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Flight not found: {0}")]
    FlightNotFound(Uuid),

    #[error("Insufficient {cabin_class} seats on flight {flight_id}: requested {requested}, available {available}")]
    InsufficientSeats {
        flight_id: Uuid,
        cabin_class: CabinClass,
        requested: u32,
        available: u32,
    },

    #[error("Inventory storage failure: {0}")]
    Storage(#[source] StoreError),
}
