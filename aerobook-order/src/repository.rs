use crate::models::{Booking, BookingStatus, Passenger};
use aerobook_core::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Booking persistence. Status changes go through `transition_booking`, which
/// is the only writer allowed to overwrite a stored booking.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Fails if the reference is already taken.
    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn get_booking(&self, reference: &str) -> StoreResult<Option<Booking>>;

    async fn reference_exists(&self, reference: &str) -> StoreResult<bool>;

    /// Replace the stored booking with `booking` if, and only if, its stored
    /// status is still `expected` and its stored version still equals
    /// `booking.version`. The stored copy then carries `booking.version + 1`.
    /// Returns `false` when another writer got there first.
    async fn transition_booking(&self, booking: &Booking, expected: BookingStatus) -> StoreResult<bool>;

    /// Seat codes held by live tickets on the flight.
    async fn occupied_seats(&self, flight_id: Uuid) -> StoreResult<HashSet<String>>;

    /// PENDING bookings whose hold ran out before `now`, oldest first,
    /// skipping the first `offset`.
    async fn find_expired_pending(&self, now: DateTime<Utc>, offset: usize, limit: usize)
        -> StoreResult<Vec<Booking>>;

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;
}

/// Saved passenger profiles.
#[async_trait]
pub trait PassengerRepository: Send + Sync {
    async fn get_passenger(&self, id: Uuid) -> StoreResult<Option<Passenger>>;

    async fn save_passenger(&self, passenger: &Passenger) -> StoreResult<()>;

    async fn list_user_passengers(&self, user_id: Uuid) -> StoreResult<Vec<Passenger>>;
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<String, Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.bookings.read().await.len()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.reference) {
            return Err(format!("duplicate booking reference {}", booking.reference).into());
        }
        bookings.insert(booking.reference.clone(), booking.clone());
        Ok(())
    }

    async fn get_booking(&self, reference: &str) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(reference).cloned())
    }

    async fn reference_exists(&self, reference: &str) -> StoreResult<bool> {
        Ok(self.bookings.read().await.contains_key(reference))
    }

    async fn transition_booking(&self, booking: &Booking, expected: BookingStatus) -> StoreResult<bool> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&booking.reference) {
            Some(stored) if stored.status == expected && stored.version == booking.version => {
                *stored = booking.clone();
                stored.version += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(format!("booking {} does not exist", booking.reference).into()),
        }
    }

    async fn occupied_seats(&self, flight_id: Uuid) -> StoreResult<HashSet<String>> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .flat_map(|b| b.tickets.iter())
            .filter(|t| t.flight_id == flight_id && t.status.holds_seat())
            .filter_map(|t| t.seat_number.clone())
            .collect())
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut due: Vec<Booking> = bookings.values().filter(|b| b.is_expired(now)).cloned().collect();
        due.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.reference.cmp(&b.reference)));
        Ok(due.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut owned: Vec<Booking> = bookings.values().filter(|b| b.user_id == user_id).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}

#[derive(Default)]
pub struct InMemoryPassengerRepository {
    passengers: RwLock<HashMap<Uuid, Passenger>>,
}

impl InMemoryPassengerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PassengerRepository for InMemoryPassengerRepository {
    async fn get_passenger(&self, id: Uuid) -> StoreResult<Option<Passenger>> {
        Ok(self.passengers.read().await.get(&id).cloned())
    }

    async fn save_passenger(&self, passenger: &Passenger) -> StoreResult<()> {
        self.passengers.write().await.insert(passenger.id, passenger.clone());
        Ok(())
    }

    async fn list_user_passengers(&self, user_id: Uuid) -> StoreResult<Vec<Passenger>> {
        let passengers = self.passengers.read().await;
        Ok(passengers
            .values()
            .filter(|p| p.user_id == Some(user_id))
            .cloned()
            .collect())
    }
}
