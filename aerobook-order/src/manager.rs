use crate::models::{
    Booking, BookingStatus, ContactInfo, FareType, Passenger, Ticket, TicketError, TicketStatus, TravelDocument,
};
use crate::reference::{AtomicTicketSequence, RandomReferenceGenerator, ReferenceGenerator, TicketNumberSequence};
use crate::refund::RefundCalculator;
use crate::repository::{BookingRepository, PassengerRepository};
use aerobook_catalog::{
    CabinClass, Flight, FlightRepository, InventoryError, PricingEngine, PricingQuote, SeatAssigner,
    SeatAssignmentError, SeatInventory, SeatPreference,
};
use aerobook_core::{
    Clock, NotificationSink, PaymentError, PaymentGateway, PaymentReceipt, PaymentStatus, StoreError, SystemClock,
};
use aerobook_shared::models::events::{
    BookingCancelledEvent, BookingConfirmedEvent, BookingCreatedEvent, BookingExpiredEvent,
};
use aerobook_shared::{BookingEvent, Masked};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tunables for the booking lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BookingPolicy {
    /// How long a PENDING booking holds its seats.
    pub hold_minutes: i64,
    pub max_passengers: usize,
    pub min_hours_before_departure: i64,
    /// Attempts at drawing an unused booking reference.
    pub reference_attempts: u32,
    pub ticket_prefix: String,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            hold_minutes: 15,
            max_passengers: 9,
            min_hours_before_departure: aerobook_catalog::inventory::MIN_BOOKING_LEAD_HOURS,
            reference_attempts: 10,
            ticket_prefix: "176".to_string(),
        }
    }
}

/// One traveller in a booking request. Either points at a saved passenger or
/// carries the traveller's details inline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassengerRequest {
    pub saved_passenger_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub document: Option<TravelDocument>,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    /// Falls back to the request-level cabin.
    pub cabin_class: Option<CabinClass>,
    pub fare_type: Option<FareType>,
    pub seat_number: Option<String>,
    pub seat_preference: Option<SeatPreference>,
    #[serde(default)]
    pub save_for_reuse: bool,
}

impl PassengerRequest {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            ..Default::default()
        }
    }

    pub fn saved(passenger_id: Uuid) -> Self {
        Self {
            saved_passenger_id: Some(passenger_id),
            ..Default::default()
        }
    }

    pub fn in_cabin(mut self, cabin_class: CabinClass) -> Self {
        self.cabin_class = Some(cabin_class);
        self
    }

    pub fn with_seat(mut self, seat_number: &str) -> Self {
        self.seat_number = Some(seat_number.to_string());
        self
    }

    pub fn with_preference(mut self, preference: SeatPreference) -> Self {
        self.seat_preference = Some(preference);
        self
    }

    pub fn with_fare(mut self, fare_type: FareType) -> Self {
        self.fare_type = Some(fare_type);
        self
    }

    pub fn save_for_reuse(mut self) -> Self {
        self.save_for_reuse = true;
        self
    }

    fn to_passenger(&self, user_id: Uuid, now: DateTime<Utc>) -> Passenger {
        let mut passenger = Passenger::new(&self.first_name, &self.last_name);
        passenger.user_id = self.save_for_reuse.then_some(user_id);
        passenger.date_of_birth = self.date_of_birth;
        passenger.gender = self.gender.clone();
        passenger.nationality = self.nationality.clone();
        passenger.document = self.document.clone();
        passenger.email = self.email.clone();
        passenger.phone = self.phone.clone();
        passenger.created_at = now;
        passenger
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub flight_id: Uuid,
    pub cabin_class: CabinClass,
    pub passengers: Vec<PassengerRequest>,
    pub contact: ContactInfo,
    pub special_requests: Option<String>,
    /// Pricing date; today when absent.
    pub booking_date: Option<NaiveDate>,
}

pub type BookingResult<T> = Result<T, BookingError>;

/// Outcome of one [`BookingManager::expire_due`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryBatch {
    pub fetched: usize,
    pub expired: usize,
    /// Fetched but left in place: lost to another writer or failed.
    pub skipped: usize,
}

/// Reloads allowed when a ticket update loses to a concurrent write on the
/// same booking.
const TICKET_UPDATE_ATTEMPTS: u32 = 3;

/// Drives bookings through PENDING, CONFIRMED, CANCELLED, EXPIRED and
/// COMPLETED.
///
/// Every status change is written with a compare-and-set on the stored
/// status, so when two transitions race (a user confirming while the expiry
/// sweep runs) exactly one commits, and only the winner touches inventory.
pub struct BookingManager {
    flights: Arc<dyn FlightRepository>,
    inventory: Arc<dyn SeatInventory>,
    bookings: Arc<dyn BookingRepository>,
    passengers: Arc<dyn PassengerRepository>,
    notifier: Arc<dyn NotificationSink>,
    payments: Arc<dyn PaymentGateway>,
    references: Arc<dyn ReferenceGenerator>,
    ticket_numbers: Arc<dyn TicketNumberSequence>,
    clock: Arc<dyn Clock>,
    pricing: PricingEngine,
    policy: BookingPolicy,
    seat_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BookingManager {
    pub fn new(
        flights: Arc<dyn FlightRepository>,
        inventory: Arc<dyn SeatInventory>,
        bookings: Arc<dyn BookingRepository>,
        passengers: Arc<dyn PassengerRepository>,
        notifier: Arc<dyn NotificationSink>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        let policy = BookingPolicy::default();
        Self {
            flights,
            inventory,
            bookings,
            passengers,
            notifier,
            payments,
            references: Arc::new(RandomReferenceGenerator),
            ticket_numbers: Arc::new(AtomicTicketSequence::new(policy.ticket_prefix.clone())),
            clock: Arc::new(SystemClock),
            pricing: PricingEngine::default(),
            policy,
            seat_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reference_generator(mut self, references: Arc<dyn ReferenceGenerator>) -> Self {
        self.references = references;
        self
    }

    pub fn with_ticket_sequence(mut self, ticket_numbers: Arc<dyn TicketNumberSequence>) -> Self {
        self.ticket_numbers = ticket_numbers;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingEngine) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_policy(mut self, policy: BookingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    /// Price one cabin of a flight.
    pub async fn quote(
        &self,
        flight_id: Uuid,
        cabin_class: CabinClass,
        booking_date: NaiveDate,
    ) -> BookingResult<PricingQuote> {
        let flight = self.load_flight(flight_id).await?;
        Ok(self.pricing.quote(&flight, cabin_class, booking_date))
    }

    /// Reserve seats, price the tickets and open a PENDING booking.
    ///
    /// Seats are reserved per cabin; if any cabin comes up short, every cabin
    /// already reserved is released again before the error is returned.
    pub async fn create_booking(&self, user_id: Uuid, request: CreateBookingRequest) -> BookingResult<Booking> {
        self.validate_request(&request)?;
        let now = self.clock.now();

        let flight = self.load_flight(request.flight_id).await?;
        if !flight.is_bookable(now, Duration::hours(self.policy.min_hours_before_departure)) {
            return Err(BookingError::FlightNotBookable(flight.id));
        }

        let passengers = self.resolve_passengers(user_id, &request.passengers, now).await?;
        let cabins: Vec<CabinClass> = request
            .passengers
            .iter()
            .map(|p| p.cabin_class.unwrap_or(request.cabin_class))
            .collect();

        let mut groups: BTreeMap<CabinClass, u32> = BTreeMap::new();
        for cabin in &cabins {
            *groups.entry(*cabin).or_insert(0) += 1;
        }

        let mut reserved = Vec::with_capacity(groups.len());
        for (&cabin, &count) in &groups {
            if let Err(err) = self.inventory.reserve(flight.id, cabin, count).await {
                self.roll_back(flight.id, &reserved).await;
                return Err(err.into());
            }
            reserved.push((cabin, count));
        }

        let booking = match self.issue_booking(user_id, &request, &flight, &passengers, &cabins, now).await {
            Ok(booking) => booking,
            Err(err) => {
                self.roll_back(flight.id, &reserved).await;
                return Err(err);
            }
        };

        for (passenger, req) in passengers.iter().zip(&request.passengers) {
            if req.save_for_reuse && req.saved_passenger_id.is_none() {
                if let Err(e) = self.passengers.save_passenger(passenger).await {
                    warn!("Failed to save passenger {} for reuse: {}", passenger.id, e);
                }
            }
        }

        info!(
            "Booking {} created: {} tickets on {}, total {}",
            booking.reference,
            booking.tickets.len(),
            flight.flight_number,
            booking.total_amount
        );

        self.notify(BookingEvent::Created(BookingCreatedEvent {
            booking_id: booking.id,
            reference: booking.reference.clone(),
            user_id,
            flight_id: flight.id,
            ticket_count: booking.tickets.len(),
            total_amount: booking.total_amount,
            expires_at: booking.expires_at.unwrap_or(now),
            timestamp: now.timestamp_millis(),
        }))
        .await;

        Ok(booking)
    }

    /// Take payment and move PENDING to CONFIRMED. A booking past its hold is
    /// expired on the spot and rejected.
    pub async fn confirm_booking(&self, reference: &str) -> BookingResult<Booking> {
        let booking = self.load(reference).await?;
        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Expired => return Err(BookingError::BookingExpired(reference.to_string())),
            from => {
                return Err(BookingError::InvalidTransition {
                    from,
                    to: BookingStatus::Confirmed,
                })
            }
        }

        let now = self.clock.now();
        if booking.is_expired(now) {
            if self.expire_pending(booking, now).await? {
                return Err(BookingError::BookingExpired(reference.to_string()));
            }
            return Err(self.lost_race(reference, BookingStatus::Pending, BookingStatus::Confirmed).await);
        }

        let mut confirmed = booking;
        for ticket in confirmed.tickets.iter_mut().filter(|t| t.status == TicketStatus::Issued) {
            ticket.confirm(now)?;
        }

        let receipt = self.payments.charge(reference, confirmed.total_amount).await?;

        confirmed.update_status(BookingStatus::Confirmed, now);
        confirmed.confirmed_at = Some(now);
        confirmed.payment_status = PaymentStatus::Paid;
        confirmed.paid_amount = confirmed.total_amount;
        confirmed.payment_reference = Some(receipt.id.clone());

        match self.commit(&mut confirmed, BookingStatus::Pending).await {
            Ok(true) => {}
            Ok(false) => {
                self.refund_charge(&receipt).await;
                return Err(self.lost_race(reference, BookingStatus::Pending, BookingStatus::Confirmed).await);
            }
            Err(err) => {
                self.refund_charge(&receipt).await;
                return Err(err.into());
            }
        }

        info!("Booking {} confirmed, paid {}", reference, confirmed.paid_amount);

        self.notify(BookingEvent::Confirmed(BookingConfirmedEvent {
            booking_id: confirmed.id,
            reference: confirmed.reference.clone(),
            user_id: confirmed.user_id,
            paid_amount: confirmed.paid_amount,
            payment_reference: confirmed.payment_reference.clone(),
            timestamp: now.timestamp_millis(),
        }))
        .await;

        Ok(confirmed)
    }

    /// Cancel a PENDING or CONFIRMED booking, refund each ticket on the
    /// booking-wide tier and hand the seats back.
    pub async fn cancel_booking(&self, reference: &str, reason: Option<String>) -> BookingResult<Booking> {
        let mut booking = self.load(reference).await?;
        let from = booking.status;
        if !matches!(from, BookingStatus::Pending | BookingStatus::Confirmed) {
            return Err(BookingError::InvalidTransition {
                from,
                to: BookingStatus::Cancelled,
            });
        }

        if let Some(ticket) = booking
            .tickets
            .iter()
            .find(|t| t.status.holds_seat() && !t.status.is_cancellable())
        {
            return Err(TicketError::InvalidTransition {
                ticket_number: ticket.ticket_number.clone(),
                from: ticket.status,
                to: TicketStatus::Cancelled,
            }
            .into());
        }

        let now = self.clock.now();
        let groups = booking.seat_groups();
        let departures = self.departures(&booking).await?;
        let hours = RefundCalculator::governing_hours(
            departures.values().map(|d| RefundCalculator::hours_until(*d, now)),
        );

        let mut refund_total = Decimal::ZERO;
        for ticket in booking.tickets.iter_mut().filter(|t| t.status.holds_seat()) {
            let refund = match (departures.contains_key(&ticket.flight_id), hours) {
                (true, Some(hours)) => RefundCalculator::refund(ticket, hours),
                _ => Decimal::ZERO,
            };
            ticket.cancel(refund, now)?;
            refund_total += refund;
        }

        booking.update_status(BookingStatus::Cancelled, now);
        booking.cancelled_at = Some(now);
        booking.cancellation_reason = reason.clone();
        booking.refund_amount = refund_total;
        if booking.payment_status == PaymentStatus::Paid {
            booking.payment_status = PaymentStatus::RefundPending;
        }

        if !self.commit(&mut booking, from).await? {
            return Err(self.lost_race(reference, from, BookingStatus::Cancelled).await);
        }

        let released = self.release_groups(&groups).await;
        info!(
            "Booking {} cancelled, refund {}, released {} seats",
            reference, refund_total, released
        );

        self.notify(BookingEvent::Cancelled(BookingCancelledEvent {
            booking_id: booking.id,
            reference: booking.reference.clone(),
            user_id: booking.user_id,
            refund_amount: refund_total,
            reason,
            released_seats: released,
            timestamp: now.timestamp_millis(),
        }))
        .await;

        Ok(booking)
    }

    /// Expire one booking whose hold has run out. Already expired bookings
    /// are returned as they are.
    pub async fn expire_booking(&self, reference: &str) -> BookingResult<Booking> {
        let booking = self.load(reference).await?;
        match booking.status {
            BookingStatus::Expired => return Ok(booking),
            BookingStatus::Pending => {}
            from => {
                return Err(BookingError::InvalidTransition {
                    from,
                    to: BookingStatus::Expired,
                })
            }
        }

        let now = self.clock.now();
        if !booking.is_expired(now) {
            return Err(BookingError::InvalidTransition {
                from: BookingStatus::Pending,
                to: BookingStatus::Expired,
            });
        }

        self.expire_pending(booking, now).await?;

        // Won or lost, the stored state is the answer.
        let current = self.load(reference).await?;
        match current.status {
            BookingStatus::Expired => Ok(current),
            from => Err(BookingError::InvalidTransition {
                from,
                to: BookingStatus::Expired,
            }),
        }
    }

    /// Expire up to `limit` overdue PENDING bookings, starting `offset` rows
    /// into the due list. Bookings another writer got to first, or that fail
    /// to expire, are skipped and counted so a caller can page past them.
    pub async fn expire_due(&self, offset: usize, limit: usize) -> BookingResult<ExpiryBatch> {
        let now = self.clock.now();
        let due = self.bookings.find_expired_pending(now, offset, limit).await?;

        let mut batch = ExpiryBatch {
            fetched: due.len(),
            ..ExpiryBatch::default()
        };
        for booking in due {
            let reference = booking.reference.clone();
            match self.expire_pending(booking, now).await {
                Ok(true) => batch.expired += 1,
                Ok(false) => {
                    debug!("Booking {} changed state before it could expire", reference);
                    batch.skipped += 1;
                }
                Err(err) => {
                    error!("Failed to expire booking {}: {}", reference, err);
                    batch.skipped += 1;
                }
            }
        }
        Ok(batch)
    }

    /// Close a CONFIRMED booking after travel. Boarded tickets become USED,
    /// tickets that never boarded become NO_SHOW.
    pub async fn complete_booking(&self, reference: &str) -> BookingResult<Booking> {
        let mut booking = self.load(reference).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Completed,
            });
        }

        let now = self.clock.now();
        for ticket in booking.tickets.iter_mut() {
            match ticket.status {
                TicketStatus::Boarded => ticket.mark_used(now)?,
                TicketStatus::Confirmed | TicketStatus::CheckedIn => ticket.mark_no_show(now)?,
                _ => {}
            }
        }

        booking.update_status(BookingStatus::Completed, now);
        if !self.commit(&mut booking, BookingStatus::Confirmed).await? {
            return Err(self.lost_race(reference, BookingStatus::Confirmed, BookingStatus::Completed).await);
        }

        info!("Booking {} completed", reference);
        Ok(booking)
    }

    /// Give a ticket a specific seat, or the best free seat for `preference`.
    pub async fn assign_seat(
        &self,
        reference: &str,
        user_id: Uuid,
        ticket_id: Uuid,
        requested: Option<&str>,
        preference: Option<SeatPreference>,
    ) -> BookingResult<Booking> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut booking = self.load_owned(reference, user_id).await?;
            let expected = booking.status;
            if !matches!(expected, BookingStatus::Pending | BookingStatus::Confirmed) {
                return Err(BookingError::Validation(format!(
                    "booking {} is {}, seats can no longer change",
                    reference, expected
                )));
            }

            let _guard = self.seat_ticket(&mut booking, ticket_id, requested, preference).await?;
            if self.commit(&mut booking, expected).await? {
                return Ok(booking);
            }
            if attempt == TICKET_UPDATE_ATTEMPTS {
                return Err(self.lost_race(reference, expected, expected).await);
            }
            debug!("Booking {} changed during seat assignment, attempt {}", reference, attempt);
        }
    }

    /// Check a ticket in, assigning a seat first if it has none.
    pub async fn check_in(&self, reference: &str, user_id: Uuid, ticket_id: Uuid) -> BookingResult<Booking> {
        for attempt in 1..=TICKET_UPDATE_ATTEMPTS {
            let mut booking = self.load_owned(reference, user_id).await?;
            Self::require_confirmed(&booking)?;

            let unseated = Self::find_ticket(&mut booking, ticket_id)?.seat_number.is_none();
            let _guard = if unseated {
                Some(self.seat_ticket(&mut booking, ticket_id, None, None).await?)
            } else {
                None
            };

            let now = self.clock.now();
            Self::find_ticket(&mut booking, ticket_id)?.check_in(now)?;
            booking.updated_at = now;

            if self.commit(&mut booking, BookingStatus::Confirmed).await? {
                return Ok(booking);
            }
            debug!("Booking {} changed during check-in, attempt {}", reference, attempt);
        }
        Err(self
            .lost_race(reference, BookingStatus::Confirmed, BookingStatus::Confirmed)
            .await)
    }

    pub async fn board(&self, reference: &str, ticket_id: Uuid) -> BookingResult<Booking> {
        for attempt in 1..=TICKET_UPDATE_ATTEMPTS {
            let mut booking = self.load(reference).await?;
            Self::require_confirmed(&booking)?;

            let now = self.clock.now();
            Self::find_ticket(&mut booking, ticket_id)?.board(now)?;
            booking.updated_at = now;

            if self.commit(&mut booking, BookingStatus::Confirmed).await? {
                return Ok(booking);
            }
            debug!("Booking {} changed during boarding, attempt {}", reference, attempt);
        }
        Err(self
            .lost_race(reference, BookingStatus::Confirmed, BookingStatus::Confirmed)
            .await)
    }

    /// Look up a booking on behalf of `user_id`.
    pub async fn get_booking(&self, reference: &str, user_id: Uuid) -> BookingResult<Booking> {
        self.load_owned(reference, user_id).await
    }

    pub async fn list_user_bookings(&self, user_id: Uuid) -> BookingResult<Vec<Booking>> {
        Ok(self.bookings.list_user_bookings(user_id).await?)
    }

    /// Store a passenger profile under `user_id` for later bookings.
    pub async fn save_passenger(&self, user_id: Uuid, mut passenger: Passenger) -> BookingResult<Passenger> {
        if passenger.first_name.trim().is_empty() || passenger.last_name.trim().is_empty() {
            return Err(BookingError::Validation("passenger first and last name are required".to_string()));
        }
        if let Some(owner) = passenger.user_id {
            if owner != user_id {
                return Err(BookingError::AccessDenied(format!("passenger {}", passenger.id)));
            }
        }
        passenger.user_id = Some(user_id);
        self.passengers.save_passenger(&passenger).await?;
        Ok(passenger)
    }

    pub async fn list_saved_passengers(&self, user_id: Uuid) -> BookingResult<Vec<Passenger>> {
        Ok(self.passengers.list_user_passengers(user_id).await?)
    }

    fn validate_request(&self, request: &CreateBookingRequest) -> BookingResult<()> {
        let count = request.passengers.len();
        if count == 0 {
            return Err(BookingError::Validation("at least one passenger is required".to_string()));
        }
        if count > self.policy.max_passengers {
            return Err(BookingError::Validation(format!(
                "{} passengers requested, at most {} per booking",
                count, self.policy.max_passengers
            )));
        }

        if request.contact.name.trim().is_empty() {
            return Err(BookingError::Validation("contact name is required".to_string()));
        }
        if !request.contact.email.expose().contains('@') {
            return Err(BookingError::Validation("contact e-mail is invalid".to_string()));
        }

        for (i, passenger) in request.passengers.iter().enumerate() {
            if passenger.saved_passenger_id.is_none()
                && (passenger.first_name.trim().is_empty() || passenger.last_name.trim().is_empty())
            {
                return Err(BookingError::Validation(format!(
                    "passenger {} needs a first and last name",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    async fn resolve_passengers(
        &self,
        user_id: Uuid,
        requests: &[PassengerRequest],
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<Passenger>> {
        let mut resolved = Vec::with_capacity(requests.len());
        for req in requests {
            let passenger = match req.saved_passenger_id {
                Some(id) => {
                    let saved = self
                        .passengers
                        .get_passenger(id)
                        .await?
                        .ok_or_else(|| BookingError::Validation(format!("saved passenger {} not found", id)))?;
                    if saved.user_id != Some(user_id) {
                        return Err(BookingError::AccessDenied(format!("passenger {}", id)));
                    }
                    saved
                }
                None => req.to_passenger(user_id, now),
            };
            resolved.push(passenger);
        }
        Ok(resolved)
    }

    /// Seats, prices, reference and persistence for a booking whose inventory
    /// is already reserved. Holds the flight's seat lock until the booking is
    /// stored so no two bookings get the same seat.
    async fn issue_booking(
        &self,
        user_id: Uuid,
        request: &CreateBookingRequest,
        flight: &Flight,
        passengers: &[Passenger],
        cabins: &[CabinClass],
        now: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let booking_date = request.booking_date.unwrap_or_else(|| now.date_naive());
        let mut quotes: BTreeMap<CabinClass, PricingQuote> = BTreeMap::new();
        for cabin in cabins {
            quotes
                .entry(*cabin)
                .or_insert_with(|| self.pricing.quote(flight, *cabin, booking_date));
        }

        let lock = self.seat_lock(flight.id).await;
        let _guard = lock.lock().await;

        let mut occupied = self.bookings.occupied_seats(flight.id).await?;
        let reference = self.next_reference().await?;
        let mut booking = Booking::new(
            reference,
            user_id,
            request.contact.clone(),
            request.special_requests.clone(),
            now,
            Duration::minutes(self.policy.hold_minutes),
        );

        for ((passenger, req), cabin) in passengers.iter().zip(&request.passengers).zip(cabins) {
            let seat = if req.seat_number.is_some() || req.seat_preference.is_some() {
                let seat = SeatAssigner::assign(*cabin, &occupied, req.seat_number.as_deref(), req.seat_preference)?;
                occupied.insert(seat.clone());
                Some(seat)
            } else {
                None
            };

            let fare_type = req.fare_type.unwrap_or_else(|| FareType::default_for(*cabin));
            booking.add_ticket(Ticket::new(
                self.ticket_numbers.next_ticket_number(),
                passenger,
                &quotes[cabin],
                fare_type,
                seat,
                now,
            ));
        }

        self.bookings.insert_booking(&booking).await?;
        Ok(booking)
    }

    async fn next_reference(&self) -> BookingResult<String> {
        let attempts = self.policy.reference_attempts.max(1);
        for _ in 0..attempts {
            let candidate = self.references.generate();
            if !self.bookings.reference_exists(&candidate).await? {
                return Ok(candidate);
            }
            debug!("Booking reference {} already taken, drawing again", candidate);
        }
        Err(BookingError::Storage(
            format!("no free booking reference after {} attempts", attempts).into(),
        ))
    }

    /// Void the tickets of an overdue PENDING booking, mark it EXPIRED and, if
    /// this call won the transition, release its seats.
    async fn expire_pending(&self, mut booking: Booking, now: DateTime<Utc>) -> BookingResult<bool> {
        let groups = booking.seat_groups();
        for ticket in booking.tickets.iter_mut().filter(|t| t.status == TicketStatus::Issued) {
            ticket.void(now)?;
        }
        booking.update_status(BookingStatus::Expired, now);

        if !self.commit(&mut booking, BookingStatus::Pending).await? {
            debug!("Booking {} left PENDING before expiry committed", booking.reference);
            return Ok(false);
        }

        let released = self.release_groups(&groups).await;
        info!("Booking {} expired, released {} seats", booking.reference, released);

        self.notify(BookingEvent::Expired(BookingExpiredEvent {
            booking_id: booking.id,
            reference: booking.reference.clone(),
            user_id: booking.user_id,
            released_seats: released,
            timestamp: now.timestamp_millis(),
        }))
        .await;

        Ok(true)
    }

    /// Assign a seat to one ticket of `booking` in place. The returned guard
    /// keeps the flight's seat lock until the caller has persisted.
    async fn seat_ticket(
        &self,
        booking: &mut Booking,
        ticket_id: Uuid,
        requested: Option<&str>,
        preference: Option<SeatPreference>,
    ) -> BookingResult<OwnedMutexGuard<()>> {
        let (flight_id, cabin_class, current) = {
            let ticket = Self::find_ticket(booking, ticket_id)?;
            if !ticket.status.holds_seat() {
                return Err(BookingError::Validation(format!(
                    "ticket {} is {}",
                    ticket.ticket_number, ticket.status
                )));
            }
            (ticket.flight_id, ticket.cabin_class, ticket.seat_number.clone())
        };

        let guard = self.seat_lock(flight_id).await.lock_owned().await;

        let mut occupied = self.bookings.occupied_seats(flight_id).await?;
        if let Some(seat) = &current {
            occupied.remove(seat);
        }
        let seat = SeatAssigner::assign(cabin_class, &occupied, requested, preference)?;

        let now = self.clock.now();
        let ticket = Self::find_ticket(booking, ticket_id)?;
        ticket.seat_number = Some(seat);
        ticket.updated_at = now;
        booking.updated_at = now;

        Ok(guard)
    }

    async fn seat_lock(&self, flight_id: Uuid) -> Arc<Mutex<()>> {
        self.seat_locks.lock().await.entry(flight_id).or_default().clone()
    }

    async fn departures(&self, booking: &Booking) -> BookingResult<HashMap<Uuid, DateTime<Utc>>> {
        let mut departures = HashMap::new();
        for flight_id in booking.flight_ids() {
            match self.flights.get_flight(flight_id).await? {
                Some(flight) => {
                    departures.insert(flight_id, flight.departure_time);
                }
                None => warn!(
                    "Flight {} on booking {} not found, its tickets refund nothing",
                    flight_id, booking.reference
                ),
            }
        }
        Ok(departures)
    }

    /// Release seats of a committed transition. Returns how many seats went
    /// back; failures are logged since the transition cannot be undone.
    async fn release_groups(&self, groups: &BTreeMap<(Uuid, CabinClass), u32>) -> u32 {
        let mut released = 0;
        for (&(flight_id, cabin_class), &count) in groups {
            match self.inventory.release(flight_id, cabin_class, count).await {
                Ok(n) => released += n,
                Err(e) => error!(
                    "Failed to release {} {} seats on flight {}: {}",
                    count, cabin_class, flight_id, e
                ),
            }
        }
        released
    }

    async fn roll_back(&self, flight_id: Uuid, reserved: &[(CabinClass, u32)]) {
        for &(cabin_class, count) in reserved {
            if let Err(e) = self.inventory.release(flight_id, cabin_class, count).await {
                error!(
                    "Rollback of {} {} seats on flight {} failed: {}",
                    count, cabin_class, flight_id, e
                );
            } else {
                debug!("Rolled back {} {} seats on flight {}", count, cabin_class, flight_id);
            }
        }
    }

    async fn refund_charge(&self, receipt: &PaymentReceipt) {
        if let Err(e) = self.payments.refund(receipt).await {
            error!(
                "Refund of payment {} for booking {} failed: {}",
                receipt.id, receipt.booking_reference, e
            );
        }
    }

    async fn notify(&self, event: BookingEvent) {
        if let Err(e) = self.notifier.publish(&event).await {
            warn!(
                "Failed to publish {} for booking {}: {}",
                event.event_type(),
                event.reference(),
                e
            );
        }
    }

    /// Write `booking` back over the stored copy it was loaded from. On
    /// success the local copy carries the new stored version.
    async fn commit(&self, booking: &mut Booking, expected: BookingStatus) -> BookingResult<bool> {
        let committed = self.bookings.transition_booking(booking, expected).await?;
        if committed {
            booking.version += 1;
        }
        Ok(committed)
    }

    /// Error for a write that lost its compare-and-set. A booking still in
    /// `expected` was changed by a concurrent write of the same kind.
    async fn lost_race(&self, reference: &str, expected: BookingStatus, to: BookingStatus) -> BookingError {
        match self.load(reference).await {
            Ok(current) if current.status == BookingStatus::Expired && to == BookingStatus::Confirmed => {
                BookingError::BookingExpired(reference.to_string())
            }
            Ok(current) if current.status == expected => BookingError::ConcurrentUpdate(reference.to_string()),
            Ok(current) => BookingError::InvalidTransition {
                from: current.status,
                to,
            },
            Err(err) => err,
        }
    }

    async fn load(&self, reference: &str) -> BookingResult<Booking> {
        self.bookings
            .get_booking(reference)
            .await?
            .ok_or_else(|| BookingError::BookingNotFound(reference.to_string()))
    }

    async fn load_owned(&self, reference: &str, user_id: Uuid) -> BookingResult<Booking> {
        let booking = self.load(reference).await?;
        if booking.user_id != user_id {
            return Err(BookingError::AccessDenied(format!("booking {}", reference)));
        }
        Ok(booking)
    }

    async fn load_flight(&self, flight_id: Uuid) -> BookingResult<Flight> {
        self.flights
            .get_flight(flight_id)
            .await?
            .ok_or(BookingError::FlightNotFound(flight_id))
    }

    fn require_confirmed(booking: &Booking) -> BookingResult<()> {
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::Validation(format!(
                "booking {} is {}, tickets move only once it is confirmed",
                booking.reference, booking.status
            )));
        }
        Ok(())
    }

    fn find_ticket(booking: &mut Booking, ticket_id: Uuid) -> BookingResult<&mut Ticket> {
        let reference = booking.reference.clone();
        booking
            .ticket_mut(&ticket_id)
            .ok_or_else(|| BookingError::Validation(format!("ticket {} is not on booking {}", ticket_id, reference)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Insufficient {cabin_class} seats on flight {flight_id}: requested {requested}, available {available}")]
    InsufficientSeats {
        flight_id: Uuid,
        cabin_class: CabinClass,
        requested: u32,
        available: u32,
    },

    #[error("Booking {0} has expired")]
    BookingExpired(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Access denied to {0}")]
    AccessDenied(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Booking {0} was changed by another request")]
    ConcurrentUpdate(String),

    #[error("Flight not found: {0}")]
    FlightNotFound(Uuid),

    #[error("Flight {0} is not open for booking")]
    FlightNotBookable(Uuid),

    #[error(transparent)]
    Seat(#[from] SeatAssignmentError),

    #[error(transparent)]
    Ticket(#[from] TicketError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        BookingError::Storage(err)
    }
}

impl From<InventoryError> for BookingError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientSeats {
                flight_id,
                cabin_class,
                requested,
                available,
            } => BookingError::InsufficientSeats {
                flight_id,
                cabin_class,
                requested,
                available,
            },
            InventoryError::FlightNotFound(id) => BookingError::FlightNotFound(id),
            InventoryError::Storage(e) => BookingError::Storage(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryBookingRepository, InMemoryPassengerRepository};
    use aerobook_catalog::{InventoryManager, SeatCounts};
    use aerobook_core::{InMemoryNotificationSink, ManualClock, MockPaymentGateway};
    use chrono::TimeZone;

    struct Harness {
        manager: BookingManager,
        inventory: Arc<InventoryManager>,
        clock: Arc<ManualClock>,
        flight_id: Uuid,
    }

    async fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 11, 2, 9, 0, 0).unwrap()));
        let flight = Flight::new(
            "AB101",
            "LHR",
            "JFK",
            Utc.with_ymd_and_hms(2026, 12, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 12, 1, 18, 0, 0).unwrap(),
            SeatCounts::new(10, 4, 2),
            rust_decimal_macros::dec!(200.00),
        )
        .unwrap();
        let flight_id = flight.id;

        let inventory = Arc::new(InventoryManager::new());
        inventory.initialize(flight).await;

        let manager = BookingManager::new(
            inventory.clone(),
            inventory.clone(),
            Arc::new(InMemoryBookingRepository::new()),
            Arc::new(InMemoryPassengerRepository::new()),
            Arc::new(InMemoryNotificationSink::new()),
            Arc::new(MockPaymentGateway::new()),
        )
        .with_clock(clock.clone());

        Harness {
            manager,
            inventory,
            clock,
            flight_id,
        }
    }

    fn request(flight_id: Uuid, passengers: Vec<PassengerRequest>) -> CreateBookingRequest {
        CreateBookingRequest {
            flight_id,
            cabin_class: CabinClass::Economy,
            passengers,
            contact: ContactInfo {
                name: "Ada Lovelace".to_string(),
                email: Masked::from("ada@example.com"),
                phone: None,
            },
            special_requests: None,
            booking_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_confirm() {
        let h = harness().await;
        let user = Uuid::new_v4();

        let booking = h
            .manager
            .create_booking(user, request(h.flight_id, vec![PassengerRequest::new("Ada", "Lovelace")]))
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.reference.len(), 6);
        assert_eq!(h.inventory.get(&h.flight_id).await.unwrap().available.economy, 9);

        let confirmed = h.manager.confirm_booking(&booking.reference).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
        assert_eq!(confirmed.paid_amount, confirmed.total_amount);
        assert!(confirmed.tickets.iter().all(|t| t.status == TicketStatus::Confirmed));

        let again = h.manager.confirm_booking(&booking.reference).await.unwrap_err();
        assert!(matches!(
            again,
            BookingError::InvalidTransition {
                from: BookingStatus::Confirmed,
                to: BookingStatus::Confirmed
            }
        ));
    }

    #[tokio::test]
    async fn test_declined_payment_keeps_booking_pending() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 11, 2, 9, 0, 0).unwrap()));
        let inventory = Arc::new(InventoryManager::new());
        let flight = Flight::new(
            "AB101",
            "LHR",
            "JFK",
            Utc.with_ymd_and_hms(2026, 12, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 12, 1, 18, 0, 0).unwrap(),
            SeatCounts::new(10, 0, 0),
            rust_decimal_macros::dec!(200.00),
        )
        .unwrap();
        let flight_id = flight.id;
        inventory.initialize(flight).await;

        struct Fixed;
        impl ReferenceGenerator for Fixed {
            fn generate(&self) -> String {
                "DECL01".to_string()
            }
        }

        let manager = BookingManager::new(
            inventory.clone(),
            inventory.clone(),
            Arc::new(InMemoryBookingRepository::new()),
            Arc::new(InMemoryPassengerRepository::new()),
            Arc::new(InMemoryNotificationSink::new()),
            Arc::new(MockPaymentGateway::new().decline("DECL01")),
        )
        .with_clock(clock)
        .with_reference_generator(Arc::new(Fixed));

        let user = Uuid::new_v4();
        manager
            .create_booking(user, request(flight_id, vec![PassengerRequest::new("Ada", "Lovelace")]))
            .await
            .unwrap();

        let err = manager.confirm_booking("DECL01").await.unwrap_err();
        assert!(matches!(err, BookingError::Payment(PaymentError::Declined(_))));
        let stored = manager.get_booking("DECL01", user).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert!(stored.tickets.iter().all(|t| t.status == TicketStatus::Issued));
    }

    #[tokio::test]
    async fn test_seat_preference_and_explicit_seat() {
        let h = harness().await;
        let booking = h
            .manager
            .create_booking(
                Uuid::new_v4(),
                request(
                    h.flight_id,
                    vec![
                        PassengerRequest::new("Ada", "Lovelace").with_seat("9a"),
                        PassengerRequest::new("Alan", "Turing").with_preference(SeatPreference::Window),
                        PassengerRequest::new("Grace", "Hopper"),
                    ],
                ),
            )
            .await
            .unwrap();

        let seats: Vec<Option<&str>> = booking.tickets.iter().map(|t| t.seat_number.as_deref()).collect();
        assert_eq!(seats, vec![Some("9A"), Some("9F"), None]);
    }

    #[tokio::test]
    async fn test_taken_seat_rolls_back_reservation() {
        let h = harness().await;
        h.manager
            .create_booking(
                Uuid::new_v4(),
                request(h.flight_id, vec![PassengerRequest::new("Ada", "Lovelace").with_seat("12C")]),
            )
            .await
            .unwrap();

        let err = h
            .manager
            .create_booking(
                Uuid::new_v4(),
                request(h.flight_id, vec![PassengerRequest::new("Alan", "Turing").with_seat("12C")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Seat(SeatAssignmentError::SeatTaken(_))));
        assert_eq!(h.inventory.get(&h.flight_id).await.unwrap().available.economy, 9);
    }

    #[tokio::test]
    async fn test_saved_passenger_must_belong_to_caller() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let saved = h
            .manager
            .save_passenger(owner, Passenger::new("Ada", "Lovelace"))
            .await
            .unwrap();

        let err = h
            .manager
            .create_booking(Uuid::new_v4(), request(h.flight_id, vec![PassengerRequest::saved(saved.id)]))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::AccessDenied(_)));
        assert_eq!(h.inventory.get(&h.flight_id).await.unwrap().available.economy, 10);

        let booking = h
            .manager
            .create_booking(owner, request(h.flight_id, vec![PassengerRequest::saved(saved.id)]))
            .await
            .unwrap();
        assert_eq!(booking.tickets[0].passenger_id, saved.id);
    }

    #[tokio::test]
    async fn test_get_booking_checks_owner() {
        let h = harness().await;
        let user = Uuid::new_v4();
        let booking = h
            .manager
            .create_booking(user, request(h.flight_id, vec![PassengerRequest::new("Ada", "Lovelace")]))
            .await
            .unwrap();

        assert!(h.manager.get_booking(&booking.reference, user).await.is_ok());
        assert!(matches!(
            h.manager.get_booking(&booking.reference, Uuid::new_v4()).await,
            Err(BookingError::AccessDenied(_))
        ));
        assert!(matches!(
            h.manager.get_booking("NOPE00", user).await,
            Err(BookingError::BookingNotFound(_))
        ));
        assert_eq!(h.manager.list_user_bookings(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ticket_lifecycle_through_completion() {
        let h = harness().await;
        let user = Uuid::new_v4();
        let booking = h
            .manager
            .create_booking(
                user,
                request(
                    h.flight_id,
                    vec![PassengerRequest::new("Ada", "Lovelace"), PassengerRequest::new("Alan", "Turing")],
                ),
            )
            .await
            .unwrap();
        h.manager.confirm_booking(&booking.reference).await.unwrap();

        let first = booking.tickets[0].id;
        let checked = h.manager.check_in(&booking.reference, user, first).await.unwrap();
        assert_eq!(checked.tickets[0].status, TicketStatus::CheckedIn);
        assert_eq!(checked.tickets[0].seat_number.as_deref(), Some("9A"));

        h.manager.board(&booking.reference, first).await.unwrap();
        let completed = h.manager.complete_booking(&booking.reference).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(completed.tickets[0].status, TicketStatus::Used);
        assert_eq!(completed.tickets[1].status, TicketStatus::NoShow);

        let err = h.manager.cancel_booking(&booking.reference, None).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition {
                from: BookingStatus::Completed,
                to: BookingStatus::Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn test_returned_booking_tracks_stored_version() {
        let h = harness().await;
        let user = Uuid::new_v4();
        let booking = h
            .manager
            .create_booking(user, request(h.flight_id, vec![PassengerRequest::new("Ada", "Lovelace")]))
            .await
            .unwrap();
        assert_eq!(booking.version, 0);

        let confirmed = h.manager.confirm_booking(&booking.reference).await.unwrap();
        assert_eq!(confirmed.version, 1);

        let checked = h
            .manager
            .check_in(&booking.reference, user, booking.tickets[0].id)
            .await
            .unwrap();
        assert_eq!(checked.version, 2);
        assert_eq!(h.manager.get_booking(&booking.reference, user).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_reassign_seat_frees_the_old_one() {
        let h = harness().await;
        let user = Uuid::new_v4();
        let booking = h
            .manager
            .create_booking(
                user,
                request(h.flight_id, vec![PassengerRequest::new("Ada", "Lovelace").with_seat("10A")]),
            )
            .await
            .unwrap();
        let ticket_id = booking.tickets[0].id;

        let moved = h
            .manager
            .assign_seat(&booking.reference, user, ticket_id, Some("11F"), None)
            .await
            .unwrap();
        assert_eq!(moved.tickets[0].seat_number.as_deref(), Some("11F"));

        let back = h
            .manager
            .assign_seat(&booking.reference, user, ticket_id, Some("10A"), None)
            .await
            .unwrap();
        assert_eq!(back.tickets[0].seat_number.as_deref(), Some("10A"));
    }

    #[tokio::test]
    async fn test_flight_too_close_to_departure() {
        let h = harness().await;
        h.clock.set(Utc.with_ymd_and_hms(2026, 12, 1, 8, 30, 0).unwrap());

        let err = h
            .manager
            .create_booking(
                Uuid::new_v4(),
                request(h.flight_id, vec![PassengerRequest::new("Ada", "Lovelace")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::FlightNotBookable(_)));
    }
}
