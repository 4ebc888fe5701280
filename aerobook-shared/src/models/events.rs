use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub flight_id: Uuid,
    pub ticket_count: usize,
    pub total_amount: Decimal,
    pub expires_at: DateTime<Utc>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub paid_amount: Decimal,
    pub payment_reference: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub refund_amount: Decimal,
    pub reason: Option<String>,
    pub released_seats: u32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingExpiredEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub released_seats: u32,
    pub timestamp: i64,
}

/// Everything the booking engine announces to downstream consumers
/// (e-mail, ticket rendering, analytics).
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    Created(BookingCreatedEvent),
    Confirmed(BookingConfirmedEvent),
    Cancelled(BookingCancelledEvent),
    Expired(BookingExpiredEvent),
}

impl BookingEvent {
    pub fn reference(&self) -> &str {
        match self {
            BookingEvent::Created(e) => &e.reference,
            BookingEvent::Confirmed(e) => &e.reference,
            BookingEvent::Cancelled(e) => &e.reference,
            BookingEvent::Expired(e) => &e.reference,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            BookingEvent::Created(_) => "booking.created",
            BookingEvent::Confirmed(_) => "booking.confirmed",
            BookingEvent::Cancelled(_) => "booking.cancelled",
            BookingEvent::Expired(_) => "booking.expired",
        }
    }
}
