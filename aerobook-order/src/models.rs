use aerobook_catalog::{CabinClass, PricingQuote};
use aerobook_core::PaymentStatus;
use aerobook_shared::Masked;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "EXPIRED" => Ok(BookingStatus::Expired),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// Ticket status. Moves forward only; cancellation is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Issued,
    Confirmed,
    CheckedIn,
    Boarded,
    Used,
    NoShow,
    Cancelled,
    Voided,
    Refunded,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Issued => "ISSUED",
            TicketStatus::Confirmed => "CONFIRMED",
            TicketStatus::CheckedIn => "CHECKED_IN",
            TicketStatus::Boarded => "BOARDED",
            TicketStatus::Used => "USED",
            TicketStatus::NoShow => "NO_SHOW",
            TicketStatus::Cancelled => "CANCELLED",
            TicketStatus::Voided => "VOIDED",
            TicketStatus::Refunded => "REFUNDED",
        }
    }

    /// Whether the ticket still occupies its seat and inventory.
    pub fn holds_seat(&self) -> bool {
        !matches!(self, TicketStatus::Cancelled | TicketStatus::Voided | TicketStatus::Refunded)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, TicketStatus::Issued | TicketStatus::Confirmed | TicketStatus::CheckedIn)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ISSUED" => Ok(TicketStatus::Issued),
            "CONFIRMED" => Ok(TicketStatus::Confirmed),
            "CHECKED_IN" => Ok(TicketStatus::CheckedIn),
            "BOARDED" => Ok(TicketStatus::Boarded),
            "USED" => Ok(TicketStatus::Used),
            "NO_SHOW" => Ok(TicketStatus::NoShow),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            "VOIDED" => Ok(TicketStatus::Voided),
            "REFUNDED" => Ok(TicketStatus::Refunded),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BaggageAllowance {
    pub checked_kg: u32,
    pub cabin_kg: u32,
}

/// Conditions that come with a fare type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FareTerms {
    pub refundable: bool,
    pub changeable: bool,
    pub cancellation_fee: Option<Decimal>,
    pub baggage: BaggageAllowance,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FareType {
    Saver,
    Standard,
    Flex,
}

impl FareType {
    pub fn default_for(cabin_class: CabinClass) -> Self {
        match cabin_class {
            CabinClass::Economy | CabinClass::PremiumEconomy => FareType::Standard,
            CabinClass::Business | CabinClass::FirstClass => FareType::Flex,
        }
    }

    pub fn terms(&self) -> FareTerms {
        match self {
            FareType::Saver => FareTerms {
                refundable: false,
                changeable: false,
                cancellation_fee: None,
                baggage: BaggageAllowance { checked_kg: 0, cabin_kg: 7 },
            },
            FareType::Standard => FareTerms {
                refundable: true,
                changeable: true,
                cancellation_fee: Some(dec!(50.00)),
                baggage: BaggageAllowance { checked_kg: 23, cabin_kg: 7 },
            },
            FareType::Flex => FareTerms {
                refundable: true,
                changeable: true,
                cancellation_fee: None,
                baggage: BaggageAllowance { checked_kg: 32, cabin_kg: 10 },
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FareType::Saver => "SAVER",
            FareType::Standard => "STANDARD",
            FareType::Flex => "FLEX",
        }
    }
}

impl FromStr for FareType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAVER" => Ok(FareType::Saver),
            "STANDARD" => Ok(FareType::Standard),
            "FLEX" => Ok(FareType::Flex),
            other => Err(format!("unknown fare type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Passport,
    NationalId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TravelDocument {
    pub document_type: DocumentType,
    pub number: Masked<String>,
    pub issuing_country: String,
    pub expires_on: NaiveDate,
}

/// A traveller. Saved passengers carry the owning user's id and can be reused
/// across bookings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
    pub document: Option<TravelDocument>,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub created_at: DateTime<Utc>,
}

impl Passenger {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            date_of_birth: None,
            gender: None,
            nationality: None,
            document: None,
            email: None,
            phone: None,
            created_at: Utc::now(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    pub name: String,
    pub email: Masked<String>,
    pub phone: Option<Masked<String>>,
}

/// One passenger on one flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub passenger_id: Uuid,
    pub passenger_name: String,
    pub cabin_class: CabinClass,
    pub seat_number: Option<String>,
    pub price: Decimal,
    pub base_fare: Decimal,
    pub taxes: Decimal,
    pub fare_type: FareType,
    pub refundable: bool,
    pub changeable: bool,
    pub cancellation_fee: Option<Decimal>,
    pub baggage: BaggageAllowance,
    pub status: TicketStatus,
    pub refund_amount: Option<Decimal>,
    pub issued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Issue a ticket priced from `quote`; fare conditions come from the fare
    /// type.
    pub fn new(
        ticket_number: String,
        passenger: &Passenger,
        quote: &PricingQuote,
        fare_type: FareType,
        seat_number: Option<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let terms = fare_type.terms();
        Self {
            id: Uuid::new_v4(),
            ticket_number,
            booking_id: Uuid::nil(),
            flight_id: quote.flight_id,
            passenger_id: passenger.id,
            passenger_name: passenger.full_name(),
            cabin_class: quote.cabin_class,
            seat_number,
            price: quote.total_price,
            base_fare: quote.final_price,
            taxes: quote.taxes,
            fare_type,
            refundable: terms.refundable,
            changeable: terms.changeable,
            cancellation_fee: terms.cancellation_fee,
            baggage: terms.baggage,
            status: TicketStatus::Issued,
            refund_amount: None,
            issued_at,
            updated_at: issued_at,
        }
    }

    fn advance(&mut self, from: &[TicketStatus], to: TicketStatus, now: DateTime<Utc>) -> Result<(), TicketError> {
        if !from.contains(&self.status) {
            return Err(TicketError::InvalidTransition {
                ticket_number: self.ticket_number.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        self.advance(&[TicketStatus::Issued], TicketStatus::Confirmed, now)
    }

    pub fn check_in(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        if self.seat_number.is_none() {
            return Err(TicketError::SeatNotAssigned(self.ticket_number.clone()));
        }
        self.advance(&[TicketStatus::Confirmed], TicketStatus::CheckedIn, now)
    }

    pub fn board(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        self.advance(&[TicketStatus::CheckedIn], TicketStatus::Boarded, now)
    }

    pub fn mark_used(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        self.advance(&[TicketStatus::Boarded], TicketStatus::Used, now)
    }

    pub fn mark_no_show(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        self.advance(&[TicketStatus::Confirmed, TicketStatus::CheckedIn], TicketStatus::NoShow, now)
    }

    /// Cancel with the refund already worked out.
    pub fn cancel(&mut self, refund_amount: Decimal, now: DateTime<Utc>) -> Result<(), TicketError> {
        self.advance(
            &[TicketStatus::Issued, TicketStatus::Confirmed, TicketStatus::CheckedIn],
            TicketStatus::Cancelled,
            now,
        )?;
        self.refund_amount = Some(refund_amount);
        Ok(())
    }

    /// Invalidate an unpaid ticket.
    pub fn void(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        self.advance(&[TicketStatus::Issued], TicketStatus::Voided, now)
    }
}

/// A customer's purchase: the tickets plus payment and lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub refund_amount: Decimal,
    pub payment_reference: Option<String>,
    pub contact: ContactInfo,
    pub special_requests: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub tickets: Vec<Ticket>,
    /// Bumped by every committed write; a stale copy cannot overwrite a newer one.
    #[serde(default)]
    pub version: i64,
}

impl Booking {
    /// Open a PENDING booking held for `hold` from `created_at`.
    pub fn new(
        reference: String,
        user_id: Uuid,
        contact: ContactInfo,
        special_requests: Option<String>,
        created_at: DateTime<Utc>,
        hold: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference,
            user_id,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            refund_amount: Decimal::ZERO,
            payment_reference: None,
            contact,
            special_requests,
            cancellation_reason: None,
            created_at,
            updated_at: created_at,
            expires_at: Some(created_at + hold),
            confirmed_at: None,
            cancelled_at: None,
            tickets: Vec::new(),
            version: 0,
        }
    }

    pub fn add_ticket(&mut self, mut ticket: Ticket) {
        ticket.booking_id = self.id;
        self.total_amount += ticket.price;
        self.tickets.push(ticket);
    }

    /// A PENDING booking whose hold has run out.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && self.expires_at.is_some_and(|at| now > at)
    }

    pub fn update_status(&mut self, status: BookingStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Seats held by this booking, grouped by flight and cabin.
    pub fn seat_groups(&self) -> BTreeMap<(Uuid, CabinClass), u32> {
        let mut groups = BTreeMap::new();
        for ticket in self.tickets.iter().filter(|t| t.status.holds_seat()) {
            *groups.entry((ticket.flight_id, ticket.cabin_class)).or_insert(0) += 1;
        }
        groups
    }

    pub fn flight_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.tickets.iter().map(|t| t.flight_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn ticket_mut(&mut self, ticket_id: &Uuid) -> Option<&mut Ticket> {
        self.tickets.iter_mut().find(|t| t.id == *ticket_id)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TicketError {
    #[error("Ticket {ticket_number} cannot move from {from} to {to}")]
    InvalidTransition {
        ticket_number: String,
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error("Ticket {0} has no seat assigned")]
    SeatNotAssigned(String),
}
