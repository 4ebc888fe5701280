use aerobook_catalog::{Flight, PricingQuote};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One priced flight offered for either direction of a trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegOption {
    pub flight_id: Uuid,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub available_seats: u32,
    pub quote: PricingQuote,
}

impl LegOption {
    pub fn new(flight: &Flight, quote: PricingQuote) -> Self {
        Self {
            flight_id: flight.id,
            flight_number: flight.flight_number.clone(),
            origin: flight.origin.clone(),
            destination: flight.destination.clone(),
            departure_time: flight.departure_time,
            available_seats: flight.available_seats,
            quote,
        }
    }

    /// Per-passenger price including taxes.
    pub fn price(&self) -> Decimal {
        self.quote.total_price
    }
}

/// Price of an outbound and return flight bought together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairPrice {
    pub outbound_price: Decimal,
    pub return_price: Decimal,
    pub total_before_discount: Decimal,
    pub discount_amount: Decimal,
    pub total_after_discount: Decimal,
    pub good_deal: bool,
}

/// A scored outbound/return pairing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundTripCombination {
    pub outbound: LegOption,
    pub inbound: LegOption,
    pub price: PairPrice,
    /// 0 to 100, higher is better.
    pub score: Decimal,
}
