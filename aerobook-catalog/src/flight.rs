use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Fare tier a passenger travels in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    Economy,
    PremiumEconomy,
    Business,
    FirstClass,
}

/// Physical seat pool a cabin class draws from. Premium economy is sold out of
/// the economy cabin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatPool {
    Economy,
    Business,
    First,
}

impl CabinClass {
    pub const ALL: [CabinClass; 4] = [
        CabinClass::Economy,
        CabinClass::PremiumEconomy,
        CabinClass::Business,
        CabinClass::FirstClass,
    ];

    pub fn seat_pool(self) -> SeatPool {
        match self {
            CabinClass::Economy | CabinClass::PremiumEconomy => SeatPool::Economy,
            CabinClass::Business => SeatPool::Business,
            CabinClass::FirstClass => SeatPool::First,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CabinClass::Economy => "ECONOMY",
            CabinClass::PremiumEconomy => "PREMIUM_ECONOMY",
            CabinClass::Business => "BUSINESS",
            CabinClass::FirstClass => "FIRST_CLASS",
        }
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CabinClass {
    type Err = FlightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ECONOMY" => Ok(CabinClass::Economy),
            "PREMIUM_ECONOMY" => Ok(CabinClass::PremiumEconomy),
            "BUSINESS" => Ok(CabinClass::Business),
            "FIRST_CLASS" | "FIRST" => Ok(CabinClass::FirstClass),
            other => Err(FlightError::UnknownCabinClass(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    Scheduled,
    Delayed,
    Cancelled,
    Completed,
}

impl FlightStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "SCHEDULED",
            FlightStatus::Delayed => "DELAYED",
            FlightStatus::Cancelled => "CANCELLED",
            FlightStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for FlightStatus {
    type Err = FlightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(FlightStatus::Scheduled),
            "DELAYED" => Ok(FlightStatus::Delayed),
            "CANCELLED" => Ok(FlightStatus::Cancelled),
            "COMPLETED" => Ok(FlightStatus::Completed),
            other => Err(FlightError::UnknownStatus(other.to_string())),
        }
    }
}

/// Seat numbers per pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SeatCounts {
    pub economy: u32,
    pub business: u32,
    pub first: u32,
}

impl SeatCounts {
    pub fn new(economy: u32, business: u32, first: u32) -> Self {
        Self { economy, business, first }
    }

    pub fn get(&self, pool: SeatPool) -> u32 {
        match pool {
            SeatPool::Economy => self.economy,
            SeatPool::Business => self.business,
            SeatPool::First => self.first,
        }
    }

    pub(crate) fn get_mut(&mut self, pool: SeatPool) -> &mut u32 {
        match pool {
            SeatPool::Economy => &mut self.economy,
            SeatPool::Business => &mut self.business,
            SeatPool::First => &mut self.first,
        }
    }

    pub fn sum(&self) -> u32 {
        self.economy + self.business + self.first
    }
}

/// A scheduled departure with per-cabin seat counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub total_seats: SeatCounts,
    pub available: SeatCounts,
    /// Always equal to `available.sum()`.
    pub available_seats: u32,
    pub base_price: Decimal,
    pub business_price: Option<Decimal>,
    pub first_class_price: Option<Decimal>,
    pub status: FlightStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flight {
    /// Build a new, fully available flight. Route codes are upper-cased and
    /// duration is derived from the schedule.
    pub fn new(
        flight_number: &str,
        origin: &str,
        destination: &str,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
        total_seats: SeatCounts,
        base_price: Decimal,
    ) -> Result<Self, FlightError> {
        let origin = origin.trim().to_ascii_uppercase();
        let destination = destination.trim().to_ascii_uppercase();

        for code in [&origin, &destination] {
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(FlightError::InvalidAirportCode(code.clone()));
            }
        }
        if origin == destination {
            return Err(FlightError::InvalidRoute(origin));
        }
        if arrival_time <= departure_time {
            return Err(FlightError::InvalidSchedule);
        }
        if flight_number.trim().is_empty() {
            return Err(FlightError::MissingFlightNumber);
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            flight_number: flight_number.trim().to_ascii_uppercase(),
            origin,
            destination,
            departure_time,
            arrival_time,
            duration_minutes: (arrival_time - departure_time).num_minutes(),
            total_seats,
            available: total_seats,
            available_seats: total_seats.sum(),
            base_price,
            business_price: None,
            first_class_price: None,
            status: FlightStatus::Scheduled,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_business_price(mut self, price: Decimal) -> Self {
        self.business_price = Some(price);
        self
    }

    pub fn with_first_class_price(mut self, price: Decimal) -> Self {
        self.first_class_price = Some(price);
        self
    }

    pub fn total_for(&self, cabin_class: CabinClass) -> u32 {
        self.total_seats.get(cabin_class.seat_pool())
    }

    pub fn available_for(&self, cabin_class: CabinClass) -> u32 {
        self.available.get(cabin_class.seat_pool())
    }

    pub fn update_status(&mut self, status: FlightStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FlightError {
    #[error("Invalid airport code: {0}")]
    InvalidAirportCode(String),

    #[error("Origin and destination are both {0}")]
    InvalidRoute(String),

    #[error("Arrival must be after departure")]
    InvalidSchedule,

    #[error("Flight number is required")]
    MissingFlightNumber,

    #[error("Unknown cabin class: {0}")]
    UnknownCabinClass(String),

    #[error("Unknown flight status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn departure() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, 20, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_new_flight_derives_fields() {
        let flight = Flight::new(
            "ab 123",
            "lhr",
            "JFK",
            departure(),
            departure() + Duration::minutes(475),
            SeatCounts::new(150, 24, 8),
            dec!(320.00),
        )
        .unwrap();

        assert_eq!(flight.flight_number, "AB 123");
        assert_eq!(flight.origin, "LHR");
        assert_eq!(flight.duration_minutes, 475);
        assert_eq!(flight.available, flight.total_seats);
        assert_eq!(flight.available_seats, 182);
        assert_eq!(flight.status, FlightStatus::Scheduled);
    }

    #[test]
    fn test_new_flight_rejects_bad_route_and_schedule() {
        let seats = SeatCounts::new(10, 0, 0);
        let err = Flight::new("AB1", "LHR", "LHR", departure(), departure() + Duration::hours(1), seats, dec!(10))
            .unwrap_err();
        assert_eq!(err, FlightError::InvalidRoute("LHR".to_string()));

        let err = Flight::new("AB1", "LHR", "CDG", departure(), departure(), seats, dec!(10)).unwrap_err();
        assert_eq!(err, FlightError::InvalidSchedule);

        let err = Flight::new("AB1", "LONDON", "CDG", departure(), departure() + Duration::hours(1), seats, dec!(10))
            .unwrap_err();
        assert!(matches!(err, FlightError::InvalidAirportCode(_)));
    }

    #[test]
    fn test_premium_economy_shares_economy_pool() {
        assert_eq!(CabinClass::PremiumEconomy.seat_pool(), SeatPool::Economy);
        assert_eq!(CabinClass::FirstClass.seat_pool(), SeatPool::First);
        assert_eq!("first_class".parse::<CabinClass>().unwrap(), CabinClass::FirstClass);
    }
}
