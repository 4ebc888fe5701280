use crate::flight::{CabinClass, Flight};
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Round a monetary amount half-up to cents.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingConfig {
    /// Applied on top of the final fare.
    pub tax_rate: Decimal,

    /// Substituted when a flight carries no usable base fare.
    pub fallback_base_price: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.15),
            fallback_base_price: dec!(100.00),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemandLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingAdvice {
    BookNow,
    BookSoon,
    GoodTime,
    CanWait,
}

impl From<DemandLevel> for BookingAdvice {
    fn from(level: DemandLevel) -> Self {
        match level {
            DemandLevel::VeryHigh => BookingAdvice::BookNow,
            DemandLevel::High => BookingAdvice::BookSoon,
            DemandLevel::Medium => BookingAdvice::GoodTime,
            DemandLevel::Low => BookingAdvice::CanWait,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub advice: BookingAdvice,
    pub message: String,
}

/// A price computed for one flight, cabin and booking day. Never cached: it
/// goes stale as soon as a seat sells or a day passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingQuote {
    pub flight_id: Uuid,
    pub cabin_class: CabinClass,
    pub base_price: Decimal,
    pub occupancy_multiplier: Decimal,
    pub time_multiplier: Decimal,
    pub day_of_week_multiplier: Decimal,
    pub final_price: Decimal,
    pub taxes: Decimal,
    pub total_price: Decimal,
    pub occupancy_percent: Decimal,
    pub days_until_departure: i64,
    pub demand_level: DemandLevel,
    pub recommendation: Recommendation,
}

/// Dynamic fare calculation from occupancy, booking window and departure day.
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn quote(&self, flight: &Flight, cabin_class: CabinClass, booking_date: NaiveDate) -> PricingQuote {
        let base_price = self.base_price(flight, cabin_class);

        let occupancy_rate = flight.occupancy_rate(cabin_class);
        let days_until_departure = (flight.departure_time.date_naive() - booking_date).num_days().max(0);

        let occupancy_multiplier = Self::occupancy_multiplier(occupancy_rate);
        let time_multiplier = Self::time_multiplier(days_until_departure);
        let day_of_week_multiplier = Self::day_of_week_multiplier(flight.departure_time.weekday());

        let final_price =
            round_money(base_price * occupancy_multiplier * time_multiplier * day_of_week_multiplier);
        let taxes = round_money(final_price * self.config.tax_rate);
        let occupancy_percent = round_money(occupancy_rate * dec!(100));
        let demand_level = Self::demand_level(occupancy_rate, days_until_departure);

        PricingQuote {
            flight_id: flight.id,
            cabin_class,
            base_price,
            occupancy_multiplier,
            time_multiplier,
            day_of_week_multiplier,
            final_price,
            taxes,
            total_price: final_price + taxes,
            occupancy_percent,
            days_until_departure,
            demand_level,
            recommendation: Self::recommendation(demand_level, occupancy_percent, days_until_departure),
        }
    }

    /// Fare before any multiplier. Premium cabins fall back to a multiple of
    /// the economy fare when they have no price of their own.
    pub fn base_price(&self, flight: &Flight, cabin_class: CabinClass) -> Decimal {
        let economy = if flight.base_price > Decimal::ZERO {
            flight.base_price
        } else {
            warn!(
                "Flight {} has no valid base price ({}), using fallback {}",
                flight.flight_number, flight.base_price, self.config.fallback_base_price
            );
            self.config.fallback_base_price
        };

        let cabin_price = |price: Option<Decimal>, factor: Decimal| match price {
            Some(p) if p > Decimal::ZERO => p,
            _ => round_money(economy * factor),
        };

        match cabin_class {
            CabinClass::Economy | CabinClass::PremiumEconomy => economy,
            CabinClass::Business => cabin_price(flight.business_price, dec!(2.5)),
            CabinClass::FirstClass => cabin_price(flight.first_class_price, dec!(4.0)),
        }
    }

    pub fn occupancy_multiplier(occupancy_rate: Decimal) -> Decimal {
        if occupancy_rate > dec!(0.90) {
            dec!(1.50)
        } else if occupancy_rate > dec!(0.75) {
            dec!(1.30)
        } else if occupancy_rate > dec!(0.50) {
            dec!(1.15)
        } else {
            dec!(1.00)
        }
    }

    pub fn time_multiplier(days_until_departure: i64) -> Decimal {
        match days_until_departure {
            d if d <= 1 => dec!(1.30),
            d if d <= 3 => dec!(1.15),
            d if d <= 7 => dec!(1.10),
            d if d <= 14 => dec!(1.05),
            _ => dec!(1.00),
        }
    }

    pub fn day_of_week_multiplier(weekday: Weekday) -> Decimal {
        match weekday {
            Weekday::Fri | Weekday::Sun => dec!(1.20),
            Weekday::Wed => dec!(0.90),
            _ => dec!(1.00),
        }
    }

    pub fn demand_level(occupancy_rate: Decimal, days_until_departure: i64) -> DemandLevel {
        if occupancy_rate > dec!(0.80) || days_until_departure < 3 {
            DemandLevel::VeryHigh
        } else if occupancy_rate > dec!(0.60) || days_until_departure < 7 {
            DemandLevel::High
        } else if occupancy_rate > dec!(0.40) || days_until_departure < 14 {
            DemandLevel::Medium
        } else {
            DemandLevel::Low
        }
    }

    fn recommendation(level: DemandLevel, occupancy_percent: Decimal, days: i64) -> Recommendation {
        let message = match level {
            DemandLevel::VeryHigh => format!(
                "Very high demand: {}% of seats sold with {} days to go. Book now, prices are likely to rise.",
                occupancy_percent, days
            ),
            DemandLevel::High => format!(
                "High demand: {}% of seats sold with {} days to go. Book soon.",
                occupancy_percent, days
            ),
            DemandLevel::Medium => format!(
                "Moderate demand: {}% of seats sold with {} days to go. A good time to book.",
                occupancy_percent, days
            ),
            DemandLevel::Low => format!(
                "Low demand: {}% of seats sold with {} days to go. Prices are stable, you can wait.",
                occupancy_percent, days
            ),
        };

        Recommendation {
            advice: level.into(),
            message,
        }
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight::SeatCounts;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    // 2026-11-20 is a Friday.
    fn friday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, 20, 9, 0, 0).unwrap()
    }

    fn flight_departing(departure: DateTime<Utc>, economy_sold: u32) -> Flight {
        let mut flight = Flight::new(
            "AB200",
            "LHR",
            "MAD",
            departure,
            departure + Duration::hours(2),
            SeatCounts::new(100, 20, 8),
            dec!(200.00),
        )
        .unwrap();
        flight.reserve(CabinClass::Economy, economy_sold, departure - Duration::days(30)).unwrap();
        flight
    }

    #[test]
    fn test_occupancy_boundaries_are_strict() {
        assert_eq!(PricingEngine::occupancy_multiplier(dec!(0.91)), dec!(1.50));
        assert_eq!(PricingEngine::occupancy_multiplier(dec!(0.90)), dec!(1.30));
        assert_eq!(PricingEngine::occupancy_multiplier(dec!(0.75)), dec!(1.15));
        assert_eq!(PricingEngine::occupancy_multiplier(dec!(0.50)), dec!(1.00));
        assert_eq!(PricingEngine::occupancy_multiplier(Decimal::ZERO), dec!(1.00));
    }

    #[test]
    fn test_time_multiplier_steps() {
        assert_eq!(PricingEngine::time_multiplier(0), dec!(1.30));
        assert_eq!(PricingEngine::time_multiplier(1), dec!(1.30));
        assert_eq!(PricingEngine::time_multiplier(3), dec!(1.15));
        assert_eq!(PricingEngine::time_multiplier(7), dec!(1.10));
        assert_eq!(PricingEngine::time_multiplier(14), dec!(1.05));
        assert_eq!(PricingEngine::time_multiplier(15), dec!(1.00));
    }

    #[test]
    fn test_day_of_week_multiplier() {
        assert_eq!(PricingEngine::day_of_week_multiplier(Weekday::Fri), dec!(1.20));
        assert_eq!(PricingEngine::day_of_week_multiplier(Weekday::Sun), dec!(1.20));
        assert_eq!(PricingEngine::day_of_week_multiplier(Weekday::Wed), dec!(0.90));
        assert_eq!(PricingEngine::day_of_week_multiplier(Weekday::Mon), dec!(1.00));
    }

    #[test]
    fn test_same_day_full_friday_flight() {
        let engine = PricingEngine::default();
        let flight = flight_departing(friday(), 91);

        let quote = engine.quote(&flight, CabinClass::Economy, friday().date_naive());

        assert_eq!(quote.days_until_departure, 0);
        assert_eq!(quote.occupancy_multiplier, dec!(1.50));
        assert_eq!(quote.time_multiplier, dec!(1.30));
        assert_eq!(quote.day_of_week_multiplier, dec!(1.20));
        // 200 x 1.50 x 1.30 x 1.20
        assert_eq!(quote.final_price, dec!(468.00));
        assert_eq!(quote.taxes, dec!(70.20));
        assert_eq!(quote.total_price, dec!(538.20));
        assert_eq!(quote.occupancy_percent, dec!(91.00));
        assert_eq!(quote.demand_level, DemandLevel::VeryHigh);
        assert_eq!(quote.recommendation.advice, BookingAdvice::BookNow);
    }

    #[test]
    fn test_exactly_ninety_percent_uses_lower_tier() {
        let engine = PricingEngine::default();
        let flight = flight_departing(friday(), 90);
        let quote = engine.quote(&flight, CabinClass::Economy, friday().date_naive());
        assert_eq!(quote.occupancy_multiplier, dec!(1.30));
    }

    #[test]
    fn test_booking_after_departure_floors_days_at_zero() {
        let engine = PricingEngine::default();
        let flight = flight_departing(friday(), 0);
        let quote = engine.quote(&flight, CabinClass::Economy, friday().date_naive() + Duration::days(3));
        assert_eq!(quote.days_until_departure, 0);
    }

    #[test]
    fn test_quiet_wednesday_flight_far_out() {
        let engine = PricingEngine::default();
        // 2026-11-18 is a Wednesday.
        let departure = Utc.with_ymd_and_hms(2026, 11, 18, 7, 0, 0).unwrap();
        let flight = flight_departing(departure, 10);

        let booked = departure.date_naive() - Duration::days(60);
        let quote = engine.quote(&flight, CabinClass::Economy, booked);

        assert_eq!(quote.final_price, dec!(180.00));
        assert_eq!(quote.taxes, dec!(27.00));
        assert_eq!(quote.demand_level, DemandLevel::Low);
        assert_eq!(quote.recommendation.advice, BookingAdvice::CanWait);
    }

    #[test]
    fn test_cabin_base_prices() {
        let engine = PricingEngine::default();
        let flight = flight_departing(friday(), 0);
        assert_eq!(engine.base_price(&flight, CabinClass::PremiumEconomy), dec!(200.00));
        assert_eq!(engine.base_price(&flight, CabinClass::Business), dec!(500.00));
        assert_eq!(engine.base_price(&flight, CabinClass::FirstClass), dec!(800.00));

        let priced = flight.clone().with_business_price(dec!(650.00)).with_first_class_price(dec!(1200.00));
        assert_eq!(engine.base_price(&priced, CabinClass::Business), dec!(650.00));
        assert_eq!(engine.base_price(&priced, CabinClass::FirstClass), dec!(1200.00));
    }

    #[test]
    fn test_missing_base_price_uses_fallback() {
        let engine = PricingEngine::default();
        let mut flight = flight_departing(friday(), 0);
        flight.base_price = Decimal::ZERO;

        assert_eq!(engine.base_price(&flight, CabinClass::Economy), dec!(100.00));
        assert_eq!(engine.base_price(&flight, CabinClass::Business), dec!(250.00));
    }

    #[test]
    fn test_demand_levels() {
        assert_eq!(PricingEngine::demand_level(dec!(0.81), 30), DemandLevel::VeryHigh);
        assert_eq!(PricingEngine::demand_level(dec!(0.10), 2), DemandLevel::VeryHigh);
        assert_eq!(PricingEngine::demand_level(dec!(0.61), 30), DemandLevel::High);
        assert_eq!(PricingEngine::demand_level(dec!(0.10), 6), DemandLevel::High);
        assert_eq!(PricingEngine::demand_level(dec!(0.41), 30), DemandLevel::Medium);
        assert_eq!(PricingEngine::demand_level(dec!(0.10), 13), DemandLevel::Medium);
        assert_eq!(PricingEngine::demand_level(dec!(0.40), 14), DemandLevel::Low);
    }

    #[test]
    fn test_advice_follows_demand_level() {
        assert_eq!(BookingAdvice::from(DemandLevel::High), BookingAdvice::BookSoon);
        assert_eq!(BookingAdvice::from(DemandLevel::Medium), BookingAdvice::GoodTime);
    }
}
