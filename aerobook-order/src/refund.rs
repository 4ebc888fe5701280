use crate::models::Ticket;
use aerobook_catalog::pricing::round_money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

/// Tiered refund policy. The closer to departure, the smaller the share of
/// the fare (net of the cancellation fee) that comes back.
pub struct RefundCalculator;

impl RefundCalculator {
    /// Share of the refundable amount returned at `hours` before departure.
    pub fn refund_percentage(hours_until_departure: f64) -> Decimal {
        if hours_until_departure < 24.0 {
            dec!(0.50)
        } else if hours_until_departure < 48.0 {
            dec!(0.70)
        } else if hours_until_departure < 168.0 {
            dec!(0.80)
        } else {
            dec!(1.00)
        }
    }

    pub fn refund(ticket: &Ticket, hours_until_departure: f64) -> Decimal {
        if !ticket.refundable {
            return Decimal::ZERO;
        }
        if ticket.price <= Decimal::ZERO {
            warn!("Ticket {} has no positive price, refunding nothing", ticket.ticket_number);
            return Decimal::ZERO;
        }

        let fee = ticket.cancellation_fee.unwrap_or(Decimal::ZERO);
        let refundable = (ticket.price - fee).max(Decimal::ZERO);
        round_money(refundable * Self::refund_percentage(hours_until_departure))
    }

    /// Fractional hours between `now` and `departure`; negative once departed.
    pub fn hours_until(departure: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        (departure - now).num_seconds() as f64 / 3600.0
    }

    /// The booking-wide tier is set by the soonest departure.
    pub fn governing_hours<I>(hours: I) -> Option<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        hours.into_iter().reduce(f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FareType, Passenger};
    use aerobook_catalog::{BookingAdvice, CabinClass, DemandLevel, PricingQuote, Recommendation};
    use chrono::Duration;
    use uuid::Uuid;

    fn ticket(price: Decimal, fare_type: FareType) -> Ticket {
        let quote = PricingQuote {
            flight_id: Uuid::new_v4(),
            cabin_class: CabinClass::Economy,
            base_price: price,
            occupancy_multiplier: dec!(1.00),
            time_multiplier: dec!(1.00),
            day_of_week_multiplier: dec!(1.00),
            final_price: price,
            taxes: Decimal::ZERO,
            total_price: price,
            occupancy_percent: Decimal::ZERO,
            days_until_departure: 10,
            demand_level: DemandLevel::Low,
            recommendation: Recommendation {
                advice: BookingAdvice::CanWait,
                message: String::new(),
            },
        };
        Ticket::new("1760000000001".to_string(), &Passenger::new("Grace", "Hopper"), &quote, fare_type, None, Utc::now())
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(RefundCalculator::refund_percentage(23.999), dec!(0.50));
        assert_eq!(RefundCalculator::refund_percentage(24.0), dec!(0.70));
        assert_eq!(RefundCalculator::refund_percentage(47.999), dec!(0.70));
        assert_eq!(RefundCalculator::refund_percentage(48.0), dec!(0.80));
        assert_eq!(RefundCalculator::refund_percentage(167.999), dec!(0.80));
        assert_eq!(RefundCalculator::refund_percentage(168.0), dec!(1.00));
        assert_eq!(RefundCalculator::refund_percentage(-3.0), dec!(0.50));
    }

    #[test]
    fn test_refund_nets_out_fee() {
        // Standard fare carries a 50.00 fee.
        let t = ticket(dec!(250.00), FareType::Standard);
        assert_eq!(RefundCalculator::refund(&t, 200.0), dec!(200.00));
        assert_eq!(RefundCalculator::refund(&t, 100.0), dec!(160.00));
        assert_eq!(RefundCalculator::refund(&t, 30.0), dec!(140.00));
        assert_eq!(RefundCalculator::refund(&t, 2.0), dec!(100.00));
    }

    #[test]
    fn test_refund_rounds_half_up() {
        let t = ticket(dec!(100.01), FareType::Flex);
        // 100.01 * 0.50 = 50.005
        assert_eq!(RefundCalculator::refund(&t, 1.0), dec!(50.01));
    }

    #[test]
    fn test_non_refundable_and_fee_above_price() {
        assert_eq!(RefundCalculator::refund(&ticket(dec!(300.00), FareType::Saver), 500.0), Decimal::ZERO);
        assert_eq!(RefundCalculator::refund(&ticket(dec!(40.00), FareType::Standard), 500.0), Decimal::ZERO);
    }

    #[test]
    fn test_governing_hours_is_the_minimum() {
        assert_eq!(RefundCalculator::governing_hours(vec![200.0, 30.0, 90.0]), Some(30.0));
        assert_eq!(RefundCalculator::governing_hours(Vec::<f64>::new()), None);
    }

    #[test]
    fn test_hours_until() {
        let now = Utc::now();
        assert_eq!(RefundCalculator::hours_until(now + Duration::minutes(90), now), 1.5);
        assert!(RefundCalculator::hours_until(now - Duration::hours(1), now) < 0.0);
    }
}
