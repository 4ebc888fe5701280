use crate::models::{LegOption, PairPrice, RoundTripCombination};
use aerobook_catalog::pricing::round_money;
use aerobook_catalog::{CabinClass, DemandLevel, Flight, PricingEngine, PricingQuote};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

const BASE_SCORE: Decimal = dec!(50);
const MAX_PRICE_BONUS: Decimal = dec!(30);
const GOOD_DEAL_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoundTripConfig {
    /// Taken off the combined fare of a round trip.
    pub discount_rate: Decimal,
    /// Combined price at which the price bonus reaches zero.
    pub reference_price: Decimal,
    pub max_results: usize,
}

impl Default for RoundTripConfig {
    fn default() -> Self {
        Self {
            discount_rate: dec!(0.05),
            reference_price: dec!(350),
            max_results: 10,
        }
    }
}

/// Ranks outbound/return pairings by price, availability and demand.
pub struct RoundTripRecommender {
    pricing: PricingEngine,
    config: RoundTripConfig,
}

impl RoundTripRecommender {
    pub fn new(pricing: PricingEngine, config: RoundTripConfig) -> Self {
        Self { pricing, config }
    }

    pub fn config(&self) -> &RoundTripConfig {
        &self.config
    }

    /// Price both sets of flights in `cabin_class` and rank every pairing.
    pub fn recommend(
        &self,
        outbound_flights: &[Flight],
        return_flights: &[Flight],
        cabin_class: CabinClass,
        booking_date: NaiveDate,
    ) -> Vec<RoundTripCombination> {
        let legs = |flights: &[Flight]| -> Vec<LegOption> {
            flights
                .iter()
                .map(|f| LegOption::new(f, self.pricing.quote(f, cabin_class, booking_date)))
                .collect()
        };
        self.combine(&legs(outbound_flights), &legs(return_flights))
    }

    /// Score every outbound x return pair and keep the best, highest score
    /// first. Equal scores keep their input order.
    pub fn combine(&self, outbound: &[LegOption], inbound: &[LegOption]) -> Vec<RoundTripCombination> {
        let mut combinations: Vec<RoundTripCombination> = outbound
            .iter()
            .flat_map(|out| inbound.iter().map(move |ret| (out, ret)))
            .map(|(out, ret)| {
                let price = self.price_pair(out, ret);
                let score = self.score(out, ret, price.total_after_discount);
                RoundTripCombination {
                    outbound: out.clone(),
                    inbound: ret.clone(),
                    price,
                    score,
                }
            })
            .collect();

        debug!(
            "Scored {} round-trip combinations from {} outbound and {} return options",
            combinations.len(),
            outbound.len(),
            inbound.len()
        );

        combinations.sort_by(|a, b| b.score.cmp(&a.score));
        combinations.truncate(self.config.max_results);
        combinations
    }

    /// Discounted price of a single pairing.
    pub fn price_pair(&self, outbound: &LegOption, inbound: &LegOption) -> PairPrice {
        let total_before = outbound.price() + inbound.price();
        let total_after = round_money(total_before * (Decimal::ONE - self.config.discount_rate));
        PairPrice {
            outbound_price: outbound.price(),
            return_price: inbound.price(),
            total_before_discount: total_before,
            discount_amount: total_before - total_after,
            total_after_discount: total_after,
            good_deal: Self::is_good_deal(&outbound.quote, &inbound.quote),
        }
    }

    pub fn score(&self, outbound: &LegOption, inbound: &LegOption, total_after_discount: Decimal) -> Decimal {
        let mut score = BASE_SCORE + self.price_bonus(total_after_discount);

        let seats = outbound.available_seats + inbound.available_seats;
        if seats > 100 {
            score += dec!(10);
        } else if seats > 50 {
            score += dec!(5);
        }

        let low = [&outbound.quote, &inbound.quote]
            .iter()
            .filter(|q| q.demand_level == DemandLevel::Low)
            .count();
        score += match low {
            2 => dec!(10),
            1 => dec!(5),
            _ => Decimal::ZERO,
        };

        if outbound.quote.demand_level == DemandLevel::VeryHigh || inbound.quote.demand_level == DemandLevel::VeryHigh {
            score -= dec!(10);
        }

        round_money(score.clamp(Decimal::ZERO, dec!(100)))
    }

    fn price_bonus(&self, total: Decimal) -> Decimal {
        let reference = self.config.reference_price;
        if reference <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (MAX_PRICE_BONUS * (reference - total) / reference).clamp(Decimal::ZERO, MAX_PRICE_BONUS)
    }

    /// Both legs at low or medium demand, or either leg more than 30 days out.
    pub fn is_good_deal(outbound: &PricingQuote, inbound: &PricingQuote) -> bool {
        let calm = |q: &PricingQuote| matches!(q.demand_level, DemandLevel::Low | DemandLevel::Medium);
        (calm(outbound) && calm(inbound))
            || outbound.days_until_departure > GOOD_DEAL_DAYS
            || inbound.days_until_departure > GOOD_DEAL_DAYS
    }
}

impl Default for RoundTripRecommender {
    fn default() -> Self {
        Self::new(PricingEngine::default(), RoundTripConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerobook_catalog::{BookingAdvice, Recommendation, SeatCounts};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn leg(price: Decimal, seats: u32, demand: DemandLevel, days: i64) -> LegOption {
        LegOption {
            flight_id: Uuid::new_v4(),
            flight_number: "AB1".to_string(),
            origin: "LHR".to_string(),
            destination: "JFK".to_string(),
            departure_time: Utc::now(),
            available_seats: seats,
            quote: PricingQuote {
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
                days_until_departure: days,
                demand_level: demand,
                recommendation: Recommendation {
                    advice: BookingAdvice::from(demand),
                    message: String::new(),
                },
            },
        }
    }

    #[test]
    fn test_discount_is_exactly_five_percent() {
        let recommender = RoundTripRecommender::default();
        let price = recommender.price_pair(
            &leg(dec!(230.00), 10, DemandLevel::Low, 20),
            &leg(dec!(187.45), 10, DemandLevel::Low, 25),
        );

        assert_eq!(price.total_before_discount, dec!(417.45));
        // 417.45 * 0.95 = 396.5775
        assert_eq!(price.total_after_discount, dec!(396.58));
        assert_eq!(price.discount_amount, dec!(20.87));
    }

    #[test]
    fn test_score_components() {
        let recommender = RoundTripRecommender::default();

        // 175 is half the reference price: +15. 120 seats: +10. Both low: +10.
        let best = recommender.score(
            &leg(dec!(100), 60, DemandLevel::Low, 40),
            &leg(dec!(100), 60, DemandLevel::Low, 40),
            dec!(175),
        );
        assert_eq!(best, dec!(85.00));

        // Over the reference, few seats, one leg very high: 50 - 10.
        let worst = recommender.score(
            &leg(dec!(300), 10, DemandLevel::VeryHigh, 1),
            &leg(dec!(300), 10, DemandLevel::High, 2),
            dec!(570),
        );
        assert_eq!(worst, dec!(40.00));

        // Free trip, plenty of seats, one leg low.
        let mixed = recommender.score(
            &leg(dec!(0), 40, DemandLevel::Low, 40),
            &leg(dec!(0), 20, DemandLevel::Medium, 40),
            Decimal::ZERO,
        );
        assert_eq!(mixed, dec!(90.00));
    }

    #[test]
    fn test_scores_never_increase_and_ties_keep_input_order() {
        let recommender = RoundTripRecommender::default();
        let outbound = vec![
            leg(dec!(150), 10, DemandLevel::Medium, 20),
            leg(dec!(150), 10, DemandLevel::Medium, 20),
            leg(dec!(90), 80, DemandLevel::Low, 40),
        ];
        let inbound = vec![leg(dec!(120), 10, DemandLevel::Medium, 25), leg(dec!(400), 5, DemandLevel::VeryHigh, 1)];

        let ranked = recommender.combine(&outbound, &inbound);
        assert_eq!(ranked.len(), 6);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranked[0].outbound.flight_id, outbound[2].flight_id);

        // The two identical outbound legs tie; the first listed ranks first.
        let tied: Vec<_> = ranked
            .iter()
            .filter(|c| c.inbound.flight_id == inbound[0].flight_id && c.outbound.price() == dec!(150))
            .map(|c| c.outbound.flight_id)
            .collect();
        assert_eq!(tied, vec![outbound[0].flight_id, outbound[1].flight_id]);
    }

    #[test]
    fn test_keeps_top_ten() {
        let recommender = RoundTripRecommender::default();
        let outbound: Vec<_> = (0..4).map(|i| leg(dec!(100) + Decimal::from(i), 10, DemandLevel::Low, 20)).collect();
        let inbound: Vec<_> = (0..4).map(|i| leg(dec!(100) + Decimal::from(i), 10, DemandLevel::Low, 20)).collect();

        assert_eq!(recommender.combine(&outbound, &inbound).len(), 10);
        assert!(recommender.combine(&outbound, &[]).is_empty());
    }

    #[test]
    fn test_good_deal_rules() {
        let low = leg(dec!(100), 10, DemandLevel::Low, 5);
        let medium = leg(dec!(100), 10, DemandLevel::Medium, 5);
        let high_near = leg(dec!(100), 10, DemandLevel::High, 5);
        let high_far = leg(dec!(100), 10, DemandLevel::High, 31);
        let high_edge = leg(dec!(100), 10, DemandLevel::High, 30);

        assert!(RoundTripRecommender::is_good_deal(&low.quote, &medium.quote));
        assert!(!RoundTripRecommender::is_good_deal(&low.quote, &high_near.quote));
        assert!(RoundTripRecommender::is_good_deal(&high_near.quote, &high_far.quote));
        assert!(!RoundTripRecommender::is_good_deal(&high_edge.quote, &high_near.quote));
    }

    #[test]
    fn test_recommend_prices_real_flights() {
        let out = Flight::new(
            "AB100",
            "LHR",
            "JFK",
            Utc.with_ymd_and_hms(2026, 12, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 12, 1, 18, 0, 0).unwrap(),
            SeatCounts::new(100, 20, 8),
            dec!(200.00),
        )
        .unwrap();
        let back = Flight::new(
            "AB101",
            "JFK",
            "LHR",
            Utc.with_ymd_and_hms(2026, 12, 8, 20, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 12, 9, 8, 0, 0).unwrap(),
            SeatCounts::new(100, 20, 8),
            dec!(180.00),
        )
        .unwrap();

        let ranked = RoundTripRecommender::default().recommend(
            &[out],
            &[back],
            CabinClass::Economy,
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        );

        assert_eq!(ranked.len(), 1);
        // Tuesday out at 230.00; Tuesday back at 207.00.
        assert_eq!(ranked[0].price.total_before_discount, dec!(437.00));
        assert_eq!(ranked[0].price.total_after_discount, dec!(415.15));
        assert!(ranked[0].price.good_deal);
    }
}
