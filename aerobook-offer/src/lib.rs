pub mod models;
pub mod roundtrip;

pub use models::{LegOption, PairPrice, RoundTripCombination};
pub use roundtrip::{RoundTripConfig, RoundTripRecommender};
