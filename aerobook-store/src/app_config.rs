use aerobook_catalog::PricingConfig;
use aerobook_offer::RoundTripConfig;
use aerobook_order::BookingPolicy;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Absent means events are only logged.
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub booking: BookingPolicy,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub round_trip: RoundTripConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    "booking-events".to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub sweep_interval_seconds: u64,
    /// Bookings expired per repository round trip.
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 30,
            batch_size: 100,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Layered load: `{dir}/default`, then `{dir}/{RUN_MODE}` and `{dir}/local`
    /// when present, then `AEROBOOK__SECTION__KEY` environment variables.
    pub fn load_from(dir: &str) -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name(&format!("{}/default", dir)))
            .add_source(config::File::with_name(&format!("{}/{}", dir, run_mode)).required(false))
            // Not checked in.
            .add_source(config::File::with_name(&format!("{}/local", dir)).required(false))
            .add_source(config::Environment::with_prefix("AEROBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parse a single TOML document, without the file and environment layers.
    pub fn from_toml(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
