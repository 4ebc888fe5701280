pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod flight_repo;

pub use app_config::{Config, DatabaseConfig, KafkaConfig, WorkerConfig};
pub use booking_repo::{PgBookingRepository, PgPassengerRepository};
pub use database::DbClient;
pub use events::EventProducer;
pub use flight_repo::PgFlightRepository;
