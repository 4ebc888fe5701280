pub mod flight;
pub mod inventory;
pub mod pricing;
pub mod repository;
pub mod seating;

pub use flight::{CabinClass, Flight, FlightError, FlightStatus, SeatCounts, SeatPool};
pub use inventory::{InventoryError, InventoryManager, SeatInventory};
pub use pricing::{BookingAdvice, DemandLevel, PricingConfig, PricingEngine, PricingQuote, Recommendation};
pub use repository::FlightRepository;
pub use seating::{SeatAssigner, SeatAssignmentError, SeatPreference};
