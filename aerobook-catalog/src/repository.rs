use crate::flight::Flight;
use aerobook_core::StoreResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// Flight lookups the engine needs; seat counters go through
/// [`crate::inventory::SeatInventory`] instead of `save_flight`.
#[async_trait]
pub trait FlightRepository: Send + Sync {
    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>>;

    async fn save_flight(&self, flight: &Flight) -> StoreResult<()>;

    async fn search_flights(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<Flight>>;
}
