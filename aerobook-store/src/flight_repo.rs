use aerobook_catalog::{
    CabinClass, Flight, FlightRepository, FlightStatus, InventoryError, SeatCounts, SeatInventory, SeatPool,
};
use aerobook_core::{Clock, StoreResult, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const FLIGHT_COLUMNS: &str = "id, flight_number, origin, destination, departure_time, arrival_time, \
    duration_minutes, total_economy, total_business, total_first, available_economy, available_business, \
    available_first, available_seats, base_price, business_price, first_class_price, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    flight_number: String,
    origin: String,
    destination: String,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    duration_minutes: i64,
    total_economy: i32,
    total_business: i32,
    total_first: i32,
    available_economy: i32,
    available_business: i32,
    available_first: i32,
    available_seats: i32,
    base_price: Decimal,
    business_price: Option<Decimal>,
    first_class_price: Option<Decimal>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = aerobook_core::StoreError;

    fn try_from(row: FlightRow) -> Result<Self, Self::Error> {
        Ok(Flight {
            id: row.id,
            flight_number: row.flight_number,
            origin: row.origin,
            destination: row.destination,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            duration_minutes: row.duration_minutes,
            total_seats: SeatCounts::new(
                row.total_economy as u32,
                row.total_business as u32,
                row.total_first as u32,
            ),
            available: SeatCounts::new(
                row.available_economy as u32,
                row.available_business as u32,
                row.available_first as u32,
            ),
            available_seats: row.available_seats as u32,
            base_price: row.base_price,
            business_price: row.business_price,
            first_class_price: row.first_class_price,
            status: row.status.parse::<FlightStatus>()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Counter column backing a cabin's seat pool.
fn available_column(pool: SeatPool) -> &'static str {
    match pool {
        SeatPool::Economy => "available_economy",
        SeatPool::Business => "available_business",
        SeatPool::First => "available_first",
    }
}

pub struct PgFlightRepository {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgFlightRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock stamping `updated_at` on seat counter changes.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn available(&self, flight_id: Uuid, cabin_class: CabinClass) -> Result<Option<u32>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM flights WHERE id = $1",
            available_column(cabin_class.seat_pool())
        );
        let available: Option<i32> = sqlx::query_scalar(&sql)
            .bind(flight_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(available.map(|n| n as u32))
    }
}

#[async_trait]
impl FlightRepository for PgFlightRepository {
    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        let sql = format!("SELECT {} FROM flights WHERE id = $1", FLIGHT_COLUMNS);
        let row: Option<FlightRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(Flight::try_from).transpose()
    }

    async fn save_flight(&self, flight: &Flight) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO flights (id, flight_number, origin, destination, departure_time, arrival_time,
                duration_minutes, total_economy, total_business, total_first, available_economy,
                available_business, available_first, available_seats, base_price, business_price,
                first_class_price, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (id) DO UPDATE SET
                flight_number = EXCLUDED.flight_number,
                departure_time = EXCLUDED.departure_time,
                arrival_time = EXCLUDED.arrival_time,
                duration_minutes = EXCLUDED.duration_minutes,
                base_price = EXCLUDED.base_price,
                business_price = EXCLUDED.business_price,
                first_class_price = EXCLUDED.first_class_price,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(flight.id)
        .bind(&flight.flight_number)
        .bind(&flight.origin)
        .bind(&flight.destination)
        .bind(flight.departure_time)
        .bind(flight.arrival_time)
        .bind(flight.duration_minutes)
        .bind(flight.total_seats.economy as i32)
        .bind(flight.total_seats.business as i32)
        .bind(flight.total_seats.first as i32)
        .bind(flight.available.economy as i32)
        .bind(flight.available.business as i32)
        .bind(flight.available.first as i32)
        .bind(flight.available_seats as i32)
        .bind(flight.base_price)
        .bind(flight.business_price)
        .bind(flight.first_class_price)
        .bind(flight.status.as_str())
        .bind(flight.created_at)
        .bind(flight.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn search_flights(&self, origin: &str, destination: &str, date: NaiveDate) -> StoreResult<Vec<Flight>> {
        let sql = format!(
            "SELECT {} FROM flights \
             WHERE origin = $1 AND destination = $2 AND (departure_time AT TIME ZONE 'UTC')::date = $3 \
             ORDER BY departure_time",
            FLIGHT_COLUMNS
        );
        let rows: Vec<FlightRow> = sqlx::query_as(&sql)
            .bind(origin.to_ascii_uppercase())
            .bind(destination.to_ascii_uppercase())
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Flight::try_from).collect()
    }
}

#[async_trait]
impl SeatInventory for PgFlightRepository {
    /// One conditional UPDATE: the availability check and the decrement
    /// happen under the same row lock.
    async fn reserve(&self, flight_id: Uuid, cabin_class: CabinClass, count: u32) -> Result<(), InventoryError> {
        let column = available_column(cabin_class.seat_pool());
        let sql = format!(
            "UPDATE flights SET {col} = {col} - $2, available_seats = available_seats - $2, updated_at = $3 \
             WHERE id = $1 AND {col} >= $2",
            col = column
        );

        let result = sqlx::query(&sql)
            .bind(flight_id)
            .bind(count as i32)
            .bind(self.clock.now())
            .execute(&self.pool)
            .await
            .map_err(|e| InventoryError::Storage(e.into()))?;

        if result.rows_affected() == 1 {
            debug!("Reserved {} {} seats on flight {}", count, cabin_class, flight_id);
            return Ok(());
        }

        match self
            .available(flight_id, cabin_class)
            .await
            .map_err(|e| InventoryError::Storage(e.into()))?
        {
            Some(available) => Err(InventoryError::InsufficientSeats {
                flight_id,
                cabin_class,
                requested: count,
                available,
            }),
            None => Err(InventoryError::FlightNotFound(flight_id)),
        }
    }

    /// Locks the row and applies the in-memory release, so clamping at the
    /// cabin total behaves exactly as it does for [`Flight::release`].
    async fn release(&self, flight_id: Uuid, cabin_class: CabinClass, count: u32) -> Result<u32, InventoryError> {
        let storage = |e: sqlx::Error| InventoryError::Storage(e.into());
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let sql = format!("SELECT {} FROM flights WHERE id = $1 FOR UPDATE", FLIGHT_COLUMNS);
        let row: Option<FlightRow> = sqlx::query_as(&sql)
            .bind(flight_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
        let mut flight = row
            .ok_or(InventoryError::FlightNotFound(flight_id))
            .and_then(|r| Flight::try_from(r).map_err(InventoryError::Storage))?;

        let released = flight.release(cabin_class, count, self.clock.now());

        sqlx::query(
            "UPDATE flights SET available_economy = $2, available_business = $3, available_first = $4, \
             available_seats = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(flight_id)
        .bind(flight.available.economy as i32)
        .bind(flight.available.business as i32)
        .bind(flight.available.first as i32)
        .bind(flight.available_seats as i32)
        .bind(flight.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(released)
    }
}
