use aerobook_core::{StoreError, StoreResult};
use aerobook_order::{
    BaggageAllowance, Booking, BookingRepository, BookingStatus, ContactInfo, Passenger, PassengerRepository, Ticket,
    TravelDocument,
};
use aerobook_shared::Masked;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, reference, user_id, status, payment_status, total_amount, paid_amount, \
    refund_amount, payment_reference, contact_name, contact_email, contact_phone, special_requests, \
    cancellation_reason, created_at, updated_at, expires_at, confirmed_at, cancelled_at, version";

const TICKET_COLUMNS: &str = "id, ticket_number, booking_id, flight_id, passenger_id, passenger_name, \
    cabin_class, seat_number, price, base_fare, taxes, fare_type, refundable, changeable, cancellation_fee, \
    checked_baggage_kg, cabin_baggage_kg, status, refund_amount, issued_at, updated_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    user_id: Uuid,
    status: String,
    payment_status: String,
    total_amount: Decimal,
    paid_amount: Decimal,
    refund_amount: Decimal,
    payment_reference: Option<String>,
    contact_name: String,
    contact_email: String,
    contact_phone: Option<String>,
    special_requests: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    ticket_number: String,
    booking_id: Uuid,
    flight_id: Uuid,
    passenger_id: Uuid,
    passenger_name: String,
    cabin_class: String,
    seat_number: Option<String>,
    price: Decimal,
    base_fare: Decimal,
    taxes: Decimal,
    fare_type: String,
    refundable: bool,
    changeable: bool,
    cancellation_fee: Option<Decimal>,
    checked_baggage_kg: i32,
    cabin_baggage_kg: i32,
    status: String,
    refund_amount: Option<Decimal>,
    issued_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    user_id: Option<Uuid>,
    first_name: String,
    last_name: String,
    date_of_birth: Option<NaiveDate>,
    gender: Option<String>,
    nationality: Option<String>,
    document: Option<serde_json::Value>,
    email: Option<String>,
    phone: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            ticket_number: row.ticket_number,
            booking_id: row.booking_id,
            flight_id: row.flight_id,
            passenger_id: row.passenger_id,
            passenger_name: row.passenger_name,
            cabin_class: row.cabin_class.parse()?,
            seat_number: row.seat_number,
            price: row.price,
            base_fare: row.base_fare,
            taxes: row.taxes,
            fare_type: row.fare_type.parse()?,
            refundable: row.refundable,
            changeable: row.changeable,
            cancellation_fee: row.cancellation_fee,
            baggage: BaggageAllowance {
                checked_kg: row.checked_baggage_kg as u32,
                cabin_kg: row.cabin_baggage_kg as u32,
            },
            status: row.status.parse()?,
            refund_amount: row.refund_amount,
            issued_at: row.issued_at,
            updated_at: row.updated_at,
        })
    }
}

fn booking_from_rows(row: BookingRow, tickets: Vec<TicketRow>) -> StoreResult<Booking> {
    Ok(Booking {
        id: row.id,
        reference: row.reference,
        user_id: row.user_id,
        status: row.status.parse()?,
        payment_status: row.payment_status.parse()?,
        total_amount: row.total_amount,
        paid_amount: row.paid_amount,
        refund_amount: row.refund_amount,
        payment_reference: row.payment_reference,
        contact: ContactInfo {
            name: row.contact_name,
            email: Masked::new(row.contact_email),
            phone: row.contact_phone.map(Masked::new),
        },
        special_requests: row.special_requests,
        cancellation_reason: row.cancellation_reason,
        created_at: row.created_at,
        updated_at: row.updated_at,
        expires_at: row.expires_at,
        confirmed_at: row.confirmed_at,
        cancelled_at: row.cancelled_at,
        tickets: tickets.into_iter().map(Ticket::try_from).collect::<StoreResult<_>>()?,
        version: row.version,
    })
}

impl TryFrom<PassengerRow> for Passenger {
    type Error = StoreError;

    fn try_from(row: PassengerRow) -> Result<Self, Self::Error> {
        let document = row
            .document
            .map(serde_json::from_value::<TravelDocument>)
            .transpose()?;
        Ok(Passenger {
            id: row.id,
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            gender: row.gender,
            nationality: row.nationality,
            document,
            email: row.email.map(Masked::new),
            phone: row.phone.map(Masked::new),
            created_at: row.created_at,
        })
    }
}

fn ticket_serial(prefix: &str, ticket_number: &str) -> StoreResult<u64> {
    let serial = ticket_number
        .strip_prefix(prefix)
        .ok_or_else(|| format!("ticket number {} does not start with {}", ticket_number, prefix))?;
    Ok(serial.parse::<u64>()?)
}

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Highest serial already issued under `prefix`, so a restarted process
    /// can continue the ticket sequence instead of reissuing numbers.
    pub async fn last_ticket_serial(&self, prefix: &str) -> StoreResult<Option<u64>> {
        let last: Option<String> = sqlx::query_scalar(
            "SELECT MAX(ticket_number) FROM tickets WHERE ticket_number LIKE $1 || '%'",
        )
        .bind(prefix)
        .fetch_one(&self.pool)
        .await?;

        match last {
            Some(number) => Ok(Some(ticket_serial(prefix, &number)?)),
            None => Ok(None),
        }
    }

    async fn load_tickets(&self, booking_id: Uuid) -> Result<Vec<TicketRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM tickets WHERE booking_id = $1 ORDER BY ticket_number",
            TICKET_COLUMNS
        );
        sqlx::query_as(&sql).bind(booking_id).fetch_all(&self.pool).await
    }

    async fn load_all(&self, rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            let tickets = self.load_tickets(row.id).await?;
            bookings.push(booking_from_rows(row, tickets)?);
        }
        Ok(bookings)
    }

    async fn insert_ticket(tx: &mut Transaction<'_, Postgres>, ticket: &Ticket) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, ticket_number, booking_id, flight_id, passenger_id, passenger_name,
                cabin_class, seat_number, price, base_fare, taxes, fare_type, refundable, changeable,
                cancellation_fee, checked_baggage_kg, cabin_baggage_kg, status, refund_amount, issued_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.ticket_number)
        .bind(ticket.booking_id)
        .bind(ticket.flight_id)
        .bind(ticket.passenger_id)
        .bind(&ticket.passenger_name)
        .bind(ticket.cabin_class.as_str())
        .bind(&ticket.seat_number)
        .bind(ticket.price)
        .bind(ticket.base_fare)
        .bind(ticket.taxes)
        .bind(ticket.fare_type.as_str())
        .bind(ticket.refundable)
        .bind(ticket.changeable)
        .bind(ticket.cancellation_fee)
        .bind(ticket.baggage.checked_kg as i32)
        .bind(ticket.baggage.cabin_kg as i32)
        .bind(ticket.status.as_str())
        .bind(ticket.refund_amount)
        .bind(ticket.issued_at)
        .bind(ticket.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, reference, user_id, status, payment_status, total_amount, paid_amount,
                refund_amount, payment_reference, contact_name, contact_email, contact_phone, special_requests,
                cancellation_reason, created_at, updated_at, expires_at, confirmed_at, cancelled_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.user_id)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.total_amount)
        .bind(booking.paid_amount)
        .bind(booking.refund_amount)
        .bind(&booking.payment_reference)
        .bind(&booking.contact.name)
        .bind(booking.contact.email.expose())
        .bind(booking.contact.phone.as_ref().map(|p| p.expose().clone()))
        .bind(&booking.special_requests)
        .bind(&booking.cancellation_reason)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.expires_at)
        .bind(booking.confirmed_at)
        .bind(booking.cancelled_at)
        .bind(booking.version)
        .execute(&mut *tx)
        .await?;

        for ticket in &booking.tickets {
            Self::insert_ticket(&mut tx, ticket).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_booking(&self, reference: &str) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE reference = $1", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql).bind(reference).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => {
                let tickets = self.load_tickets(row.id).await?;
                Ok(Some(booking_from_rows(row, tickets)?))
            }
            None => Ok(None),
        }
    }

    async fn reference_exists(&self, reference: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM bookings WHERE reference = $1)")
            .bind(reference)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// The status and version guards in the WHERE clause make this a
    /// compare-and-set; the ticket rows are only rewritten once the booking
    /// row has been claimed.
    async fn transition_booking(&self, booking: &Booking, expected: BookingStatus) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE bookings SET status = $3, payment_status = $4, paid_amount = $5, refund_amount = $6,
                payment_reference = $7, cancellation_reason = $8, updated_at = $9, expires_at = $10,
                confirmed_at = $11, cancelled_at = $12, version = version + 1
            WHERE id = $1 AND status = $2 AND version = $13
            "#,
        )
        .bind(booking.id)
        .bind(expected.as_str())
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.paid_amount)
        .bind(booking.refund_amount)
        .bind(&booking.payment_reference)
        .bind(&booking.cancellation_reason)
        .bind(booking.updated_at)
        .bind(booking.expires_at)
        .bind(booking.confirmed_at)
        .bind(booking.cancelled_at)
        .bind(booking.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for ticket in &booking.tickets {
            sqlx::query(
                "UPDATE tickets SET status = $2, seat_number = $3, refund_amount = $4, updated_at = $5 WHERE id = $1",
            )
            .bind(ticket.id)
            .bind(ticket.status.as_str())
            .bind(&ticket.seat_number)
            .bind(ticket.refund_amount)
            .bind(ticket.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn occupied_seats(&self, flight_id: Uuid) -> StoreResult<HashSet<String>> {
        let seats: Vec<String> = sqlx::query_scalar(
            "SELECT seat_number FROM tickets \
             WHERE flight_id = $1 AND seat_number IS NOT NULL AND status NOT IN ('CANCELLED', 'VOIDED', 'REFUNDED')",
        )
        .bind(flight_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats.into_iter().collect())
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = 'PENDING' AND expires_at < $1 \
             ORDER BY expires_at, reference LIMIT $2 OFFSET $3",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(now)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        self.load_all(rows).await
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql).bind(user_id).fetch_all(&self.pool).await?;
        self.load_all(rows).await
    }
}

pub struct PgPassengerRepository {
    pool: PgPool,
}

impl PgPassengerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PASSENGER_COLUMNS: &str =
    "id, user_id, first_name, last_name, date_of_birth, gender, nationality, document, email, phone, created_at";

#[async_trait]
impl PassengerRepository for PgPassengerRepository {
    async fn get_passenger(&self, id: Uuid) -> StoreResult<Option<Passenger>> {
        let sql = format!("SELECT {} FROM passengers WHERE id = $1", PASSENGER_COLUMNS);
        let row: Option<PassengerRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(Passenger::try_from).transpose()
    }

    async fn save_passenger(&self, passenger: &Passenger) -> StoreResult<()> {
        let document = passenger.document.as_ref().map(serde_json::to_value).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO passengers (id, user_id, first_name, last_name, date_of_birth, gender, nationality,
                document, email, phone, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                date_of_birth = EXCLUDED.date_of_birth,
                gender = EXCLUDED.gender,
                nationality = EXCLUDED.nationality,
                document = EXCLUDED.document,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone
            "#,
        )
        .bind(passenger.id)
        .bind(passenger.user_id)
        .bind(&passenger.first_name)
        .bind(&passenger.last_name)
        .bind(passenger.date_of_birth)
        .bind(&passenger.gender)
        .bind(&passenger.nationality)
        .bind(document)
        .bind(passenger.email.as_ref().map(|e| e.expose().clone()))
        .bind(passenger.phone.as_ref().map(|p| p.expose().clone()))
        .bind(passenger.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_user_passengers(&self, user_id: Uuid) -> StoreResult<Vec<Passenger>> {
        let sql = format!(
            "SELECT {} FROM passengers WHERE user_id = $1 ORDER BY last_name, first_name",
            PASSENGER_COLUMNS
        );
        let rows: Vec<PassengerRow> = sqlx::query_as(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(Passenger::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerobook_catalog::CabinClass;
    use aerobook_order::{FareType, TicketStatus};
    use rust_decimal_macros::dec;

    fn ticket_row(status: &str) -> TicketRow {
        let now = Utc::now();
        TicketRow {
            id: Uuid::new_v4(),
            ticket_number: "1760000000001".to_string(),
            booking_id: Uuid::new_v4(),
            flight_id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            passenger_name: "Ada Lovelace".to_string(),
            cabin_class: "PREMIUM_ECONOMY".to_string(),
            seat_number: Some("12C".to_string()),
            price: dec!(230.00),
            base_fare: dec!(200.00),
            taxes: dec!(30.00),
            fare_type: "STANDARD".to_string(),
            refundable: true,
            changeable: true,
            cancellation_fee: Some(dec!(50.00)),
            checked_baggage_kg: 23,
            cabin_baggage_kg: 7,
            status: status.to_string(),
            refund_amount: None,
            issued_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_ticket_row_parses_enums() {
        let ticket = Ticket::try_from(ticket_row("CHECKED_IN")).unwrap();
        assert_eq!(ticket.cabin_class, CabinClass::PremiumEconomy);
        assert_eq!(ticket.fare_type, FareType::Standard);
        assert_eq!(ticket.status, TicketStatus::CheckedIn);
        assert_eq!(ticket.baggage.checked_kg, 23);
    }

    #[test]
    fn test_ticket_row_rejects_unknown_status() {
        assert!(Ticket::try_from(ticket_row("LOST")).is_err());
    }

    #[test]
    fn test_ticket_serial_strips_prefix() {
        assert_eq!(ticket_serial("176", "1760000000042").unwrap(), 42);
        assert!(ticket_serial("176", "0810000000042").is_err());
    }

    #[test]
    fn test_booking_rows_wrap_contact_details() {
        let now = Utc::now();
        let row = BookingRow {
            id: Uuid::new_v4(),
            reference: "K7Q2ZD".to_string(),
            user_id: Uuid::new_v4(),
            status: "CONFIRMED".to_string(),
            payment_status: "PAID".to_string(),
            total_amount: dec!(230.00),
            paid_amount: dec!(230.00),
            refund_amount: Decimal::ZERO,
            payment_reference: Some("mock_pay_1".to_string()),
            contact_name: "Ada Lovelace".to_string(),
            contact_email: "ada@example.com".to_string(),
            contact_phone: None,
            special_requests: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            expires_at: Some(now),
            confirmed_at: Some(now),
            cancelled_at: None,
            version: 3,
        };

        let booking = booking_from_rows(row, vec![ticket_row("CONFIRMED")]).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.contact.email.expose(), "ada@example.com");
        assert_eq!(format!("{:?}", booking.contact.email), "********");
        assert_eq!(booking.tickets.len(), 1);
        assert_eq!(booking.version, 3);
    }
}
