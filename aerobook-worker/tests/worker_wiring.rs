use aerobook_catalog::{CabinClass, Flight, InventoryManager, SeatCounts};
use aerobook_core::{ManualClock, MockPaymentGateway, NotificationSink};
use aerobook_order::{
    BookingManager, BookingStatus, ContactInfo, CreateBookingRequest, InMemoryBookingRepository,
    InMemoryPassengerRepository, PassengerRequest,
};
use aerobook_shared::Masked;
use aerobook_store::Config;
use aerobook_worker::{build_notifier, build_sweeper};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

const CONFIG: &str = r#"
[database]
url = "postgres://localhost/aerobook"

[worker]
sweep_interval_seconds = 5
batch_size = 2
"#;

#[tokio::test]
async fn test_notifier_falls_back_to_logging_without_kafka() {
    let config = Config::from_toml(CONFIG).unwrap();
    let notifier: Arc<dyn NotificationSink> = build_notifier(&config).unwrap();

    let event = aerobook_shared::BookingEvent::Expired(aerobook_shared::models::events::BookingExpiredEvent {
        booking_id: Uuid::new_v4(),
        reference: "K7Q2ZD".to_string(),
        user_id: Uuid::new_v4(),
        released_seats: 1,
        timestamp: 0,
    });
    assert!(notifier.publish(&event).await.is_ok());
}

#[tokio::test]
async fn test_configured_sweeper_expires_overdue_holds() {
    let config = Config::from_toml(CONFIG).unwrap();
    let now = Utc.with_ymd_and_hms(2026, 11, 2, 9, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(now));

    let departure = now + Duration::days(20);
    let flight = Flight::new(
        "AB303",
        "MAN",
        "DXB",
        departure,
        departure + Duration::hours(7),
        SeatCounts::new(10, 0, 0),
        dec!(150.00),
    )
    .unwrap();
    let flight_id = flight.id;
    let inventory = Arc::new(InventoryManager::new());
    inventory.initialize(flight).await;

    let manager = Arc::new(
        BookingManager::new(
            inventory.clone(),
            inventory.clone(),
            Arc::new(InMemoryBookingRepository::new()),
            Arc::new(InMemoryPassengerRepository::new()),
            build_notifier(&config).unwrap(),
            Arc::new(MockPaymentGateway::new()),
        )
        .with_clock(clock.clone())
        .with_policy(config.booking.clone()),
    );

    let user_id = Uuid::new_v4();
    let mut references = Vec::new();
    for _ in 0..5 {
        let booking = manager
            .create_booking(
                user_id,
                CreateBookingRequest {
                    flight_id,
                    cabin_class: CabinClass::Economy,
                    passengers: vec![PassengerRequest::new("Grace", "Hopper")],
                    contact: ContactInfo {
                        name: "Grace Hopper".to_string(),
                        email: Masked::from("grace@example.com"),
                        phone: None,
                    },
                    special_requests: None,
                    booking_date: None,
                },
            )
            .await
            .unwrap();
        references.push(booking.reference);
    }
    assert_eq!(inventory.get(&flight_id).await.unwrap().available_seats, 5);

    clock.advance(Duration::minutes(16));
    let sweeper = build_sweeper(&config, manager.clone());
    assert_eq!(sweeper.run_once().await.unwrap(), 5);

    for reference in &references {
        let booking = manager.get_booking(reference, user_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Expired);
    }
    assert_eq!(inventory.get(&flight_id).await.unwrap().available_seats, 10);
}
