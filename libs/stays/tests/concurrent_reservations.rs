//! Simultaneous reservations racing for the same dates.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use stays::{
    BookingPolicy, BookingRequest, FixedClock, MemoryStore, NewProperty, RentalError,
    SandboxGateway, Stays, Store, UserId,
};
use tokio::sync::Barrier;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

async fn setup() -> (Stays, BookingRequest) {
    let stays = Stays::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SandboxGateway::new("http://localhost/checkout")),
        Arc::new(FixedClock::new(day(1))),
        BookingPolicy::default(),
    );
    let payload: NewProperty = serde_json::from_value(json!({
        "title": "Dune house",
        "address_street": "2 Beach Lane",
        "address_city": "Texel",
        "address_state": "Noord-Holland",
        "address_zip_code": "1791",
        "address_country": "Netherlands",
        "property_type": "house",
        "room_category": "entire_place",
        "price_per_night": "100",
        "max_guests": 4
    }))
    .unwrap();
    let property = stays
        .catalog
        .create_property(UserId::new(), payload)
        .await
        .unwrap();

    let request = BookingRequest {
        property_id: property.property.id,
        check_in_date: day(10),
        check_out_date: day(13),
        num_guests: 2,
    };
    (stays, request)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_of_two_simultaneous_requests_wins() {
    let (stays, request) = setup().await;
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let stays = stays.clone();
            let request = request.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                stays.bookings.create_booking(UserId::new(), &request).await
            })
        })
        .collect();

    let mut won = 0;
    let mut conflicted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(RentalError::DateConflict) => conflicted += 1,
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }
    assert_eq!((won, conflicted), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_racers_leave_a_single_booking() {
    let (stays, request) = setup().await;
    let racers = 32;
    let barrier = Arc::new(Barrier::new(racers));

    let handles: Vec<_> = (0..racers)
        .map(|i| {
            let stays = stays.clone();
            let mut request = request.clone();
            // Every range shares the night of June 12.
            request.check_in_date = day(8 + (i % 5) as u32);
            request.check_out_date = day(13);
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                stays.bookings.create_booking(UserId::new(), &request).await
            })
        })
        .collect();

    let mut won = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            won += 1;
        }
    }
    assert_eq!(won, 1);
    assert_eq!(
        stays
            .store
            .bookings_for_property(request.property_id)
            .await
            .unwrap()
            .len(),
        1
    );
}
