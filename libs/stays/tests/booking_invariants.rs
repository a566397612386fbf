//! Property-based checks of the booking engine's invariants.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use stays::{
    BookingPolicy, BookingRequest, BookingStatus, FixedClock, MemoryStore, NewProperty,
    PropertyId, PropertyUpdate, RentalError, SandboxGateway, Stays, UserId,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn stays() -> Stays {
    Stays::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SandboxGateway::new("http://localhost/checkout")),
        Arc::new(FixedClock::new(base_day())),
        BookingPolicy::default(),
    )
}

fn base_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn offset(days: u32) -> NaiveDate {
    base_day() + Days::new(u64::from(days))
}

async fn listed(stays: &Stays, host: UserId, price: &str) -> PropertyId {
    let payload: NewProperty = serde_json::from_value(json!({
        "title": "Garden studio",
        "address_street": "9 Elm Row",
        "address_city": "Edinburgh",
        "address_state": "Scotland",
        "address_zip_code": "EH7 4AA",
        "address_country": "United Kingdom",
        "property_type": "studio",
        "room_category": "entire_place",
        "price_per_night": price,
        "max_guests": 6
    }))
    .unwrap();
    stays
        .catalog
        .create_property(host, payload)
        .await
        .unwrap()
        .property
        .id
}

fn request(property: PropertyId, start: u32, nights: u32) -> BookingRequest {
    BookingRequest {
        property_id: property,
        check_in_date: offset(start),
        check_out_date: offset(start + nights),
        num_guests: 2,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn live_bookings_never_overlap(
        attempts in prop::collection::vec((1u32..90, 1u32..12, any::<bool>()), 1..30)
    ) {
        runtime().block_on(async {
            let stays = stays();
            let host = UserId::new();
            let property = listed(&stays, host, "80").await;

            for (start, nights, cancel) in attempts {
                let guest = UserId::new();
                match stays.bookings.create_booking(guest, &request(property, start, nights)).await {
                    Ok(booking) if cancel => {
                        stays.bookings.cancel_booking(guest, booking.id).await.unwrap();
                    }
                    Ok(_) => {}
                    Err(RentalError::DateConflict) => {}
                    Err(other) => panic!("unexpected rejection: {other}"),
                }
            }

            let live: Vec<_> = stays
                .bookings
                .property_bookings(host, property)
                .await
                .unwrap()
                .into_iter()
                .filter(|b| b.status != BookingStatus::Cancelled)
                .collect();

            for (i, a) in live.iter().enumerate() {
                for b in &live[i + 1..] {
                    assert!(
                        a.check_in_date >= b.check_out_date || b.check_in_date >= a.check_out_date,
                        "{} overlaps {}",
                        a.id,
                        b.id
                    );
                }
            }
        });
    }

    #[test]
    fn non_positive_ranges_are_invalid(start in 1u32..365, back in 0u32..30) {
        runtime().block_on(async {
            let stays = stays();
            let property = listed(&stays, UserId::new(), "80").await;
            let req = BookingRequest {
                property_id: property,
                check_in_date: offset(start + back),
                check_out_date: offset(start),
                num_guests: 1,
            };
            let err = stays.bookings.create_booking(UserId::new(), &req).await.unwrap_err();
            assert!(matches!(err, RentalError::InvalidRange));
        });
    }
}

#[test]
fn total_price_is_exact_and_frozen() {
    runtime().block_on(async {
        let stays = stays();
        let host = UserId::new();
        let property = listed(&stays, host, "123.45").await;

        let mut start = 10;
        let mut created = Vec::new();
        for nights in [1u32, 2, 30] {
            let booking = stays
                .bookings
                .create_booking(UserId::new(), &request(property, start, nights))
                .await
                .unwrap();
            assert_eq!(
                booking.total_price,
                Decimal::new(12345, 2) * Decimal::from(nights)
            );
            created.push((booking.id, booking.total_price));
            start += nights;
        }

        let changes = PropertyUpdate {
            price_per_night: Some(Decimal::new(999, 0)),
            ..PropertyUpdate::default()
        };
        stays
            .catalog
            .update_property(host, property, &changes)
            .await
            .unwrap();

        for (id, price) in created {
            let stored = stays.bookings.booking(host, id).await.unwrap();
            assert_eq!(stored.total_price, price);
        }
    });
}
