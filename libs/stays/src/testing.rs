//! Fixtures shared by unit tests.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

use crate::base::UserId;
use crate::models::{NewProperty, Property};

pub(crate) fn new_listing(price_per_night: i64, max_guests: i32) -> NewProperty {
    serde_json::from_value(json!({
        "title": "Harbour loft",
        "description": "Two rooms over the water",
        "address_street": "1 Quay Street",
        "address_city": "Lisbon",
        "address_state": "Lisboa",
        "address_zip_code": "1100-001",
        "address_country": "Portugal",
        "property_type": "apartment",
        "room_category": "entire_place",
        "price_per_night": Decimal::from(price_per_night).to_string(),
        "max_guests": max_guests
    }))
    .unwrap()
}

pub(crate) fn listing(host: UserId, price_per_night: i64, max_guests: i32) -> Property {
    new_listing(price_per_night, max_guests).into_property(host)
}

pub(crate) fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
