//! Property model and related functionality

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::base::{BookingId, PropertyId, UserId};
use crate::error::RentalError;

/// Property entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub host_id: UserId,
    pub title: String,
    pub description: String,
    pub address_street: String,
    pub address_city: String,
    pub address_state: String,
    pub address_zip_code: String,
    pub address_country: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub property_type: String,
    pub room_category: String,
    pub price_per_night: Decimal,
    pub max_guests: i32,
    pub num_bedrooms: Option<i32>,
    pub num_beds: Option<i32>,
    pub num_bathrooms: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New property creation payload; the host is the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProperty {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub address_street: String,
    pub address_city: String,
    pub address_state: String,
    pub address_zip_code: String,
    pub address_country: String,
    #[serde(default)]
    pub latitude: Option<Decimal>,
    #[serde(default)]
    pub longitude: Option<Decimal>,
    pub property_type: String,
    pub room_category: String,
    pub price_per_night: Decimal,
    pub max_guests: i32,
    #[serde(default)]
    pub num_bedrooms: Option<i32>,
    #[serde(default)]
    pub num_beds: Option<i32>,
    #[serde(default)]
    pub num_bathrooms: Option<Decimal>,
}

impl NewProperty {
    pub fn validate(&self) -> Result<(), RentalError> {
        require_text("title", &self.title, 255)?;
        require_text("address_street", &self.address_street, 255)?;
        require_text("address_city", &self.address_city, 100)?;
        require_text("address_state", &self.address_state, 100)?;
        require_text("address_zip_code", &self.address_zip_code, 20)?;
        require_text("address_country", &self.address_country, 100)?;
        require_text("property_type", &self.property_type, 50)?;
        require_text("room_category", &self.room_category, 50)?;
        validate_price(self.price_per_night)?;
        validate_capacity(self.max_guests)?;
        validate_coordinates(self.latitude, self.longitude)?;
        validate_counts(self.num_bedrooms, self.num_beds)
    }

    /// Materialises the payload as a property owned by `host`.
    pub fn into_property(self, host: UserId) -> Property {
        let now = Utc::now();
        Property {
            id: PropertyId::new(),
            host_id: host,
            title: self.title,
            description: self.description,
            address_street: self.address_street,
            address_city: self.address_city,
            address_state: self.address_state,
            address_zip_code: self.address_zip_code,
            address_country: self.address_country,
            latitude: self.latitude,
            longitude: self.longitude,
            property_type: self.property_type,
            room_category: self.room_category,
            price_per_night: self.price_per_night,
            max_guests: self.max_guests,
            num_bedrooms: self.num_bedrooms,
            num_beds: self.num_beds,
            num_bathrooms: self.num_bathrooms,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Property update payload
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PropertyUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_type: Option<String>,
    pub room_category: Option<String>,
    pub price_per_night: Option<Decimal>,
    pub max_guests: Option<i32>,
    pub num_bedrooms: Option<i32>,
    pub num_beds: Option<i32>,
    pub num_bathrooms: Option<Decimal>,
}

impl PropertyUpdate {
    pub fn validate(&self) -> Result<(), RentalError> {
        if let Some(title) = &self.title {
            require_text("title", title, 255)?;
        }
        if let Some(property_type) = &self.property_type {
            require_text("property_type", property_type, 50)?;
        }
        if let Some(room_category) = &self.room_category {
            require_text("room_category", room_category, 50)?;
        }
        if let Some(price) = self.price_per_night {
            validate_price(price)?;
        }
        if let Some(max_guests) = self.max_guests {
            validate_capacity(max_guests)?;
        }
        validate_counts(self.num_bedrooms, self.num_beds)
    }

    /// Applies the present fields onto `property`.
    pub fn apply(&self, property: &mut Property) {
        if let Some(title) = &self.title {
            property.title = title.clone();
        }
        if let Some(description) = &self.description {
            property.description = description.clone();
        }
        if let Some(property_type) = &self.property_type {
            property.property_type = property_type.clone();
        }
        if let Some(room_category) = &self.room_category {
            property.room_category = room_category.clone();
        }
        if let Some(price) = self.price_per_night {
            property.price_per_night = price;
        }
        if let Some(max_guests) = self.max_guests {
            property.max_guests = max_guests;
        }
        if self.num_bedrooms.is_some() {
            property.num_bedrooms = self.num_bedrooms;
        }
        if self.num_beds.is_some() {
            property.num_beds = self.num_beds;
        }
        if self.num_bathrooms.is_some() {
            property.num_bathrooms = self.num_bathrooms;
        }
        property.updated_at = Utc::now();
    }
}

/// Property as returned to clients, with the stay currently in progress
#[derive(Debug, Clone, Serialize)]
pub struct PropertyView {
    #[serde(flatten)]
    pub property: Property,
    pub current_booking: Option<CurrentBooking>,
}

/// Confirmed booking occupying the property today
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentBooking {
    pub booking_id: BookingId,
    pub guest_id: UserId,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
}

pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), RentalError> {
    if value.trim().is_empty() {
        return Err(RentalError::invalid(field, "this field is required"));
    }
    if value.chars().count() > max_len {
        return Err(RentalError::invalid(
            field,
            format!("must be at most {} characters long", max_len),
        ));
    }
    Ok(())
}

/// Largest amount a `NUMERIC(10, 2)` money column holds.
pub fn max_stored_amount() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

fn validate_price(price: Decimal) -> Result<(), RentalError> {
    if price <= Decimal::ZERO {
        return Err(RentalError::invalid(
            "price_per_night",
            "price per night must be positive",
        ));
    }
    if price > max_stored_amount() {
        return Err(RentalError::invalid(
            "price_per_night",
            format!("price per night must not exceed {}", max_stored_amount()),
        ));
    }
    if price.scale() > 2 {
        return Err(RentalError::invalid(
            "price_per_night",
            "price per night has at most two decimal places",
        ));
    }
    Ok(())
}

fn validate_capacity(max_guests: i32) -> Result<(), RentalError> {
    if max_guests < 1 {
        return Err(RentalError::invalid(
            "max_guests",
            "a property must accept at least one guest",
        ));
    }
    Ok(())
}

fn validate_coordinates(
    latitude: Option<Decimal>,
    longitude: Option<Decimal>,
) -> Result<(), RentalError> {
    if let Some(lat) = latitude {
        if lat < Decimal::from(-90) || lat > Decimal::from(90) {
            return Err(RentalError::invalid("latitude", "latitude must be within [-90, 90]"));
        }
    }
    if let Some(lon) = longitude {
        if lon < Decimal::from(-180) || lon > Decimal::from(180) {
            return Err(RentalError::invalid(
                "longitude",
                "longitude must be within [-180, 180]",
            ));
        }
    }
    Ok(())
}

fn validate_counts(bedrooms: Option<i32>, beds: Option<i32>) -> Result<(), RentalError> {
    if bedrooms.is_some_and(|n| n < 0) {
        return Err(RentalError::invalid("num_bedrooms", "must not be negative"));
    }
    if beds.is_some_and(|n| n < 0) {
        return Err(RentalError::invalid("num_beds", "must not be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cabin() -> NewProperty {
        serde_json::from_value(serde_json::json!({
            "title": "Lake cabin",
            "address_street": "1 Shore Rd",
            "address_city": "Duluth",
            "address_state": "MN",
            "address_zip_code": "55802",
            "address_country": "US",
            "property_type": "cabin",
            "room_category": "entire_place",
            "price_per_night": "100.00",
            "max_guests": 4
        }))
        .unwrap()
    }

    #[test]
    fn accepts_minimal_payload() {
        let payload = cabin();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.description, "");
        assert_eq!(payload.price_per_night, dec!(100.00));
    }

    #[test]
    fn rejects_non_positive_price() {
        let mut payload = cabin();
        payload.price_per_night = dec!(0);
        let err = payload.validate().unwrap_err();
        assert_eq!(err.field(), Some("price_per_night"));
    }

    #[test]
    fn rejects_price_beyond_stored_amount() {
        let mut payload = cabin();
        payload.price_per_night = Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        assert_eq!(payload.validate().unwrap_err().field(), Some("price_per_night"));

        payload.price_per_night = dec!(100000000.00);
        assert_eq!(payload.validate().unwrap_err().field(), Some("price_per_night"));

        payload.price_per_night = dec!(99999999.99);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut payload = cabin();
        payload.max_guests = 0;
        assert_eq!(payload.validate().unwrap_err().field(), Some("max_guests"));
    }

    #[test]
    fn rejects_blank_title() {
        let mut payload = cabin();
        payload.title = "   ".to_string();
        assert_eq!(payload.validate().unwrap_err().field(), Some("title"));
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        let mut payload = cabin();
        payload.latitude = Some(dec!(91));
        assert_eq!(payload.validate().unwrap_err().field(), Some("latitude"));
    }

    #[test]
    fn update_applies_only_present_fields() {
        let mut property = cabin().into_property(UserId::new());
        let update = PropertyUpdate {
            price_per_night: Some(dec!(150)),
            ..Default::default()
        };
        update.apply(&mut property);
        assert_eq!(property.price_per_night, dec!(150));
        assert_eq!(property.title, "Lake cabin");
        assert_eq!(property.max_guests, 4);
    }

    #[test]
    fn update_rejects_unknown_fields() {
        let result: Result<PropertyUpdate, _> =
            serde_json::from_value(serde_json::json!({ "host_id": UserId::new() }));
        assert!(result.is_err());
    }
}
