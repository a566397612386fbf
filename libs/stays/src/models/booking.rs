//! Booking model and related functionality

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownVariant;
use crate::base::{BookingId, PropertyId, UserId};
use crate::range::{StayRange, overlaps};

/// Booking lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Created by a guest, waiting for payment
    Pending,
    /// Payment reconciled; also accepted as `paid` on input
    #[serde(alias = "paid")]
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a booking in this state occupies its date range.
    pub fn occupies_dates(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" | "paid" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownVariant {
                kind: "booking status",
                value: other.to_string(),
            }),
        }
    }
}

/// Booking entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub guest_id: UserId,
    pub property_id: PropertyId,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub num_guests: i32,
    /// Frozen at creation; later price changes never touch it
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub payment_session: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Whether this booking shares at least one night with `stay`.
    pub fn overlaps(&self, stay: &StayRange) -> bool {
        overlaps(self.check_in_date, self.check_out_date, stay.start(), stay.end())
    }

    /// Whether the stay covers `day` (check-in inclusive, check-out exclusive).
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.check_in_date <= day && day < self.check_out_date
    }
}

/// Booking creation payload; the guest is the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub property_id: PropertyId,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub num_guests: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
    }

    #[test]
    fn paid_is_an_alias_for_confirmed() {
        assert_eq!(
            "paid".parse::<BookingStatus>().unwrap(),
            BookingStatus::Confirmed
        );
        let status: BookingStatus = serde_json::from_str("\"paid\"").unwrap();
        assert_eq!(status, BookingStatus::Confirmed);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "archived".parse::<BookingStatus>().unwrap_err();
        assert_eq!(err.value, "archived");
    }

    #[test]
    fn only_cancelled_frees_dates() {
        assert!(BookingStatus::Pending.occupies_dates());
        assert!(BookingStatus::Confirmed.occupies_dates());
        assert!(!BookingStatus::Cancelled.occupies_dates());
    }
}
