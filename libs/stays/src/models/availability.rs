//! Availability ledger rows

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::base::{BlockId, PropertyId};
use crate::range::{StayRange, overlaps};

/// Host-side open or blocked date range, independent of bookings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    pub id: BlockId,
    pub property_id: PropertyId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// `false` marks the range as blocked
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityBlock {
    /// Whether this row blocks any night of `range`.
    pub fn blocks(&self, range: &StayRange) -> bool {
        !self.is_available && overlaps(self.start_date, self.end_date, range.start(), range.end())
    }

    /// Identity of the row under the ledger's uniqueness rule.
    pub fn key(&self) -> (PropertyId, NaiveDate, NaiveDate) {
        (self.property_id, self.start_date, self.end_date)
    }
}

/// Availability creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBlock {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}
