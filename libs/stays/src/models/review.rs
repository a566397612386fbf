//! Review model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::base::{BookingId, PropertyId, ReviewId, UserId};

/// Review entity, one per booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub booking_id: BookingId,
    pub guest_id: UserId,
    pub property_id: PropertyId,
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Review creation payload; the author is the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub booking_id: BookingId,
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

/// Aggregate rating, derived at read time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    pub property_id: PropertyId,
    pub count: usize,
    pub average: Option<f64>,
}

impl RatingSummary {
    pub fn from_reviews(property_id: PropertyId, reviews: &[Review]) -> Self {
        let count = reviews.len();
        let average = (count > 0).then(|| {
            let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
            sum as f64 / count as f64
        });

        Self {
            property_id,
            count,
            average,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(property_id: PropertyId, rating: i16) -> Review {
        Review {
            id: ReviewId::new(),
            booking_id: BookingId::new(),
            guest_id: UserId::new(),
            property_id,
            rating,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_summary_has_no_average() {
        let summary = RatingSummary::from_reviews(PropertyId::new(), &[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average, None);
    }

    #[test]
    fn averages_ratings() {
        let property_id = PropertyId::new();
        let reviews = vec![review(property_id, 5), review(property_id, 4), review(property_id, 3)];
        let summary = RatingSummary::from_reviews(property_id, &reviews);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average, Some(4.0));
    }
}
