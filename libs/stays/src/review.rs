//! Review gate.
//!
//! A guest may review a booking once: only their own, only when it is
//! confirmed and only after check-out.

use std::sync::Arc;
use tracing::info;

use crate::base::{PropertyId, ReviewId, UserId};
use crate::clock::Clock;
use crate::error::{RentalError, RentalResult};
use crate::events::DomainEvent;
use crate::models::{BookingStatus, RatingSummary, Review, ReviewRequest};
use crate::store::Store;

#[derive(Clone)]
pub struct ReviewGate {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ReviewGate {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_review(
        &self,
        guest: UserId,
        request: &ReviewRequest,
    ) -> RentalResult<Review> {
        let booking = self
            .store
            .booking(request.booking_id)
            .await?
            .ok_or(RentalError::NotFound("booking"))?;

        if booking.guest_id != guest {
            return Err(RentalError::Forbidden(
                "you can only review your own bookings".to_string(),
            ));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(RentalError::InvalidState(
                "only confirmed bookings can be reviewed".to_string(),
            ));
        }
        if booking.check_out_date > self.clock.today() {
            return Err(RentalError::TooEarly(
                "you can only review after your stay has ended".to_string(),
            ));
        }
        if self.store.review_for_booking(booking.id).await?.is_some() {
            return Err(RentalError::Conflict(
                "you have already reviewed this booking".to_string(),
            ));
        }
        let rating = i16::try_from(request.rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| RentalError::invalid("rating", "rating must be between 1 and 5"))?;

        let review = Review {
            id: ReviewId::new(),
            booking_id: booking.id,
            guest_id: guest,
            property_id: booking.property_id,
            rating,
            comment: request.comment.clone(),
            created_at: self.clock.now(),
        };
        // A concurrent duplicate still fails here on the store's uniqueness rule.
        self.store
            .insert_review(&review, DomainEvent::review_created(&review))
            .await?;

        info!(
            "Guest {} reviewed booking {} with {} stars",
            guest, booking.id, rating
        );
        Ok(review)
    }

    pub async fn property_reviews(&self, property: PropertyId) -> RentalResult<Vec<Review>> {
        if self.store.property(property).await?.is_none() {
            return Err(RentalError::NotFound("property"));
        }
        self.store.reviews_for_property(property).await
    }

    pub async fn guest_reviews(&self, guest: UserId) -> RentalResult<Vec<Review>> {
        self.store.reviews_by_guest(guest).await
    }

    /// Count and mean rating, computed from the stored reviews on each call.
    pub async fn property_rating(&self, property: PropertyId) -> RentalResult<RatingSummary> {
        let reviews = self.property_reviews(property).await?;
        Ok(RatingSummary::from_reviews(property, &reviews))
    }
}
