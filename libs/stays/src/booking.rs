//! Booking engine.
//!
//! A booking request is decided by [`plan_booking`] against a
//! [`ReservationSnapshot`] taken under the property's reservation lock, so
//! the overlap check and the insert are one atomic step. Validation order:
//!
//! 1. the property exists (`NotFound`, checked by the store before planning)
//! 2. check-out is after check-in (`InvalidRange`)
//! 3. the party fits (`InvalidInput` for no guests, `CapacityExceeded`)
//! 4. no live booking overlaps (`DateConflict`)
//! 5. no host block overlaps, when enforced (`DatesBlocked`)
//!
//! The price is computed once here and stored; it is never recomputed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::base::{BookingId, PropertyId, UserId};
use crate::clock::Clock;
use crate::cohost::CoHostAuthority;
use crate::error::{RentalError, RentalResult};
use crate::events::DomainEvent;
use crate::models::{
    Booking, BookingRequest, BookingStatus, Capability, Property, max_stored_amount,
};
use crate::range::StayRange;
use crate::store::{ReservationSnapshot, Store};

/// Tunables for booking creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingPolicy {
    /// Reject requests overlapping a blocked availability row
    pub enforce_host_blocks: bool,
    /// ISO currency code prices are charged in
    pub currency: String,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            enforce_host_blocks: true,
            currency: "usd".to_string(),
        }
    }
}

/// `price_per_night × nights`, exact.
///
/// Fails on `check_out_date` when the total does not fit a stored amount.
pub fn quote(price_per_night: Decimal, stay: &StayRange) -> RentalResult<Decimal> {
    price_per_night
        .checked_mul(Decimal::from(stay.nights()))
        .filter(|total| *total <= max_stored_amount())
        .ok_or_else(|| {
            RentalError::invalid(
                "check_out_date",
                "total price for this stay exceeds the maximum amount",
            )
        })
}

/// Decides whether `request` can become a booking given `snapshot`.
///
/// `now` stamps the new booking.
pub fn plan_booking(
    guest: UserId,
    request: &BookingRequest,
    snapshot: &ReservationSnapshot,
    policy: &BookingPolicy,
    now: DateTime<Utc>,
) -> RentalResult<Booking> {
    let stay = StayRange::new(request.check_in_date, request.check_out_date)?;

    if request.num_guests < 1 {
        return Err(RentalError::invalid(
            "num_guests",
            "at least one guest is required",
        ));
    }
    if request.num_guests > snapshot.property.max_guests {
        return Err(RentalError::CapacityExceeded {
            max_guests: snapshot.property.max_guests,
        });
    }

    if snapshot
        .overlapping
        .iter()
        .any(|b| b.status.occupies_dates() && b.overlaps(&stay))
    {
        return Err(RentalError::DateConflict);
    }
    if policy.enforce_host_blocks && snapshot.blocked {
        return Err(RentalError::DatesBlocked);
    }

    let total_price = quote(snapshot.property.price_per_night, &stay)?;
    Ok(Booking {
        id: BookingId::new(),
        guest_id: guest,
        property_id: snapshot.property.id,
        check_in_date: stay.start(),
        check_out_date: stay.end(),
        num_guests: request.num_guests,
        total_price,
        status: BookingStatus::Pending,
        payment_session: None,
        created_at: now,
        updated_at: now,
    })
}

/// Creates, reads and cancels bookings
#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    cohosts: CoHostAuthority,
    policy: BookingPolicy,
}

impl BookingEngine {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        cohosts: CoHostAuthority,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            cohosts,
            policy,
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    /// Creates a `pending` booking for `guest`.
    pub async fn create_booking(
        &self,
        guest: UserId,
        request: &BookingRequest,
    ) -> RentalResult<Booking> {
        let policy = &self.policy;
        let now = self.clock.now();
        let plan =
            |snapshot: &ReservationSnapshot| plan_booking(guest, request, snapshot, policy, now);

        match self
            .store
            .reserve(
                request.property_id,
                request.check_in_date,
                request.check_out_date,
                &plan,
            )
            .await
        {
            Ok(booking) => {
                info!(
                    "Created booking {} on property {} from {} to {} for {}",
                    booking.id,
                    booking.property_id,
                    booking.check_in_date,
                    booking.check_out_date,
                    booking.total_price
                );
                Ok(booking)
            }
            Err(e @ RentalError::Storage(_)) => {
                error!(
                    "Failed to store booking on property {}: {}",
                    request.property_id, e
                );
                Err(e)
            }
            Err(e) => {
                info!(
                    "Rejected booking on property {} ({}): {}",
                    request.property_id,
                    e.kind(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn property(&self, id: PropertyId) -> RentalResult<Property> {
        self.store
            .property(id)
            .await?
            .ok_or(RentalError::NotFound("property"))
    }

    /// Whether `actor` may see or act on `booking`: its guest, or anyone
    /// holding `manage_bookings` on the property.
    async fn may_manage(&self, actor: UserId, booking: &Booking) -> RentalResult<bool> {
        if booking.guest_id == actor {
            return Ok(true);
        }
        self.cohosts
            .authorize(actor, booking.property_id, Capability::ManageBookings)
            .await
    }

    pub async fn booking(&self, actor: UserId, id: BookingId) -> RentalResult<Booking> {
        let booking = self
            .store
            .booking(id)
            .await?
            .ok_or(RentalError::NotFound("booking"))?;

        if !self.may_manage(actor, &booking).await? {
            return Err(RentalError::Forbidden(
                "you do not have permission to view this booking".to_string(),
            ));
        }
        Ok(booking)
    }

    /// Bookings `actor` made plus bookings on properties `actor` owns.
    pub async fn bookings_for(&self, actor: UserId) -> RentalResult<Vec<Booking>> {
        let mut bookings = self.store.bookings_for_guest(actor).await?;
        for booking in self.store.bookings_for_host(actor).await? {
            if !bookings.iter().any(|b| b.id == booking.id) {
                bookings.push(booking);
            }
        }
        bookings.sort_by_key(|b| (b.check_in_date, b.created_at));
        Ok(bookings)
    }

    pub async fn property_bookings(
        &self,
        actor: UserId,
        property: PropertyId,
    ) -> RentalResult<Vec<Booking>> {
        let property = self.property(property).await?;
        self.cohosts
            .require(
                actor,
                &property,
                Capability::ManageBookings,
                "view bookings for this property",
            )
            .await?;
        self.store.bookings_for_property(property.id).await
    }

    /// Cancels a pending or confirmed booking before its check-in day.
    pub async fn cancel_booking(&self, actor: UserId, id: BookingId) -> RentalResult<Booking> {
        let booking = self
            .store
            .booking(id)
            .await?
            .ok_or(RentalError::NotFound("booking"))?;

        if !self.may_manage(actor, &booking).await? {
            return Err(RentalError::Forbidden(
                "you do not have permission to cancel this booking".to_string(),
            ));
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(RentalError::InvalidState(
                "booking is already cancelled".to_string(),
            ));
        }
        if booking.check_in_date <= self.clock.today() {
            return Err(RentalError::InvalidState(
                "a stay that has already started cannot be cancelled".to_string(),
            ));
        }

        let event = DomainEvent::BookingCancelled {
            booking_id: booking.id,
            property_id: booking.property_id,
            cancelled_by: actor,
        };
        let cancelled = self
            .store
            .transition_booking(
                booking.id,
                &[BookingStatus::Pending, BookingStatus::Confirmed],
                BookingStatus::Cancelled,
                event,
            )
            .await?;

        warn!(
            "Booking {} on property {} cancelled by {}",
            cancelled.id, cancelled.property_id, actor
        );
        Ok(cancelled)
    }
}
