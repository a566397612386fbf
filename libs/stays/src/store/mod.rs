//! Persistence seam.
//!
//! All durable state goes through [`Store`]. Implementations must make every
//! write atomic together with the outbox event passed alongside it, and must
//! serialize [`Store::reserve`] per property so the overlap check and the
//! insert cannot interleave with another reservation on the same property.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::base::{
    BlockId, BookingId, CoHostId, ContractId, PropertyId, RecipientId, RegulationId, UserId,
};
use crate::error::RentalError;
use crate::events::{DomainEvent, OutboxRecord};
use crate::models::{
    AvailabilityBlock, Booking, BookingStatus, CoHost, CoHostUpdate, Contract, ContractReminder,
    ContractStatus, Property, PropertyUpdate, Regulation, RegulationFilter, RegulationRecipient,
    Review,
};
use crate::range::StayRange;

/// What a reservation is decided on, read under the property's lock
#[derive(Debug, Clone)]
pub struct ReservationSnapshot {
    pub property: Property,
    /// Live bookings overlapping the requested dates
    pub overlapping: Vec<Booking>,
    /// Whether a host block overlaps the requested dates
    pub blocked: bool,
}

/// Decides the booking to insert from a snapshot, or refuses
pub type Planner<'a> = dyn Fn(&ReservationSnapshot) -> Result<Booking, RentalError> + Send + Sync + 'a;

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<bool, RentalError>;

    // Property catalog

    async fn insert_property(&self, property: &Property) -> Result<(), RentalError>;

    async fn property(&self, id: PropertyId) -> Result<Option<Property>, RentalError>;

    async fn properties(&self) -> Result<Vec<Property>, RentalError>;

    async fn properties_by_host(&self, host: UserId) -> Result<Vec<Property>, RentalError>;

    async fn update_property(
        &self,
        id: PropertyId,
        changes: &PropertyUpdate,
    ) -> Result<Option<Property>, RentalError>;

    // Availability ledger

    /// Fails with [`RentalError::RangeConflict`] when a row with the same
    /// (property, start, end) already exists.
    async fn insert_block(
        &self,
        block: &AvailabilityBlock,
        event: DomainEvent,
    ) -> Result<(), RentalError>;

    async fn block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, RentalError>;

    async fn blocks_for_property(
        &self,
        property: PropertyId,
    ) -> Result<Vec<AvailabilityBlock>, RentalError>;

    async fn delete_block(&self, id: BlockId, event: DomainEvent) -> Result<bool, RentalError>;

    async fn is_blocked(&self, property: PropertyId, range: StayRange) -> Result<bool, RentalError>;

    // Bookings

    /// Atomically snapshots the property's live bookings and host blocks over
    /// `[check_in, check_out)`, lets `plan` decide, and inserts the result in
    /// `pending` together with its `BookingCreated` event.
    ///
    /// Fails with [`RentalError::NotFound`] before planning if the property
    /// does not exist.
    async fn reserve(
        &self,
        property: PropertyId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        plan: &Planner<'_>,
    ) -> Result<Booking, RentalError>;

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>, RentalError>;

    async fn booking_by_session(&self, session: &str) -> Result<Option<Booking>, RentalError>;

    async fn bookings_for_guest(&self, guest: UserId) -> Result<Vec<Booking>, RentalError>;

    async fn bookings_for_property(&self, property: PropertyId)
    -> Result<Vec<Booking>, RentalError>;

    async fn bookings_for_host(&self, host: UserId) -> Result<Vec<Booking>, RentalError>;

    /// Pending bookings that already carry a payment session.
    async fn bookings_awaiting_payment(&self) -> Result<Vec<Booking>, RentalError>;

    /// Stores the session token on a booking that is still `pending`.
    async fn set_payment_session(
        &self,
        id: BookingId,
        session: &str,
        event: DomainEvent,
    ) -> Result<Booking, RentalError>;

    /// Moves a booking to `to` if its current status is one of `from`;
    /// otherwise fails with [`RentalError::InvalidState`].
    async fn transition_booking(
        &self,
        id: BookingId,
        from: &[BookingStatus],
        to: BookingStatus,
        event: DomainEvent,
    ) -> Result<Booking, RentalError>;

    // Reviews

    /// Fails with [`RentalError::Conflict`] if the booking already has one.
    async fn insert_review(&self, review: &Review, event: DomainEvent) -> Result<(), RentalError>;

    async fn review_for_booking(&self, booking: BookingId) -> Result<Option<Review>, RentalError>;

    async fn reviews_for_property(&self, property: PropertyId) -> Result<Vec<Review>, RentalError>;

    async fn reviews_by_guest(&self, guest: UserId) -> Result<Vec<Review>, RentalError>;

    // Co-hosts

    /// Fails with [`RentalError::Duplicate`] if the (property, user) pair exists.
    async fn insert_cohost(&self, cohost: &CoHost, event: DomainEvent) -> Result<(), RentalError>;

    async fn cohost(&self, id: CoHostId) -> Result<Option<CoHost>, RentalError>;

    async fn cohost_for(
        &self,
        property: PropertyId,
        user: UserId,
    ) -> Result<Option<CoHost>, RentalError>;

    async fn cohosts_for_property(&self, property: PropertyId) -> Result<Vec<CoHost>, RentalError>;

    async fn cohosted_properties(&self, user: UserId) -> Result<Vec<Property>, RentalError>;

    async fn update_cohost(
        &self,
        id: CoHostId,
        changes: &CoHostUpdate,
        event: DomainEvent,
    ) -> Result<Option<CoHost>, RentalError>;

    async fn delete_cohost(&self, id: CoHostId, event: DomainEvent) -> Result<bool, RentalError>;

    // Contracts

    /// Fails with [`RentalError::Conflict`] if the customer number is taken.
    async fn insert_contract(&self, contract: &Contract, event: DomainEvent)
    -> Result<(), RentalError>;

    async fn contract(&self, id: ContractId) -> Result<Option<Contract>, RentalError>;

    /// Contracts created by `user`, newest first.
    async fn contracts_by_creator(&self, user: UserId) -> Result<Vec<Contract>, RentalError>;

    /// Overwrites the stored contract with `contract` if its stored status is
    /// still `from`; otherwise fails with [`RentalError::InvalidState`].
    async fn save_contract(
        &self,
        contract: &Contract,
        from: ContractStatus,
        event: DomainEvent,
    ) -> Result<(), RentalError>;

    /// Fails with [`RentalError::InvalidState`] unless the contract is `sent`.
    async fn insert_reminder(
        &self,
        reminder: &ContractReminder,
        event: DomainEvent,
    ) -> Result<(), RentalError>;

    /// Newest first.
    async fn reminders_for_contract(
        &self,
        contract: ContractId,
    ) -> Result<Vec<ContractReminder>, RentalError>;

    // Regulations

    async fn insert_regulation(
        &self,
        regulation: &Regulation,
        event: DomainEvent,
    ) -> Result<(), RentalError>;

    async fn regulation(&self, id: RegulationId) -> Result<Option<Regulation>, RentalError>;

    /// Regulations matching `filter`, newest first.
    async fn regulations(&self, filter: &RegulationFilter)
    -> Result<Vec<Regulation>, RentalError>;

    async fn update_regulation(
        &self,
        regulation: &Regulation,
        event: DomainEvent,
    ) -> Result<(), RentalError>;

    /// Creates a recipient row per user, or refreshes `sent_at` on the row a
    /// user already has, all in one step.
    async fn send_regulation(
        &self,
        regulation: RegulationId,
        users: &[UserId],
        sent_at: DateTime<Utc>,
        event: DomainEvent,
    ) -> Result<Vec<RegulationRecipient>, RentalError>;

    async fn recipient(&self, id: RecipientId) -> Result<Option<RegulationRecipient>, RentalError>;

    async fn recipients_for_regulation(
        &self,
        regulation: RegulationId,
    ) -> Result<Vec<RegulationRecipient>, RentalError>;

    /// Regulations delivered to `user`, most recently sent first.
    async fn recipients_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<RegulationRecipient>, RentalError>;

    /// Stores the view and acknowledgement stamps of an existing row.
    async fn save_recipient(
        &self,
        recipient: &RegulationRecipient,
        event: DomainEvent,
    ) -> Result<(), RentalError>;

    // Outbox

    /// Oldest undelivered events first, at most `limit`.
    async fn undelivered_events(&self, limit: usize) -> Result<Vec<OutboxRecord>, RentalError>;

    async fn mark_delivered(&self, seqs: &[i64]) -> Result<(), RentalError>;
}
