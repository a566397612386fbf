//! In-process store.
//!
//! Bookings and availability rows are kept in per-property vectors inside a
//! [`DashMap`]. Holding the map entry for a property is the lock that
//! serializes reservations on it, the same way the ledger keys accounts by
//! client. Lock order is always bookings → blocks → outbox, never the reverse;
//! contracts are held before their reminders the same way.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::{Planner, ReservationSnapshot, Store};
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
use crate::range::{StayRange, overlaps};

#[derive(Debug, Default)]
struct Outbox {
    last_seq: i64,
    pending: BTreeMap<i64, OutboxRecord>,
}

/// Store kept entirely in memory; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    properties: DashMap<PropertyId, Property>,
    bookings: DashMap<PropertyId, Vec<Booking>>,
    booking_index: DashMap<BookingId, PropertyId>,
    blocks: DashMap<PropertyId, Vec<AvailabilityBlock>>,
    block_index: DashMap<BlockId, PropertyId>,
    reviews: DashMap<BookingId, Review>,
    cohosts: DashMap<CoHostId, CoHost>,
    cohost_pairs: DashMap<(PropertyId, UserId), CoHostId>,
    contracts: DashMap<ContractId, Contract>,
    customer_numbers: DashMap<String, ContractId>,
    reminders: DashMap<ContractId, Vec<ContractReminder>>,
    regulations: DashMap<RegulationId, Regulation>,
    recipients: DashMap<RecipientId, RegulationRecipient>,
    recipient_pairs: DashMap<(RegulationId, UserId), RecipientId>,
    outbox: Mutex<Outbox>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_event(&self, event: DomainEvent) {
        let mut outbox = self.outbox.lock();
        outbox.last_seq += 1;
        let seq = outbox.last_seq;
        outbox.pending.insert(
            seq,
            OutboxRecord {
                seq,
                event,
                created_at: Utc::now(),
            },
        );
    }

    fn property_of_booking(&self, id: BookingId) -> Option<PropertyId> {
        self.booking_index.get(&id).map(|entry| *entry.value())
    }
}

fn sorted_by_check_in(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by_key(|b| (b.check_in_date, b.created_at));
    bookings
}

fn newest_first<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<bool, RentalError> {
        Ok(true)
    }

    async fn insert_property(&self, property: &Property) -> Result<(), RentalError> {
        match self.properties.entry(property.id) {
            Entry::Occupied(_) => Err(RentalError::Conflict(format!(
                "property {} already exists",
                property.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(property.clone());
                Ok(())
            }
        }
    }

    async fn property(&self, id: PropertyId) -> Result<Option<Property>, RentalError> {
        Ok(self.properties.get(&id).map(|p| p.value().clone()))
    }

    async fn properties(&self) -> Result<Vec<Property>, RentalError> {
        let mut all: Vec<Property> = self.properties.iter().map(|p| p.value().clone()).collect();
        all.sort_by_key(|p| p.created_at);
        Ok(all)
    }

    async fn properties_by_host(&self, host: UserId) -> Result<Vec<Property>, RentalError> {
        let mut owned: Vec<Property> = self
            .properties
            .iter()
            .filter(|p| p.host_id == host)
            .map(|p| p.value().clone())
            .collect();
        owned.sort_by_key(|p| p.created_at);
        Ok(owned)
    }

    async fn update_property(
        &self,
        id: PropertyId,
        changes: &PropertyUpdate,
    ) -> Result<Option<Property>, RentalError> {
        Ok(self.properties.get_mut(&id).map(|mut property| {
            changes.apply(&mut property);
            property.clone()
        }))
    }

    async fn insert_block(
        &self,
        block: &AvailabilityBlock,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut ledger = self.blocks.entry(block.property_id).or_default();
        if ledger.iter().any(|existing| existing.key() == block.key()) {
            return Err(RentalError::RangeConflict);
        }
        ledger.push(block.clone());
        self.block_index.insert(block.id, block.property_id);
        self.push_event(event);
        Ok(())
    }

    async fn block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, RentalError> {
        let Some(property) = self.block_index.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self
            .blocks
            .get(&property)
            .and_then(|ledger| ledger.iter().find(|b| b.id == id).cloned()))
    }

    async fn blocks_for_property(
        &self,
        property: PropertyId,
    ) -> Result<Vec<AvailabilityBlock>, RentalError> {
        let mut rows = self
            .blocks
            .get(&property)
            .map(|ledger| ledger.value().clone())
            .unwrap_or_default();
        rows.sort_by_key(|b| (b.start_date, b.end_date));
        Ok(rows)
    }

    async fn delete_block(&self, id: BlockId, event: DomainEvent) -> Result<bool, RentalError> {
        let Some((_, property)) = self.block_index.remove(&id) else {
            return Ok(false);
        };
        let Some(mut ledger) = self.blocks.get_mut(&property) else {
            return Ok(false);
        };
        let before = ledger.len();
        ledger.retain(|b| b.id != id);
        let removed = ledger.len() < before;
        if removed {
            self.push_event(event);
        }
        Ok(removed)
    }

    async fn is_blocked(&self, property: PropertyId, range: StayRange) -> Result<bool, RentalError> {
        Ok(self
            .blocks
            .get(&property)
            .is_some_and(|ledger| ledger.iter().any(|b| b.blocks(&range))))
    }

    async fn reserve(
        &self,
        property: PropertyId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        plan: &Planner<'_>,
    ) -> Result<Booking, RentalError> {
        let property = self
            .properties
            .get(&property)
            .map(|p| p.value().clone())
            .ok_or(RentalError::NotFound("property"))?;

        // Held until the booking is inserted: no other reservation on this
        // property can read the ledger in between.
        let mut ledger = self.bookings.entry(property.id).or_default();

        let overlapping = ledger
            .iter()
            .filter(|b| {
                b.status.occupies_dates()
                    && overlaps(b.check_in_date, b.check_out_date, check_in, check_out)
            })
            .cloned()
            .collect();
        let blocked = self.blocks.get(&property.id).is_some_and(|rows| {
            rows.iter().any(|b| {
                !b.is_available && overlaps(b.start_date, b.end_date, check_in, check_out)
            })
        });

        let snapshot = ReservationSnapshot {
            property,
            overlapping,
            blocked,
        };
        let booking = plan(&snapshot)?;

        ledger.push(booking.clone());
        self.booking_index.insert(booking.id, booking.property_id);
        self.push_event(DomainEvent::booking_created(&booking));

        Ok(booking)
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>, RentalError> {
        let Some(property) = self.property_of_booking(id) else {
            return Ok(None);
        };
        Ok(self
            .bookings
            .get(&property)
            .and_then(|ledger| ledger.iter().find(|b| b.id == id).cloned()))
    }

    async fn booking_by_session(&self, session: &str) -> Result<Option<Booking>, RentalError> {
        Ok(self.bookings.iter().find_map(|ledger| {
            ledger
                .iter()
                .find(|b| b.payment_session.as_deref() == Some(session))
                .cloned()
        }))
    }

    async fn bookings_for_guest(&self, guest: UserId) -> Result<Vec<Booking>, RentalError> {
        let found = self
            .bookings
            .iter()
            .flat_map(|ledger| {
                ledger
                    .iter()
                    .filter(|b| b.guest_id == guest)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(sorted_by_check_in(found))
    }

    async fn bookings_for_property(
        &self,
        property: PropertyId,
    ) -> Result<Vec<Booking>, RentalError> {
        let found = self
            .bookings
            .get(&property)
            .map(|ledger| ledger.value().clone())
            .unwrap_or_default();
        Ok(sorted_by_check_in(found))
    }

    async fn bookings_for_host(&self, host: UserId) -> Result<Vec<Booking>, RentalError> {
        let owned: Vec<PropertyId> = self
            .properties
            .iter()
            .filter(|p| p.host_id == host)
            .map(|p| p.id)
            .collect();

        let mut found = Vec::new();
        for property in owned {
            if let Some(ledger) = self.bookings.get(&property) {
                found.extend(ledger.iter().cloned());
            }
        }
        Ok(sorted_by_check_in(found))
    }

    async fn bookings_awaiting_payment(&self) -> Result<Vec<Booking>, RentalError> {
        let found = self
            .bookings
            .iter()
            .flat_map(|ledger| {
                ledger
                    .iter()
                    .filter(|b| b.status == BookingStatus::Pending && b.payment_session.is_some())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(sorted_by_check_in(found))
    }

    async fn set_payment_session(
        &self,
        id: BookingId,
        session: &str,
        event: DomainEvent,
    ) -> Result<Booking, RentalError> {
        let property = self
            .property_of_booking(id)
            .ok_or(RentalError::NotFound("booking"))?;
        let mut ledger = self
            .bookings
            .get_mut(&property)
            .ok_or(RentalError::NotFound("booking"))?;
        let booking = ledger
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(RentalError::NotFound("booking"))?;

        if booking.status != BookingStatus::Pending {
            return Err(RentalError::InvalidState(format!(
                "only pending bookings can be paid (booking is {})",
                booking.status
            )));
        }

        booking.payment_session = Some(session.to_string());
        booking.updated_at = Utc::now();
        let updated = booking.clone();
        self.push_event(event);
        Ok(updated)
    }

    async fn transition_booking(
        &self,
        id: BookingId,
        from: &[BookingStatus],
        to: BookingStatus,
        event: DomainEvent,
    ) -> Result<Booking, RentalError> {
        let property = self
            .property_of_booking(id)
            .ok_or(RentalError::NotFound("booking"))?;
        let mut ledger = self
            .bookings
            .get_mut(&property)
            .ok_or(RentalError::NotFound("booking"))?;
        let booking = ledger
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(RentalError::NotFound("booking"))?;

        if !from.contains(&booking.status) {
            return Err(RentalError::InvalidState(format!(
                "booking is {} and cannot become {}",
                booking.status, to
            )));
        }

        booking.status = to;
        booking.updated_at = Utc::now();
        let updated = booking.clone();
        self.push_event(event);
        Ok(updated)
    }

    async fn insert_review(&self, review: &Review, event: DomainEvent) -> Result<(), RentalError> {
        match self.reviews.entry(review.booking_id) {
            Entry::Occupied(_) => Err(RentalError::Conflict(
                "you have already reviewed this booking".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(review.clone());
                self.push_event(event);
                Ok(())
            }
        }
    }

    async fn review_for_booking(&self, booking: BookingId) -> Result<Option<Review>, RentalError> {
        Ok(self.reviews.get(&booking).map(|r| r.value().clone()))
    }

    async fn reviews_for_property(&self, property: PropertyId) -> Result<Vec<Review>, RentalError> {
        let found = self
            .reviews
            .iter()
            .filter(|r| r.property_id == property)
            .map(|r| r.value().clone())
            .collect();
        Ok(newest_first(found, |r: &Review| r.created_at))
    }

    async fn reviews_by_guest(&self, guest: UserId) -> Result<Vec<Review>, RentalError> {
        let found = self
            .reviews
            .iter()
            .filter(|r| r.guest_id == guest)
            .map(|r| r.value().clone())
            .collect();
        Ok(newest_first(found, |r: &Review| r.created_at))
    }

    async fn insert_cohost(&self, cohost: &CoHost, event: DomainEvent) -> Result<(), RentalError> {
        match self.cohost_pairs.entry((cohost.property_id, cohost.user_id)) {
            Entry::Occupied(_) => Err(RentalError::Duplicate),
            Entry::Vacant(slot) => {
                self.cohosts.insert(cohost.id, cohost.clone());
                slot.insert(cohost.id);
                self.push_event(event);
                Ok(())
            }
        }
    }

    async fn cohost(&self, id: CoHostId) -> Result<Option<CoHost>, RentalError> {
        Ok(self.cohosts.get(&id).map(|c| c.value().clone()))
    }

    async fn cohost_for(
        &self,
        property: PropertyId,
        user: UserId,
    ) -> Result<Option<CoHost>, RentalError> {
        let Some(id) = self.cohost_pairs.get(&(property, user)).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.cohosts.get(&id).map(|c| c.value().clone()))
    }

    async fn cohosts_for_property(&self, property: PropertyId) -> Result<Vec<CoHost>, RentalError> {
        let found = self
            .cohosts
            .iter()
            .filter(|c| c.property_id == property)
            .map(|c| c.value().clone())
            .collect();
        Ok(newest_first(found, |c: &CoHost| c.created_at))
    }

    async fn cohosted_properties(&self, user: UserId) -> Result<Vec<Property>, RentalError> {
        let ids: Vec<PropertyId> = self
            .cohosts
            .iter()
            .filter(|c| c.user_id == user)
            .map(|c| c.property_id)
            .collect();

        let mut found: Vec<Property> = ids
            .into_iter()
            .filter_map(|id| self.properties.get(&id).map(|p| p.value().clone()))
            .collect();
        found.sort_by_key(|p| p.created_at);
        found.dedup_by_key(|p| p.id);
        Ok(found)
    }

    async fn update_cohost(
        &self,
        id: CoHostId,
        changes: &CoHostUpdate,
        event: DomainEvent,
    ) -> Result<Option<CoHost>, RentalError> {
        let Some(mut cohost) = self.cohosts.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply(&mut cohost);
        let updated = cohost.clone();
        self.push_event(event);
        Ok(Some(updated))
    }

    async fn delete_cohost(&self, id: CoHostId, event: DomainEvent) -> Result<bool, RentalError> {
        let Some((_, cohost)) = self.cohosts.remove(&id) else {
            return Ok(false);
        };
        self.cohost_pairs.remove(&(cohost.property_id, cohost.user_id));
        self.push_event(event);
        Ok(true)
    }

    async fn insert_contract(
        &self,
        contract: &Contract,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        match self.customer_numbers.entry(contract.customer_number.clone()) {
            Entry::Occupied(_) => Err(RentalError::Conflict(
                "a contract with this customer number already exists".to_string(),
            )),
            Entry::Vacant(slot) => {
                self.contracts.insert(contract.id, contract.clone());
                slot.insert(contract.id);
                self.push_event(event);
                Ok(())
            }
        }
    }

    async fn contract(&self, id: ContractId) -> Result<Option<Contract>, RentalError> {
        Ok(self.contracts.get(&id).map(|c| c.value().clone()))
    }

    async fn contracts_by_creator(&self, user: UserId) -> Result<Vec<Contract>, RentalError> {
        let found = self
            .contracts
            .iter()
            .filter(|c| c.created_by == user)
            .map(|c| c.value().clone())
            .collect();
        Ok(newest_first(found, |c: &Contract| c.created_at))
    }

    async fn save_contract(
        &self,
        contract: &Contract,
        from: ContractStatus,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut stored = self
            .contracts
            .get_mut(&contract.id)
            .ok_or(RentalError::NotFound("contract"))?;
        if stored.status != from {
            return Err(RentalError::InvalidState(format!(
                "contract is {} and cannot become {}",
                stored.status, contract.status
            )));
        }
        *stored = contract.clone();
        self.push_event(event);
        Ok(())
    }

    async fn insert_reminder(
        &self,
        reminder: &ContractReminder,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        // Held so the contract cannot leave `sent` while the reminder lands.
        let contract = self
            .contracts
            .get(&reminder.contract_id)
            .ok_or(RentalError::NotFound("contract"))?;
        if contract.status != ContractStatus::Sent {
            return Err(RentalError::InvalidState(
                "reminders can only be sent for contracts awaiting signature".to_string(),
            ));
        }
        self.reminders
            .entry(reminder.contract_id)
            .or_default()
            .push(reminder.clone());
        self.push_event(event);
        Ok(())
    }

    async fn reminders_for_contract(
        &self,
        contract: ContractId,
    ) -> Result<Vec<ContractReminder>, RentalError> {
        let found = self
            .reminders
            .get(&contract)
            .map(|rows| rows.value().clone())
            .unwrap_or_default();
        Ok(newest_first(found, |r: &ContractReminder| r.sent_at))
    }

    async fn insert_regulation(
        &self,
        regulation: &Regulation,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        match self.regulations.entry(regulation.id) {
            Entry::Occupied(_) => Err(RentalError::Conflict(format!(
                "regulation {} already exists",
                regulation.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(regulation.clone());
                self.push_event(event);
                Ok(())
            }
        }
    }

    async fn regulation(&self, id: RegulationId) -> Result<Option<Regulation>, RentalError> {
        Ok(self.regulations.get(&id).map(|r| r.value().clone()))
    }

    async fn regulations(
        &self,
        filter: &RegulationFilter,
    ) -> Result<Vec<Regulation>, RentalError> {
        let found = self
            .regulations
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        Ok(newest_first(found, |r: &Regulation| r.created_at))
    }

    async fn update_regulation(
        &self,
        regulation: &Regulation,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut stored = self
            .regulations
            .get_mut(&regulation.id)
            .ok_or(RentalError::NotFound("regulation"))?;
        *stored = regulation.clone();
        self.push_event(event);
        Ok(())
    }

    async fn send_regulation(
        &self,
        regulation: RegulationId,
        users: &[UserId],
        sent_at: DateTime<Utc>,
        event: DomainEvent,
    ) -> Result<Vec<RegulationRecipient>, RentalError> {
        // Held for the whole fan-out so an update cannot interleave.
        let _regulation = self
            .regulations
            .get(&regulation)
            .ok_or(RentalError::NotFound("regulation"))?;

        let mut delivered = Vec::with_capacity(users.len());
        for user in users {
            let recipient = match self.recipient_pairs.entry((regulation, *user)) {
                Entry::Occupied(slot) => {
                    let mut existing = self
                        .recipients
                        .get_mut(slot.get())
                        .ok_or(RentalError::NotFound("regulation recipient"))?;
                    existing.sent_at = sent_at;
                    existing.clone()
                }
                Entry::Vacant(slot) => {
                    let fresh = RegulationRecipient::new(regulation, *user, sent_at);
                    self.recipients.insert(fresh.id, fresh.clone());
                    slot.insert(fresh.id);
                    fresh
                }
            };
            delivered.push(recipient);
        }
        self.push_event(event);
        Ok(delivered)
    }

    async fn recipient(&self, id: RecipientId) -> Result<Option<RegulationRecipient>, RentalError> {
        Ok(self.recipients.get(&id).map(|r| r.value().clone()))
    }

    async fn recipients_for_regulation(
        &self,
        regulation: RegulationId,
    ) -> Result<Vec<RegulationRecipient>, RentalError> {
        let found = self
            .recipients
            .iter()
            .filter(|r| r.regulation_id == regulation)
            .map(|r| r.value().clone())
            .collect();
        Ok(newest_first(found, |r: &RegulationRecipient| r.sent_at))
    }

    async fn recipients_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<RegulationRecipient>, RentalError> {
        let found = self
            .recipients
            .iter()
            .filter(|r| r.user_id == user)
            .map(|r| r.value().clone())
            .collect();
        Ok(newest_first(found, |r: &RegulationRecipient| r.sent_at))
    }

    async fn save_recipient(
        &self,
        recipient: &RegulationRecipient,
        event: DomainEvent,
    ) -> Result<(), RentalError> {
        let mut stored = self
            .recipients
            .get_mut(&recipient.id)
            .ok_or(RentalError::NotFound("regulation recipient"))?;
        stored.viewed_at = recipient.viewed_at;
        stored.acknowledged = recipient.acknowledged;
        stored.acknowledged_at = recipient.acknowledged_at;
        self.push_event(event);
        Ok(())
    }

    async fn undelivered_events(&self, limit: usize) -> Result<Vec<OutboxRecord>, RentalError> {
        let outbox = self.outbox.lock();
        Ok(outbox.pending.values().take(limit).cloned().collect())
    }

    async fn mark_delivered(&self, seqs: &[i64]) -> Result<(), RentalError> {
        let mut outbox = self.outbox.lock();
        for seq in seqs {
            outbox.pending.remove(seq);
        }
        Ok(())
    }
}
