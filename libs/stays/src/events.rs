//! Domain events and the outbox relay.
//!
//! Every committed write appends a [`DomainEvent`] to the store's outbox in
//! the same atomic step as the write itself. The [`OutboxRelay`] later drains
//! undelivered events and hands them to [`EventHandler`]s. Handlers run after
//! the fact: their failures are logged and discarded, and can never roll back
//! the write that produced the event.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::base::{
    BlockId, BookingId, CoHostId, ContractId, PropertyId, RecipientId, RegulationId, ReminderId,
    ReviewId, UserId,
};
use crate::error::RentalError;
use crate::models::{
    AvailabilityBlock, Booking, CoHost, Contract, RegulationRecipient, RegulationStatus, Review,
};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BookingCreated {
        booking_id: BookingId,
        property_id: PropertyId,
        guest_id: UserId,
        check_in_date: NaiveDate,
        check_out_date: NaiveDate,
        total_price: Decimal,
    },
    BookingConfirmed {
        booking_id: BookingId,
        property_id: PropertyId,
    },
    BookingCancelled {
        booking_id: BookingId,
        property_id: PropertyId,
        cancelled_by: UserId,
    },
    PaymentSessionStarted {
        booking_id: BookingId,
        session: String,
    },
    ReviewCreated {
        review_id: ReviewId,
        booking_id: BookingId,
        property_id: PropertyId,
        rating: i16,
    },
    CoHostAdded {
        cohost_id: CoHostId,
        property_id: PropertyId,
        user_id: UserId,
    },
    CoHostUpdated {
        cohost_id: CoHostId,
        property_id: PropertyId,
    },
    CoHostRemoved {
        cohost_id: CoHostId,
        property_id: PropertyId,
        user_id: UserId,
    },
    BlockAdded {
        block_id: BlockId,
        property_id: PropertyId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        is_available: bool,
    },
    BlockRemoved {
        block_id: BlockId,
        property_id: PropertyId,
    },
    ContractCreated {
        contract_id: ContractId,
        created_by: UserId,
        customer_number: String,
    },
    ContractSent {
        contract_id: ContractId,
        expiration_date: Option<DateTime<Utc>>,
    },
    ContractReminded {
        contract_id: ContractId,
        reminder_id: ReminderId,
    },
    ContractSigned {
        contract_id: ContractId,
        signer_name: String,
    },
    RegulationCreated {
        regulation_id: RegulationId,
        property_id: Option<PropertyId>,
        status: RegulationStatus,
    },
    RegulationUpdated {
        regulation_id: RegulationId,
        status: RegulationStatus,
    },
    RegulationSent {
        regulation_id: RegulationId,
        user_ids: Vec<UserId>,
    },
    RegulationViewed {
        recipient_id: RecipientId,
        regulation_id: RegulationId,
        user_id: UserId,
    },
    RegulationAcknowledged {
        recipient_id: RecipientId,
        regulation_id: RegulationId,
        user_id: UserId,
    },
}

impl DomainEvent {
    pub fn booking_created(booking: &Booking) -> Self {
        DomainEvent::BookingCreated {
            booking_id: booking.id,
            property_id: booking.property_id,
            guest_id: booking.guest_id,
            check_in_date: booking.check_in_date,
            check_out_date: booking.check_out_date,
            total_price: booking.total_price,
        }
    }

    pub fn review_created(review: &Review) -> Self {
        DomainEvent::ReviewCreated {
            review_id: review.id,
            booking_id: review.booking_id,
            property_id: review.property_id,
            rating: review.rating,
        }
    }

    pub fn cohost_added(cohost: &CoHost) -> Self {
        DomainEvent::CoHostAdded {
            cohost_id: cohost.id,
            property_id: cohost.property_id,
            user_id: cohost.user_id,
        }
    }

    pub fn cohost_removed(cohost: &CoHost) -> Self {
        DomainEvent::CoHostRemoved {
            cohost_id: cohost.id,
            property_id: cohost.property_id,
            user_id: cohost.user_id,
        }
    }

    pub fn block_added(block: &AvailabilityBlock) -> Self {
        DomainEvent::BlockAdded {
            block_id: block.id,
            property_id: block.property_id,
            start_date: block.start_date,
            end_date: block.end_date,
            is_available: block.is_available,
        }
    }

    pub fn contract_created(contract: &Contract) -> Self {
        DomainEvent::ContractCreated {
            contract_id: contract.id,
            created_by: contract.created_by,
            customer_number: contract.customer_number.clone(),
        }
    }

    pub fn regulation_viewed(recipient: &RegulationRecipient) -> Self {
        DomainEvent::RegulationViewed {
            recipient_id: recipient.id,
            regulation_id: recipient.regulation_id,
            user_id: recipient.user_id,
        }
    }

    pub fn regulation_acknowledged(recipient: &RegulationRecipient) -> Self {
        DomainEvent::RegulationAcknowledged {
            recipient_id: recipient.id,
            regulation_id: recipient.regulation_id,
            user_id: recipient.user_id,
        }
    }

    /// Short event name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated { .. } => "booking_created",
            DomainEvent::BookingConfirmed { .. } => "booking_confirmed",
            DomainEvent::BookingCancelled { .. } => "booking_cancelled",
            DomainEvent::PaymentSessionStarted { .. } => "payment_session_started",
            DomainEvent::ReviewCreated { .. } => "review_created",
            DomainEvent::CoHostAdded { .. } => "co_host_added",
            DomainEvent::CoHostUpdated { .. } => "co_host_updated",
            DomainEvent::CoHostRemoved { .. } => "co_host_removed",
            DomainEvent::BlockAdded { .. } => "block_added",
            DomainEvent::BlockRemoved { .. } => "block_removed",
            DomainEvent::ContractCreated { .. } => "contract_created",
            DomainEvent::ContractSent { .. } => "contract_sent",
            DomainEvent::ContractReminded { .. } => "contract_reminded",
            DomainEvent::ContractSigned { .. } => "contract_signed",
            DomainEvent::RegulationCreated { .. } => "regulation_created",
            DomainEvent::RegulationUpdated { .. } => "regulation_updated",
            DomainEvent::RegulationSent { .. } => "regulation_sent",
            DomainEvent::RegulationViewed { .. } => "regulation_viewed",
            DomainEvent::RegulationAcknowledged { .. } => "regulation_acknowledged",
        }
    }
}

/// An event as stored in the outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Monotonic insertion sequence
    pub seq: i64,
    pub event: DomainEvent,
    pub created_at: DateTime<Utc>,
}

/// Consumer of committed domain events
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, record: &OutboxRecord) -> anyhow::Result<()>;
}

/// Writes every event to the audit log target.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    async fn handle(&self, record: &OutboxRecord) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&record.event)?;
        info!(target: "stays::audit", seq = record.seq, event = record.event.name(), %payload);
        Ok(())
    }
}

/// Drains the outbox into the registered handlers
#[derive(Clone)]
pub struct OutboxRelay {
    store: Arc<dyn Store>,
    handlers: Vec<Arc<dyn EventHandler>>,
    batch_size: usize,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn Store>, batch_size: usize) -> Self {
        Self {
            store,
            handlers: Vec::new(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Delivers one batch of undelivered events in insertion order.
    ///
    /// Returns the number of events marked delivered. Handler errors are
    /// swallowed; only storage errors surface.
    pub async fn relay_once(&self) -> Result<usize, RentalError> {
        let records = self.store.undelivered_events(self.batch_size).await?;
        if records.is_empty() {
            return Ok(0);
        }

        for record in &records {
            for handler in &self.handlers {
                if let Err(e) = handler.handle(record).await {
                    warn!(
                        "Event handler {} failed on {} (seq {}): {}",
                        handler.name(),
                        record.event.name(),
                        record.seq,
                        e
                    );
                }
            }
        }

        let seqs: Vec<i64> = records.iter().map(|r| r.seq).collect();
        self.store.mark_delivered(&seqs).await?;
        debug!("Relayed {} outbox events", seqs.len());

        Ok(seqs.len())
    }
}
