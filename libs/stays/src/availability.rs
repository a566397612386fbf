//! Availability ledger.
//!
//! Host-imposed open/blocked ranges, kept apart from booking occupancy. Rows
//! are unique per (property, start, end); two rows with different bounds may
//! still overlap.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

use crate::base::{BlockId, PropertyId, UserId};
use crate::cohost::CoHostAuthority;
use crate::error::{RentalError, RentalResult};
use crate::events::DomainEvent;
use crate::models::{AvailabilityBlock, Capability, NewBlock, Property};
use crate::range::StayRange;
use crate::store::Store;

#[derive(Clone)]
pub struct AvailabilityLedger {
    store: Arc<dyn Store>,
    cohosts: CoHostAuthority,
}

impl AvailabilityLedger {
    pub fn new(store: Arc<dyn Store>, cohosts: CoHostAuthority) -> Self {
        Self { store, cohosts }
    }

    async fn property(&self, id: PropertyId) -> RentalResult<Property> {
        self.store
            .property(id)
            .await?
            .ok_or(RentalError::NotFound("property"))
    }

    /// Records a host range. Fails with [`RentalError::RangeConflict`] if the
    /// exact same range is already stored for the property.
    pub async fn add_block(
        &self,
        actor: UserId,
        property: PropertyId,
        payload: NewBlock,
    ) -> RentalResult<AvailabilityBlock> {
        let property = self.property(property).await?;
        self.cohosts
            .require(actor, &property, Capability::ManageCalendar, "manage this calendar")
            .await?;
        let range = StayRange::new(payload.start_date, payload.end_date)?;

        let block = AvailabilityBlock {
            id: BlockId::new(),
            property_id: property.id,
            start_date: range.start(),
            end_date: range.end(),
            is_available: payload.is_available,
            created_at: Utc::now(),
        };
        self.store
            .insert_block(&block, DomainEvent::block_added(&block))
            .await?;

        info!(
            "Added {} range {} to {} on property {}",
            if block.is_available { "open" } else { "blocked" },
            block.start_date,
            block.end_date,
            property.id
        );
        Ok(block)
    }

    /// True if a blocked row overlaps `[start, end)`.
    pub async fn is_range_blocked(
        &self,
        property: PropertyId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RentalResult<bool> {
        let range = StayRange::new(start, end)?;
        let property = self.property(property).await?;
        self.store.is_blocked(property.id, range).await
    }

    pub async fn list_blocks(&self, property: PropertyId) -> RentalResult<Vec<AvailabilityBlock>> {
        let property = self.property(property).await?;
        self.store.blocks_for_property(property.id).await
    }

    pub async fn remove_block(&self, actor: UserId, id: BlockId) -> RentalResult<()> {
        let block = self
            .store
            .block(id)
            .await?
            .ok_or(RentalError::NotFound("availability entry"))?;
        let property = self.property(block.property_id).await?;
        self.cohosts
            .require(actor, &property, Capability::ManageCalendar, "manage this calendar")
            .await?;

        let event = DomainEvent::BlockRemoved {
            block_id: block.id,
            property_id: property.id,
        };
        if !self.store.delete_block(block.id, event).await? {
            return Err(RentalError::NotFound("availability entry"));
        }

        info!("Removed availability entry {} from property {}", id, property.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCoHost;
    use crate::store::MemoryStore;
    use crate::testing::{day, listing};

    async fn setup() -> (AvailabilityLedger, CoHostAuthority, Property) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let property = listing(UserId::new(), 100, 4);
        store.insert_property(&property).await.unwrap();
        let cohosts = CoHostAuthority::new(store.clone());
        (
            AvailabilityLedger::new(store, cohosts.clone()),
            cohosts,
            property,
        )
    }

    fn blocked(start: NaiveDate, end: NaiveDate) -> NewBlock {
        NewBlock {
            start_date: start,
            end_date: end,
            is_available: false,
        }
    }

    #[tokio::test]
    async fn blocked_range_uses_half_open_overlap() {
        let (ledger, _, property) = setup().await;
        ledger
            .add_block(
                property.host_id,
                property.id,
                blocked(day(2024, 7, 10), day(2024, 7, 15)),
            )
            .await
            .unwrap();

        let check = |start, end| ledger.is_range_blocked(property.id, start, end);
        assert!(check(day(2024, 7, 12), day(2024, 7, 20)).await.unwrap());
        assert!(check(day(2024, 7, 1), day(2024, 7, 11)).await.unwrap());
        // Adjacent on either side does not overlap.
        assert!(!check(day(2024, 7, 15), day(2024, 7, 18)).await.unwrap());
        assert!(!check(day(2024, 7, 5), day(2024, 7, 10)).await.unwrap());
    }

    #[tokio::test]
    async fn open_rows_never_block() {
        let (ledger, _, property) = setup().await;
        ledger
            .add_block(
                property.host_id,
                property.id,
                NewBlock {
                    start_date: day(2024, 7, 10),
                    end_date: day(2024, 7, 15),
                    is_available: true,
                },
            )
            .await
            .unwrap();

        assert!(
            !ledger
                .is_range_blocked(property.id, day(2024, 7, 11), day(2024, 7, 12))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn identical_range_is_rejected_but_overlap_is_not() {
        let (ledger, _, property) = setup().await;
        let host = property.host_id;
        ledger
            .add_block(host, property.id, blocked(day(2024, 7, 1), day(2024, 7, 5)))
            .await
            .unwrap();

        let err = ledger
            .add_block(host, property.id, blocked(day(2024, 7, 1), day(2024, 7, 5)))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::RangeConflict));

        ledger
            .add_block(host, property.id, blocked(day(2024, 7, 3), day(2024, 7, 8)))
            .await
            .unwrap();
        assert_eq!(ledger.list_blocks(property.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reversed_range_is_invalid() {
        let (ledger, _, property) = setup().await;
        let err = ledger
            .add_block(
                property.host_id,
                property.id,
                blocked(day(2024, 7, 5), day(2024, 7, 5)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::InvalidRange));
    }

    #[tokio::test]
    async fn calendar_writes_need_manage_calendar() {
        let (ledger, cohosts, property) = setup().await;
        let helper = UserId::new();
        cohosts
            .create_cohost(
                property.host_id,
                property.id,
                NewCoHost {
                    user_id: helper,
                    can_manage_messages: true,
                    ..NewCoHost::default()
                },
            )
            .await
            .unwrap();

        let err = ledger
            .add_block(helper, property.id, blocked(day(2024, 8, 1), day(2024, 8, 3)))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));

        let block = ledger
            .add_block(
                property.host_id,
                property.id,
                blocked(day(2024, 8, 1), day(2024, 8, 3)),
            )
            .await
            .unwrap();

        let err = ledger.remove_block(helper, block.id).await.unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));

        ledger.remove_block(property.host_id, block.id).await.unwrap();
        assert!(ledger.list_blocks(property.id).await.unwrap().is_empty());
    }
}
