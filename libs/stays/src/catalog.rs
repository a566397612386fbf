//! Property catalog.

use std::sync::Arc;
use tracing::info;

use crate::base::{PropertyId, UserId};
use crate::clock::Clock;
use crate::cohost::CoHostAuthority;
use crate::error::{RentalError, RentalResult};
use crate::models::{
    BookingStatus, Capability, CurrentBooking, NewProperty, Property, PropertyUpdate, PropertyView,
};
use crate::store::Store;

/// Creates, reads and edits listings
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    cohosts: CoHostAuthority,
}

impl Catalog {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, cohosts: CoHostAuthority) -> Self {
        Self {
            store,
            clock,
            cohosts,
        }
    }

    pub async fn create_property(
        &self,
        host: UserId,
        payload: NewProperty,
    ) -> RentalResult<PropertyView> {
        payload.validate()?;
        let property = payload.into_property(host);
        self.store.insert_property(&property).await?;

        info!("Created property {} for host {}", property.id, host);
        Ok(PropertyView {
            property,
            current_booking: None,
        })
    }

    pub async fn property(&self, id: PropertyId) -> RentalResult<PropertyView> {
        let property = self
            .store
            .property(id)
            .await?
            .ok_or(RentalError::NotFound("property"))?;
        self.view(property).await
    }

    pub async fn properties(&self) -> RentalResult<Vec<PropertyView>> {
        let properties = self.store.properties().await?;
        self.views(properties).await
    }

    pub async fn host_properties(&self, host: UserId) -> RentalResult<Vec<PropertyView>> {
        let properties = self.store.properties_by_host(host).await?;
        self.views(properties).await
    }

    /// Edits a listing. Stored bookings keep the price they were created with.
    pub async fn update_property(
        &self,
        actor: UserId,
        id: PropertyId,
        changes: &PropertyUpdate,
    ) -> RentalResult<PropertyView> {
        let property = self
            .store
            .property(id)
            .await?
            .ok_or(RentalError::NotFound("property"))?;
        self.cohosts
            .require(actor, &property, Capability::ManageListing, "edit this listing")
            .await?;
        changes.validate()?;

        let updated = self
            .store
            .update_property(id, changes)
            .await?
            .ok_or(RentalError::NotFound("property"))?;

        info!("Updated property {} by {}", id, actor);
        self.view(updated).await
    }

    async fn views(&self, properties: Vec<Property>) -> RentalResult<Vec<PropertyView>> {
        let mut views = Vec::with_capacity(properties.len());
        for property in properties {
            views.push(self.view(property).await?);
        }
        Ok(views)
    }

    async fn view(&self, property: Property) -> RentalResult<PropertyView> {
        let today = self.clock.today();
        let current_booking = self
            .store
            .bookings_for_property(property.id)
            .await?
            .into_iter()
            .find(|b| b.status == BookingStatus::Confirmed && b.covers(today))
            .map(|b| CurrentBooking {
                booking_id: b.id,
                guest_id: b.guest_id,
                check_in_date: b.check_in_date,
                check_out_date: b.check_out_date,
            });

        Ok(PropertyView {
            property,
            current_booking,
        })
    }
}
