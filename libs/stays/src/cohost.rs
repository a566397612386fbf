//! Co-host authorization.
//!
//! The property owner implicitly holds every [`Capability`]. Anyone else
//! needs a co-host row for the property with the matching flag set.

use std::sync::Arc;
use tracing::{debug, info};

use crate::base::{CoHostId, PropertyId, UserId};
use crate::error::{RentalError, RentalResult};
use crate::events::DomainEvent;
use crate::models::{Capability, CoHost, CoHostUpdate, NewCoHost, Property};
use crate::store::Store;

/// Grants and checks delegated capabilities
#[derive(Clone)]
pub struct CoHostAuthority {
    store: Arc<dyn Store>,
}

impl CoHostAuthority {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn property(&self, id: PropertyId) -> RentalResult<Property> {
        self.store
            .property(id)
            .await?
            .ok_or(RentalError::NotFound("property"))
    }

    /// Whether `user` holds `capability` on the property.
    ///
    /// Unknown properties authorize nobody.
    pub async fn authorize(
        &self,
        user: UserId,
        property: PropertyId,
        capability: Capability,
    ) -> RentalResult<bool> {
        match self.store.property(property).await? {
            Some(property) => self.authorize_on(user, &property, capability).await,
            None => Ok(false),
        }
    }

    /// Same as [`authorize`](Self::authorize) for a capability given by name.
    ///
    /// Names outside the closed capability set resolve to `false`.
    pub async fn authorize_named(
        &self,
        user: UserId,
        property: PropertyId,
        capability: &str,
    ) -> RentalResult<bool> {
        match capability.parse::<Capability>() {
            Ok(capability) => self.authorize(user, property, capability).await,
            Err(e) => {
                debug!("Authorization check with {}", e);
                Ok(false)
            }
        }
    }

    pub async fn authorize_on(
        &self,
        user: UserId,
        property: &Property,
        capability: Capability,
    ) -> RentalResult<bool> {
        if property.host_id == user {
            return Ok(true);
        }
        Ok(self
            .store
            .cohost_for(property.id, user)
            .await?
            .is_some_and(|cohost| cohost.has(capability)))
    }

    /// Fails with [`RentalError::Forbidden`] unless `user` holds `capability`.
    pub async fn require(
        &self,
        user: UserId,
        property: &Property,
        capability: Capability,
        action: &str,
    ) -> RentalResult<()> {
        if self.authorize_on(user, property, capability).await? {
            Ok(())
        } else {
            Err(RentalError::Forbidden(format!(
                "you do not have permission to {}",
                action
            )))
        }
    }

    fn require_owner(actor: UserId, property: &Property) -> RentalResult<()> {
        if property.host_id == actor {
            Ok(())
        } else {
            Err(RentalError::Forbidden(
                "only the property owner can manage co-hosts".to_string(),
            ))
        }
    }

    async fn require_member(&self, actor: UserId, property: &Property) -> RentalResult<()> {
        if property.host_id == actor || self.store.cohost_for(property.id, actor).await?.is_some() {
            Ok(())
        } else {
            Err(RentalError::Forbidden(
                "only the owner or a co-host can view co-hosts".to_string(),
            ))
        }
    }

    async fn scoped(&self, property: PropertyId, id: CoHostId) -> RentalResult<CoHost> {
        self.store
            .cohost(id)
            .await?
            .filter(|cohost| cohost.property_id == property)
            .ok_or(RentalError::NotFound("co-host"))
    }

    pub async fn create_cohost(
        &self,
        actor: UserId,
        property: PropertyId,
        payload: NewCoHost,
    ) -> RentalResult<CoHost> {
        let property = self.property(property).await?;
        Self::require_owner(actor, &property)?;

        if payload.user_id == property.host_id {
            return Err(RentalError::InvalidAssignment);
        }

        let cohost = payload.into_cohost(property.id);
        self.store
            .insert_cohost(&cohost, DomainEvent::cohost_added(&cohost))
            .await?;

        info!(
            "Added co-host {} ({}) to property {}",
            cohost.user_id, cohost.role, property.id
        );
        Ok(cohost)
    }

    /// Changes role and flags of an existing row; the (property, user) pair
    /// never changes, so this cannot collide with another row.
    pub async fn update_cohost(
        &self,
        actor: UserId,
        property: PropertyId,
        id: CoHostId,
        changes: &CoHostUpdate,
    ) -> RentalResult<CoHost> {
        let property = self.property(property).await?;
        Self::require_owner(actor, &property)?;
        let existing = self.scoped(property.id, id).await?;

        let event = DomainEvent::CoHostUpdated {
            cohost_id: existing.id,
            property_id: property.id,
        };
        let updated = self
            .store
            .update_cohost(existing.id, changes, event)
            .await?
            .ok_or(RentalError::NotFound("co-host"))?;

        info!("Updated co-host {} on property {}", updated.id, property.id);
        Ok(updated)
    }

    pub async fn remove_cohost(
        &self,
        actor: UserId,
        property: PropertyId,
        id: CoHostId,
    ) -> RentalResult<()> {
        let property = self.property(property).await?;
        Self::require_owner(actor, &property)?;
        let existing = self.scoped(property.id, id).await?;

        if !self
            .store
            .delete_cohost(existing.id, DomainEvent::cohost_removed(&existing))
            .await?
        {
            return Err(RentalError::NotFound("co-host"));
        }

        info!(
            "Removed co-host {} from property {}",
            existing.user_id, property.id
        );
        Ok(())
    }

    pub async fn list_cohosts(
        &self,
        actor: UserId,
        property: PropertyId,
    ) -> RentalResult<Vec<CoHost>> {
        let property = self.property(property).await?;
        self.require_member(actor, &property).await?;
        self.store.cohosts_for_property(property.id).await
    }

    pub async fn get_cohost(
        &self,
        actor: UserId,
        property: PropertyId,
        id: CoHostId,
    ) -> RentalResult<CoHost> {
        let property = self.property(property).await?;
        self.require_member(actor, &property).await?;
        self.scoped(property.id, id).await
    }

    /// Properties `user` co-hosts.
    pub async fn cohosted_properties(&self, user: UserId) -> RentalResult<Vec<Property>> {
        self.store.cohosted_properties(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CoHostRole;
    use crate::store::MemoryStore;
    use crate::testing::listing;

    async fn setup() -> (CoHostAuthority, Property) {
        let store = Arc::new(MemoryStore::new());
        let property = listing(UserId::new(), 100, 4);
        store.insert_property(&property).await.unwrap();
        (CoHostAuthority::new(store), property)
    }

    fn grant(user: UserId) -> NewCoHost {
        NewCoHost {
            user_id: user,
            can_manage_calendar: true,
            ..NewCoHost::default()
        }
    }

    #[tokio::test]
    async fn owner_holds_every_capability() {
        let (authority, property) = setup().await;
        for capability in Capability::ALL {
            assert!(
                authority
                    .authorize(property.host_id, property.id, capability)
                    .await
                    .unwrap()
            );
        }
    }

    #[tokio::test]
    async fn cohost_holds_only_granted_flags() {
        let (authority, property) = setup().await;
        let user = UserId::new();
        authority
            .create_cohost(property.host_id, property.id, grant(user))
            .await
            .unwrap();

        assert!(
            authority
                .authorize(user, property.id, Capability::ManageCalendar)
                .await
                .unwrap()
        );
        assert!(
            !authority
                .authorize(user, property.id, Capability::ManageFinances)
                .await
                .unwrap()
        );
        assert!(
            !authority
                .authorize(UserId::new(), property.id, Capability::ManageCalendar)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn unknown_capability_names_are_denied() {
        let (authority, property) = setup().await;
        assert!(
            !authority
                .authorize_named(property.host_id, property.id, "manage_everything")
                .await
                .unwrap()
        );
        assert!(
            authority
                .authorize_named(property.host_id, property.id, "manage_listing")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn owner_cannot_cohost_own_property() {
        let (authority, property) = setup().await;
        let err = authority
            .create_cohost(property.host_id, property.id, grant(property.host_id))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::InvalidAssignment));
    }

    #[tokio::test]
    async fn duplicate_pair_is_rejected_but_update_succeeds() {
        let (authority, property) = setup().await;
        let user = UserId::new();
        let cohost = authority
            .create_cohost(property.host_id, property.id, grant(user))
            .await
            .unwrap();

        let err = authority
            .create_cohost(property.host_id, property.id, grant(user))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Duplicate));

        let changes = CoHostUpdate {
            role: Some(CoHostRole::Manager),
            can_manage_bookings: Some(true),
            ..CoHostUpdate::default()
        };
        let updated = authority
            .update_cohost(property.host_id, property.id, cohost.id, &changes)
            .await
            .unwrap();
        assert_eq!(updated.role, CoHostRole::Manager);
        assert!(updated.can_manage_bookings);
        assert!(updated.can_manage_calendar);
    }

    #[tokio::test]
    async fn only_owner_manages_but_cohosts_can_view() {
        let (authority, property) = setup().await;
        let user = UserId::new();
        let cohost = authority
            .create_cohost(property.host_id, property.id, grant(user))
            .await
            .unwrap();

        let err = authority
            .create_cohost(user, property.id, grant(UserId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));

        let listed = authority.list_cohosts(user, property.id).await.unwrap();
        assert_eq!(listed.len(), 1);

        let err = authority
            .get_cohost(UserId::new(), property.id, cohost.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));

        let err = authority
            .remove_cohost(user, property.id, cohost.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));
    }

    #[tokio::test]
    async fn removal_revokes_capabilities() {
        let (authority, property) = setup().await;
        let user = UserId::new();
        let cohost = authority
            .create_cohost(property.host_id, property.id, grant(user))
            .await
            .unwrap();

        assert_eq!(authority.cohosted_properties(user).await.unwrap().len(), 1);

        authority
            .remove_cohost(property.host_id, property.id, cohost.id)
            .await
            .unwrap();

        assert!(
            !authority
                .authorize(user, property.id, Capability::ManageCalendar)
                .await
                .unwrap()
        );
        assert!(authority.cohosted_properties(user).await.unwrap().is_empty());
    }
}
