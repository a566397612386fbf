//! Regulatory documents.
//!
//! A regulation is managed by its creator and, when it is attached to a
//! property, by whoever may manage that listing. Anyone signed in can read
//! published regulations. Sending one records a recipient row per user; only
//! that user can mark it viewed or acknowledged.

use std::sync::Arc;
use tracing::{debug, info};

use crate::base::{RecipientId, RegulationId, UserId};
use crate::clock::Clock;
use crate::cohost::CoHostAuthority;
use crate::error::{RentalError, RentalResult};
use crate::events::DomainEvent;
use crate::models::{
    Capability, NewRegulation, Regulation, RegulationFilter, RegulationRecipient,
    RegulationStatus, RegulationUpdate, SendRegulation,
};
use crate::store::Store;

#[derive(Clone)]
pub struct RegulationService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    cohosts: CoHostAuthority,
}

impl RegulationService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, cohosts: CoHostAuthority) -> Self {
        Self {
            store,
            clock,
            cohosts,
        }
    }

    async fn fetch(&self, id: RegulationId) -> RentalResult<Regulation> {
        self.store
            .regulation(id)
            .await?
            .ok_or(RentalError::NotFound("regulation"))
    }

    /// Whether `user` may edit and distribute the regulation.
    pub async fn can_manage(&self, user: UserId, regulation: &Regulation) -> RentalResult<bool> {
        if regulation.created_by == user {
            return Ok(true);
        }
        match regulation.property_id {
            Some(property) => {
                self.cohosts
                    .authorize(user, property, Capability::ManageListing)
                    .await
            }
            None => Ok(false),
        }
    }

    async fn require_manager(&self, user: UserId, regulation: &Regulation) -> RentalResult<()> {
        if self.can_manage(user, regulation).await? {
            Ok(())
        } else {
            Err(RentalError::Forbidden(
                "you do not have permission to manage this regulation".to_string(),
            ))
        }
    }

    pub async fn create_regulation(
        &self,
        actor: UserId,
        payload: NewRegulation,
    ) -> RentalResult<Regulation> {
        payload.validate(self.clock.today())?;
        if let Some(property) = payload.property_id {
            let property = self
                .store
                .property(property)
                .await?
                .ok_or(RentalError::NotFound("property"))?;
            self.cohosts
                .require(
                    actor,
                    &property,
                    Capability::ManageListing,
                    "publish regulations for this property",
                )
                .await?;
        }

        let regulation = payload.into_regulation(actor, self.clock.now());
        let event = DomainEvent::RegulationCreated {
            regulation_id: regulation.id,
            property_id: regulation.property_id,
            status: regulation.status,
        };
        self.store.insert_regulation(&regulation, event).await?;

        info!(
            "User {} created {} regulation {}",
            actor, regulation.document_type, regulation.id
        );
        Ok(regulation)
    }

    /// Published regulations matching `filter`. Asking for another status
    /// narrows the result to regulations `actor` created.
    pub async fn regulations(
        &self,
        actor: UserId,
        filter: RegulationFilter,
    ) -> RentalResult<Vec<Regulation>> {
        let filter = RegulationFilter {
            status: Some(filter.status.unwrap_or(RegulationStatus::Published)),
            ..filter
        };
        let found = self.store.regulations(&filter).await?;
        Ok(found
            .into_iter()
            .filter(|r| r.status == RegulationStatus::Published || r.created_by == actor)
            .collect())
    }

    /// Unpublished regulations resolve as missing for readers who cannot
    /// manage them.
    pub async fn regulation(&self, actor: UserId, id: RegulationId) -> RentalResult<Regulation> {
        let regulation = self.fetch(id).await?;
        if regulation.status == RegulationStatus::Published
            || self.can_manage(actor, &regulation).await?
        {
            Ok(regulation)
        } else {
            Err(RentalError::NotFound("regulation"))
        }
    }

    pub async fn update_regulation(
        &self,
        actor: UserId,
        id: RegulationId,
        changes: &RegulationUpdate,
    ) -> RentalResult<Regulation> {
        let mut regulation = self.fetch(id).await?;
        self.require_manager(actor, &regulation).await?;

        changes.apply(&mut regulation, self.clock.now())?;
        let event = DomainEvent::RegulationUpdated {
            regulation_id: regulation.id,
            status: regulation.status,
        };
        self.store.update_regulation(&regulation, event).await?;

        debug!("Regulation {} updated by {}", regulation.id, actor);
        Ok(regulation)
    }

    /// Delivers the regulation to each listed user. A user who already has
    /// it keeps their row; only its `sent_at` moves.
    pub async fn send_regulation(
        &self,
        actor: UserId,
        id: RegulationId,
        payload: &SendRegulation,
    ) -> RentalResult<Vec<RegulationRecipient>> {
        let regulation = self.fetch(id).await?;
        self.require_manager(actor, &regulation).await?;
        if regulation.status == RegulationStatus::Archived {
            return Err(RentalError::InvalidState(
                "archived regulations cannot be sent".to_string(),
            ));
        }
        payload.validate()?;

        let users = payload.distinct_users();
        let event = DomainEvent::RegulationSent {
            regulation_id: regulation.id,
            user_ids: users.clone(),
        };
        let delivered = self
            .store
            .send_regulation(regulation.id, &users, self.clock.now(), event)
            .await?;

        info!(
            "Regulation {} sent to {} recipients",
            regulation.id,
            delivered.len()
        );
        Ok(delivered)
    }

    pub async fn recipients(
        &self,
        actor: UserId,
        id: RegulationId,
    ) -> RentalResult<Vec<RegulationRecipient>> {
        let regulation = self.fetch(id).await?;
        self.require_manager(actor, &regulation).await?;
        self.store.recipients_for_regulation(regulation.id).await
    }

    /// Regulations delivered to `actor`.
    pub async fn received(&self, actor: UserId) -> RentalResult<Vec<RegulationRecipient>> {
        self.store.recipients_for_user(actor).await
    }

    /// Visible to the recipient and to the regulation's managers.
    pub async fn recipient(
        &self,
        actor: UserId,
        id: RecipientId,
    ) -> RentalResult<RegulationRecipient> {
        let recipient = self
            .store
            .recipient(id)
            .await?
            .ok_or(RentalError::NotFound("regulation recipient"))?;
        if recipient.user_id == actor {
            return Ok(recipient);
        }
        let regulation = self.fetch(recipient.regulation_id).await?;
        if self.can_manage(actor, &regulation).await? {
            Ok(recipient)
        } else {
            Err(RentalError::NotFound("regulation recipient"))
        }
    }

    async fn own_copy(&self, actor: UserId, id: RecipientId) -> RentalResult<RegulationRecipient> {
        let recipient = self.recipient(actor, id).await?;
        if recipient.user_id != actor {
            return Err(RentalError::Forbidden(
                "only the recipient can update this regulation copy".to_string(),
            ));
        }
        Ok(recipient)
    }

    /// Stamps the first view; repeated views change nothing.
    pub async fn mark_viewed(
        &self,
        actor: UserId,
        id: RecipientId,
    ) -> RentalResult<RegulationRecipient> {
        let mut recipient = self.own_copy(actor, id).await?;
        if recipient.mark_viewed(self.clock.now()) {
            self.store
                .save_recipient(&recipient, DomainEvent::regulation_viewed(&recipient))
                .await?;
        }
        Ok(recipient)
    }

    /// Acknowledges the regulation, which also counts as viewing it.
    pub async fn acknowledge(
        &self,
        actor: UserId,
        id: RecipientId,
    ) -> RentalResult<RegulationRecipient> {
        let mut recipient = self.own_copy(actor, id).await?;
        if recipient.acknowledge(self.clock.now()) {
            self.store
                .save_recipient(
                    &recipient,
                    DomainEvent::regulation_acknowledged(&recipient),
                )
                .await?;
            info!(
                "User {} acknowledged regulation {}",
                actor, recipient.regulation_id
            );
        }
        Ok(recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{DocumentType, NewCoHost, Property};
    use crate::store::MemoryStore;
    use crate::testing::{day, listing};

    struct Fixture {
        store: Arc<dyn Store>,
        clock: Arc<FixedClock>,
        service: RegulationService,
        cohosts: CoHostAuthority,
        host: UserId,
        property: Property,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(day(2024, 6, 1)));
        let host = UserId::new();
        let property = listing(host, 100, 4);
        store.insert_property(&property).await.unwrap();
        let cohosts = CoHostAuthority::new(store.clone());

        Fixture {
            service: RegulationService::new(store.clone(), clock.clone(), cohosts.clone()),
            store,
            clock,
            cohosts,
            host,
            property,
        }
    }

    fn quiet_hours(f: &Fixture, status: RegulationStatus) -> NewRegulation {
        NewRegulation {
            title: "Quiet hours".to_string(),
            body: "No music after 22:00.".to_string(),
            property_id: Some(f.property.id),
            status,
            ..Default::default()
        }
    }

    async fn published(f: &Fixture) -> Regulation {
        f.service
            .create_regulation(f.host, quiet_hours(f, RegulationStatus::Published))
            .await
            .unwrap()
    }

    fn to(users: &[UserId]) -> SendRegulation {
        SendRegulation {
            user_ids: users.to_vec(),
            message: None,
        }
    }

    #[tokio::test]
    async fn only_listing_managers_attach_regulations_to_a_property() {
        let f = fixture().await;
        let err = f
            .service
            .create_regulation(UserId::new(), quiet_hours(&f, RegulationStatus::Draft))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));

        let manager = UserId::new();
        f.cohosts
            .create_cohost(
                f.host,
                f.property.id,
                NewCoHost {
                    user_id: manager,
                    can_manage_listing: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let created = f
            .service
            .create_regulation(manager, quiet_hours(&f, RegulationStatus::Draft))
            .await
            .unwrap();
        assert_eq!(created.effective_date, day(2024, 6, 1));
        assert_eq!(created.document_type, DocumentType::HouseRules);
    }

    #[tokio::test]
    async fn expiration_before_effective_date_is_a_field_error() {
        let f = fixture().await;
        let mut payload = quiet_hours(&f, RegulationStatus::Draft);
        payload.effective_date = Some(day(2024, 7, 1));
        payload.expiration_date = Some(day(2024, 6, 30));
        let err = f.service.create_regulation(f.host, payload).await.unwrap_err();
        assert_eq!(err.field(), Some("expiration_date"));
    }

    #[tokio::test]
    async fn readers_see_published_regulations_only() {
        let f = fixture().await;
        let draft = f
            .service
            .create_regulation(f.host, quiet_hours(&f, RegulationStatus::Draft))
            .await
            .unwrap();
        let live = published(&f).await;
        let reader = UserId::new();

        let listed = f
            .service
            .regulations(reader, RegulationFilter::default())
            .await
            .unwrap();
        assert_eq!(listed, vec![live.clone()]);

        let drafts = RegulationFilter {
            status: Some(RegulationStatus::Draft),
            ..Default::default()
        };
        assert!(f.service.regulations(reader, drafts.clone()).await.unwrap().is_empty());
        assert_eq!(f.service.regulations(f.host, drafts).await.unwrap().len(), 1);

        let err = f.service.regulation(reader, draft.id).await.unwrap_err();
        assert!(matches!(err, RentalError::NotFound("regulation")));
        assert_eq!(f.service.regulation(f.host, draft.id).await.unwrap(), draft);
        assert_eq!(f.service.regulation(reader, live.id).await.unwrap(), live);
    }

    #[tokio::test]
    async fn sending_twice_keeps_one_row_per_user() {
        let f = fixture().await;
        let regulation = published(&f).await;
        let (tenant, neighbour) = (UserId::new(), UserId::new());

        let first = f
            .service
            .send_regulation(f.host, regulation.id, &to(&[tenant, tenant]))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        f.clock.set(day(2024, 6, 5));
        let second = f
            .service
            .send_regulation(f.host, regulation.id, &to(&[tenant, neighbour]))
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].sent_at, f.clock.now());

        let all = f.service.recipients(f.host, regulation.id).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn sending_needs_recipients_and_a_manager() {
        let f = fixture().await;
        let regulation = published(&f).await;

        let err = f
            .service
            .send_regulation(f.host, regulation.id, &to(&[]))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("user_ids"));

        let err = f
            .service
            .send_regulation(UserId::new(), regulation.id, &to(&[UserId::new()]))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));
    }

    #[tokio::test]
    async fn archived_regulations_are_not_sent() {
        let f = fixture().await;
        let regulation = published(&f).await;
        f.service
            .update_regulation(
                f.host,
                regulation.id,
                &RegulationUpdate {
                    status: Some(RegulationStatus::Archived),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = f
            .service
            .send_regulation(f.host, regulation.id, &to(&[UserId::new()]))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::InvalidState(_)));
    }

    #[tokio::test]
    async fn only_the_recipient_views_or_acknowledges() {
        let f = fixture().await;
        let regulation = published(&f).await;
        let tenant = UserId::new();
        let copy = f
            .service
            .send_regulation(f.host, regulation.id, &to(&[tenant]))
            .await
            .unwrap()
            .remove(0);

        let err = f.service.acknowledge(f.host, copy.id).await.unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));
        let err = f.service.mark_viewed(f.host, copy.id).await.unwrap_err();
        assert!(matches!(err, RentalError::Forbidden(_)));

        let err = f.service.recipient(UserId::new(), copy.id).await.unwrap_err();
        assert!(matches!(err, RentalError::NotFound(_)));

        let viewed = f.service.mark_viewed(tenant, copy.id).await.unwrap();
        assert_eq!(viewed.viewed_at, Some(f.clock.now()));
        assert!(!viewed.acknowledged);

        f.clock.set(day(2024, 6, 3));
        let acknowledged = f.service.acknowledge(tenant, copy.id).await.unwrap();
        assert!(acknowledged.acknowledged);
        assert_eq!(acknowledged.acknowledged_at, Some(f.clock.now()));
        assert_eq!(acknowledged.viewed_at, viewed.viewed_at);

        let stored = f.store.recipient(copy.id).await.unwrap().unwrap();
        assert_eq!(stored, acknowledged);
        assert_eq!(f.service.received(tenant).await.unwrap(), vec![acknowledged]);
    }

    #[tokio::test]
    async fn repeated_acknowledgement_emits_one_event() {
        let f = fixture().await;
        let regulation = published(&f).await;
        let tenant = UserId::new();
        let copy = f
            .service
            .send_regulation(f.host, regulation.id, &to(&[tenant]))
            .await
            .unwrap()
            .remove(0);

        f.service.acknowledge(tenant, copy.id).await.unwrap();
        f.service.acknowledge(tenant, copy.id).await.unwrap();
        f.service.mark_viewed(tenant, copy.id).await.unwrap();

        let acknowledgements = f
            .store
            .undelivered_events(100)
            .await
            .unwrap()
            .iter()
            .filter(|r| r.event.name() == "regulation_acknowledged")
            .count();
        assert_eq!(acknowledgements, 1);
    }
}
