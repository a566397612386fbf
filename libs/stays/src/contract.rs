//! Rental contracts.
//!
//! A contract moves `draft → sent → signed`. Only its creator sees or acts on
//! it; the customer is identified by contact details and a unique customer
//! number, not by an account. The signature is recorded as given, it is not
//! verified.

use std::sync::Arc;
use tracing::info;

use crate::base::{ContractId, ReminderId, UserId};
use crate::clock::Clock;
use crate::error::{RentalError, RentalResult};
use crate::events::DomainEvent;
use crate::models::{
    Contract, ContractReminder, ContractStatus, ContractView, NewContract, RemindContract,
    SendContract, SignContract,
};
use crate::store::Store;

#[derive(Clone)]
pub struct ContractService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ContractService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Contracts of other users resolve as missing.
    async fn owned(&self, actor: UserId, id: ContractId) -> RentalResult<Contract> {
        self.store
            .contract(id)
            .await?
            .filter(|contract| contract.created_by == actor)
            .ok_or(RentalError::NotFound("contract"))
    }

    async fn view(&self, contract: Contract) -> RentalResult<ContractView> {
        let reminders = self.store.reminders_for_contract(contract.id).await?;
        Ok(ContractView {
            is_expired: contract.is_expired_at(self.clock.now()),
            contract,
            reminders,
        })
    }

    pub async fn create_contract(
        &self,
        actor: UserId,
        payload: NewContract,
    ) -> RentalResult<ContractView> {
        payload.validate()?;
        let contract = payload.into_contract(actor, self.clock.now());
        self.store
            .insert_contract(&contract, DomainEvent::contract_created(&contract))
            .await?;

        info!("User {} drafted contract {}", actor, contract.id);
        self.view(contract).await
    }

    pub async fn contracts(&self, actor: UserId) -> RentalResult<Vec<ContractView>> {
        let mut views = Vec::new();
        for contract in self.store.contracts_by_creator(actor).await? {
            views.push(self.view(contract).await?);
        }
        Ok(views)
    }

    pub async fn contract(&self, actor: UserId, id: ContractId) -> RentalResult<ContractView> {
        let contract = self.owned(actor, id).await?;
        self.view(contract).await
    }

    /// Sends a draft for signature, opening a signing window of
    /// `expiration_days` from now.
    pub async fn send_contract(
        &self,
        actor: UserId,
        id: ContractId,
        payload: &SendContract,
    ) -> RentalResult<ContractView> {
        let mut contract = self.owned(actor, id).await?;
        if contract.status != ContractStatus::Draft {
            return Err(RentalError::InvalidState(
                "only draft contracts can be sent for signature".to_string(),
            ));
        }
        payload.validate()?;

        let now = self.clock.now();
        contract.status = ContractStatus::Sent;
        contract.sent_at = Some(now);
        contract.expiration_date = Some(payload.deadline(now));
        contract.updated_at = now;

        let event = DomainEvent::ContractSent {
            contract_id: contract.id,
            expiration_date: contract.expiration_date,
        };
        self.store
            .save_contract(&contract, ContractStatus::Draft, event)
            .await?;

        info!(
            "Contract {} sent to customer {}",
            contract.id, contract.customer_number
        );
        self.view(contract).await
    }

    pub async fn remind_contract(
        &self,
        actor: UserId,
        id: ContractId,
        payload: &RemindContract,
    ) -> RentalResult<ContractReminder> {
        let contract = self.owned(actor, id).await?;
        if contract.status != ContractStatus::Sent {
            return Err(RentalError::InvalidState(
                "reminders can only be sent for contracts awaiting signature".to_string(),
            ));
        }

        let reminder = ContractReminder {
            id: ReminderId::new(),
            contract_id: contract.id,
            sent_by: actor,
            notes: payload.message.clone().unwrap_or_default(),
            sent_at: self.clock.now(),
        };
        let event = DomainEvent::ContractReminded {
            contract_id: contract.id,
            reminder_id: reminder.id,
        };
        self.store.insert_reminder(&reminder, event).await?;

        info!("Reminder sent for contract {}", contract.id);
        Ok(reminder)
    }

    /// Records the customer's signature on a sent contract whose signing
    /// window is still open.
    pub async fn sign_contract(
        &self,
        actor: UserId,
        id: ContractId,
        payload: &SignContract,
    ) -> RentalResult<ContractView> {
        let mut contract = self.owned(actor, id).await?;
        if contract.status != ContractStatus::Sent {
            return Err(RentalError::InvalidState(
                "only sent contracts can be signed".to_string(),
            ));
        }
        let now = self.clock.now();
        if contract.is_expired_at(now) {
            return Err(RentalError::InvalidState(
                "the signing window for this contract has closed".to_string(),
            ));
        }
        payload.validate()?;

        contract.status = ContractStatus::Signed;
        contract.signed_at = Some(now);
        contract.signer_name = Some(payload.signer_name.trim().to_string());
        contract.updated_at = now;

        let event = DomainEvent::ContractSigned {
            contract_id: contract.id,
            signer_name: payload.signer_name.trim().to_string(),
        };
        self.store
            .save_contract(&contract, ContractStatus::Sent, event)
            .await?;

        info!("Contract {} signed", contract.id);
        self.view(contract).await
    }
}
