//! Payment session adapter.
//!
//! The engine does not speak any gateway protocol. It asks a
//! [`PaymentGateway`] for a checkout session, stores the opaque token on the
//! booking, and later folds the session's terminal state back into the
//! booking status: `paid` confirms a pending booking, `failed` leaves it
//! pending.
//!
//! The state is only ever read from the gateway. Callbacks name a session
//! and nothing more; whatever state they claim is not trusted.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::base::{BookingId, UserId};
use crate::error::{RentalError, RentalResult};
use crate::events::DomainEvent;
use crate::models::{Booking, BookingStatus};
use crate::store::Store;

/// State of a checkout session as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Open,
    Paid,
    Failed,
}

/// What the gateway is asked to charge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutRequest {
    pub booking_id: BookingId,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
}

/// A session the guest completes on the gateway's side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub token: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &CheckoutRequest) -> RentalResult<CheckoutSession>;

    async fn session_state(&self, token: &str) -> RentalResult<PaymentState>;
}

/// In-process gateway whose sessions are settled by hand
#[derive(Debug)]
pub struct SandboxGateway {
    base_url: String,
    sessions: DashMap<String, PaymentState>,
}

impl SandboxGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            sessions: DashMap::new(),
        }
    }

    /// Moves a session to `state`, as the guest completing checkout would.
    pub fn settle(&self, token: &str, state: PaymentState) -> RentalResult<()> {
        let mut session = self
            .sessions
            .get_mut(token)
            .ok_or(RentalError::NotFound("payment session"))?;
        *session = state;
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_session(&self, request: &CheckoutRequest) -> RentalResult<CheckoutSession> {
        let token = format!("cs_{}", Uuid::new_v4().simple());
        self.sessions.insert(token.clone(), PaymentState::Open);
        debug!(
            "Sandbox session {} for {} {} ({})",
            token, request.amount, request.currency, request.booking_id
        );

        Ok(CheckoutSession {
            url: format!("{}/{}", self.base_url.trim_end_matches('/'), token),
            token,
        })
    }

    async fn session_state(&self, token: &str) -> RentalResult<PaymentState> {
        self.sessions
            .get(token)
            .map(|state| *state)
            .ok_or_else(|| RentalError::Payment(format!("unknown session {}", token)))
    }
}

/// Starts and reconciles payments for bookings
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, currency: String) -> Self {
        Self {
            store,
            gateway,
            currency,
        }
    }

    async fn booking(&self, id: BookingId) -> RentalResult<Booking> {
        self.store
            .booking(id)
            .await?
            .ok_or(RentalError::NotFound("booking"))
    }

    /// Opens a checkout session for the booking's stored total.
    ///
    /// A new session replaces any earlier one while the booking is pending.
    pub async fn start_payment(
        &self,
        guest: UserId,
        booking: BookingId,
    ) -> RentalResult<CheckoutSession> {
        let booking = self.booking(booking).await?;
        if booking.guest_id != guest {
            return Err(RentalError::Forbidden(
                "only the guest can pay for this booking".to_string(),
            ));
        }
        if booking.status != BookingStatus::Pending {
            return Err(RentalError::InvalidState(format!(
                "only pending bookings can be paid (booking is {})",
                booking.status
            )));
        }

        let request = CheckoutRequest {
            booking_id: booking.id,
            amount: booking.total_price,
            currency: self.currency.clone(),
            description: format!(
                "Stay from {} to {}",
                booking.check_in_date, booking.check_out_date
            ),
        };
        let session = self.gateway.create_session(&request).await?;

        let event = DomainEvent::PaymentSessionStarted {
            booking_id: booking.id,
            session: session.token.clone(),
        };
        self.store
            .set_payment_session(booking.id, &session.token, event)
            .await?;

        info!(
            "Started payment session for booking {} ({} {})",
            booking.id, request.amount, request.currency
        );
        Ok(session)
    }

    /// Polls the gateway for the booking's session and applies the result.
    pub async fn reconcile(&self, booking: BookingId) -> RentalResult<Booking> {
        let booking = self.booking(booking).await?;
        let Some(token) = booking.payment_session.clone() else {
            return Err(RentalError::InvalidState(
                "booking has no payment session".to_string(),
            ));
        };
        let state = self.gateway.session_state(&token).await?;
        self.apply(booking, state).await
    }

    /// Handles a gateway notification that session `token` changed.
    ///
    /// The session's state is fetched from the gateway before anything is
    /// applied.
    pub async fn handle_payment_notice(&self, token: &str) -> RentalResult<Booking> {
        let booking = self
            .store
            .booking_by_session(token)
            .await?
            .ok_or(RentalError::NotFound("payment session"))?;
        let state = self.gateway.session_state(token).await?;
        debug!(
            "Gateway reports session {} as {:?} for booking {}",
            token, state, booking.id
        );
        self.apply(booking, state).await
    }

    async fn apply(&self, booking: Booking, state: PaymentState) -> RentalResult<Booking> {
        match (state, booking.status) {
            (PaymentState::Paid, BookingStatus::Pending) => {
                let event = DomainEvent::BookingConfirmed {
                    booking_id: booking.id,
                    property_id: booking.property_id,
                };
                let confirmed = self
                    .store
                    .transition_booking(
                        booking.id,
                        &[BookingStatus::Pending],
                        BookingStatus::Confirmed,
                        event,
                    )
                    .await?;
                info!("Booking {} confirmed after payment", confirmed.id);
                Ok(confirmed)
            }
            (PaymentState::Paid, BookingStatus::Confirmed) => {
                debug!("Booking {} already confirmed", booking.id);
                Ok(booking)
            }
            (PaymentState::Paid, BookingStatus::Cancelled) => {
                warn!("Payment received for cancelled booking {}", booking.id);
                Err(RentalError::InvalidState(
                    "booking was cancelled before payment completed".to_string(),
                ))
            }
            (PaymentState::Failed, _) => {
                warn!("Payment failed for booking {}", booking.id);
                Ok(booking)
            }
            (PaymentState::Open, _) => Ok(booking),
        }
    }

    /// Reconciles every pending booking that has a session.
    ///
    /// Returns how many were confirmed. Per-booking failures are logged and
    /// skipped.
    pub async fn reconcile_pending(&self) -> RentalResult<usize> {
        let mut confirmed = 0;
        for booking in self.store.bookings_awaiting_payment().await? {
            match self.reconcile(booking.id).await {
                Ok(updated) if updated.status == BookingStatus::Confirmed => confirmed += 1,
                Ok(_) => {}
                Err(e) => warn!("Failed to reconcile booking {}: {}", booking.id, e),
            }
        }
        Ok(confirmed)
    }
}
