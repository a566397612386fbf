//! # Stays
//!
//! Domain core of the rental backend: the property catalog, the availability
//! ledger, the booking engine, the review gate, co-host authorization, the
//! payment session seam, rental contracts and regulatory documents.
//!
//! Every service reads and writes through a [`Store`]. [`PgStore`] backs
//! production deployments; [`MemoryStore`] keeps the same guarantees in
//! process and is used by tests and local development.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use rust_decimal::Decimal;
//! use serde_json::json;
//! use stays::{BookingPolicy, BookingRequest, MemoryStore, NewProperty, SandboxGateway, Stays, SystemClock, UserId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stays = Stays::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SandboxGateway::new("http://localhost:3001/checkout")),
//!     Arc::new(SystemClock),
//!     BookingPolicy::default(),
//! );
//!
//! let listing: NewProperty = serde_json::from_value(json!({
//!     "title": "Lake cabin",
//!     "address_street": "4 Shore Road",
//!     "address_city": "Annecy",
//!     "address_state": "Haute-Savoie",
//!     "address_zip_code": "74000",
//!     "address_country": "France",
//!     "property_type": "cabin",
//!     "room_category": "entire_place",
//!     "price_per_night": "100",
//!     "max_guests": 4
//! }))?;
//! let created = stays.catalog.create_property(UserId::new(), listing).await?;
//!
//! let booking = stays
//!     .bookings
//!     .create_booking(
//!         UserId::new(),
//!         &BookingRequest {
//!             property_id: created.property.id,
//!             check_in_date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
//!             check_out_date: NaiveDate::from_ymd_opt(2030, 6, 4).unwrap(),
//!             num_guests: 2,
//!         },
//!     )
//!     .await?;
//!
//! assert_eq!(booking.total_price, Decimal::new(300, 0));
//! # Ok(())
//! # }
//! ```

pub mod availability;
mod base;
pub mod booking;
pub mod catalog;
pub mod clock;
pub mod cohost;
pub mod contract;
pub mod error;
pub mod events;
pub mod models;
pub mod payment;
mod range;
pub mod regulation;
pub mod review;
pub mod store;
#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use availability::AvailabilityLedger;
pub use base::{
    BlockId, BookingId, CoHostId, ContractId, PropertyId, RecipientId, RegulationId, ReminderId,
    ReviewId, UserId,
};
pub use booking::{BookingEngine, BookingPolicy, plan_booking, quote};
pub use catalog::Catalog;
pub use clock::{Clock, FixedClock, SystemClock};
pub use cohost::CoHostAuthority;
pub use contract::ContractService;
pub use error::{RentalError, RentalResult};
pub use events::{AuditLogHandler, DomainEvent, EventHandler, OutboxRecord, OutboxRelay};
pub use models::*;
pub use payment::{
    CheckoutRequest, CheckoutSession, PaymentGateway, PaymentService, PaymentState,
    SandboxGateway,
};
pub use range::StayRange;
pub use regulation::RegulationService;
pub use review::ReviewGate;
pub use store::{MemoryStore, PgStore, ReservationSnapshot, Store};

/// All domain services wired to one store
#[derive(Clone)]
pub struct Stays {
    pub catalog: Catalog,
    pub ledger: AvailabilityLedger,
    pub bookings: BookingEngine,
    pub reviews: ReviewGate,
    pub cohosts: CoHostAuthority,
    pub payments: PaymentService,
    pub contracts: ContractService,
    pub regulations: RegulationService,
    pub store: Arc<dyn Store>,
}

impl Stays {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        let cohosts = CoHostAuthority::new(store.clone());
        let currency = policy.currency.clone();

        Self {
            catalog: Catalog::new(store.clone(), clock.clone(), cohosts.clone()),
            ledger: AvailabilityLedger::new(store.clone(), cohosts.clone()),
            bookings: BookingEngine::new(store.clone(), clock.clone(), cohosts.clone(), policy),
            reviews: ReviewGate::new(store.clone(), clock.clone()),
            payments: PaymentService::new(store.clone(), gateway, currency),
            contracts: ContractService::new(store.clone(), clock.clone()),
            regulations: RegulationService::new(store.clone(), clock, cohosts.clone()),
            cohosts,
            store,
        }
    }
}
