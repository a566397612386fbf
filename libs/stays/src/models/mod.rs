//! Rental models

pub mod availability;
pub mod booking;
pub mod cohost;
pub mod contract;
pub mod property;
pub mod regulation;
pub mod review;

// Re-export for convenience
pub use availability::{AvailabilityBlock, NewBlock};
pub use booking::{Booking, BookingRequest, BookingStatus};
pub use cohost::{Capability, CoHost, CoHostRole, CoHostUpdate, NewCoHost};
pub use contract::{
    Contract, ContractReminder, ContractStatus, ContractView, NewContract, RemindContract,
    SendContract, SignContract,
};
pub use property::{
    CurrentBooking, NewProperty, Property, PropertyUpdate, PropertyView, max_stored_amount,
};
pub use regulation::{
    DocumentType, NewRegulation, Regulation, RegulationFilter, RegulationRecipient,
    RegulationStatus, RegulationUpdate, SendRegulation,
};
pub use review::{RatingSummary, Review, ReviewRequest};

use thiserror::Error;

/// Raised when a stored or submitted enumeration value is not recognised
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
