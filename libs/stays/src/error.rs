//! Error types for rental operations.

use common::error::DatabaseError;
use thiserror::Error;

/// Everything a rental operation can be refused for.
///
/// Validation variants are raised before any write happens; `Storage` is the
/// only variant that reflects an infrastructure fault rather than a rule.
#[derive(Error, Debug)]
pub enum RentalError {
    /// Referenced entity does not exist
    #[error("{0} does not exist")]
    NotFound(&'static str),

    /// Check-out is not after check-in (or a block ends before it starts)
    #[error("check-out date must be after check-in date")]
    InvalidRange,

    /// Malformed request field
    #[error("{field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    /// More guests than the property accepts
    #[error("maximum number of guests allowed is {max_guests}")]
    CapacityExceeded { max_guests: i32 },

    /// Another live booking holds part of the requested range
    #[error("property is not available for these dates")]
    DateConflict,

    /// The host blocked part of the requested range
    #[error("the host has blocked some of these dates")]
    DatesBlocked,

    /// Caller lacks the right to perform the operation
    #[error("{0}")]
    Forbidden(String),

    /// Operation not valid for the entity's lifecycle state
    #[error("{0}")]
    InvalidState(String),

    /// Uniqueness violation
    #[error("{0}")]
    Conflict(String),

    /// Temporal precondition not met yet
    #[error("{0}")]
    TooEarly(String),

    /// The property owner cannot be their own co-host
    #[error("property owner cannot be added as a co-host")]
    InvalidAssignment,

    /// The (property, user) pair already has a co-host row
    #[error("this user is already a co-host for this property")]
    Duplicate,

    /// An availability row with the same range already exists
    #[error("an availability entry already exists for this date range")]
    RangeConflict,

    /// The payment gateway refused or failed
    #[error("payment gateway error: {0}")]
    Payment(String),

    /// Storage fault
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl RentalError {
    /// Stable machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            RentalError::NotFound(_) => "not_found",
            RentalError::InvalidRange => "invalid_range",
            RentalError::InvalidInput { .. } => "invalid_input",
            RentalError::CapacityExceeded { .. } => "capacity_exceeded",
            RentalError::DateConflict => "date_conflict",
            RentalError::DatesBlocked => "dates_blocked",
            RentalError::Forbidden(_) => "forbidden",
            RentalError::InvalidState(_) => "invalid_state",
            RentalError::Conflict(_) => "conflict",
            RentalError::TooEarly(_) => "too_early",
            RentalError::InvalidAssignment => "invalid_assignment",
            RentalError::Duplicate => "duplicate",
            RentalError::RangeConflict => "range_conflict",
            RentalError::Payment(_) => "payment",
            RentalError::Storage(_) => "storage",
        }
    }

    /// Request field the failure should be reported against, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            RentalError::InvalidRange => Some("check_out_date"),
            RentalError::InvalidInput { field, .. } => Some(*field),
            RentalError::CapacityExceeded { .. } => Some("num_guests"),
            _ => None,
        }
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        RentalError::InvalidInput {
            field,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for RentalError {
    fn from(err: sqlx::Error) -> Self {
        RentalError::Storage(DatabaseError::Query(err))
    }
}

/// Type alias for rental results
pub type RentalResult<T> = Result<T, RentalError>;
