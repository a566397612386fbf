//! Identifier newtypes shared by every entity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// A user of the platform, as identified by the bearer token subject.
    UserId
);
entity_id!(PropertyId);
entity_id!(BookingId);
entity_id!(ReviewId);
entity_id!(CoHostId);
entity_id!(
    /// An availability ledger row.
    BlockId
);
entity_id!(ContractId);
entity_id!(ReminderId);
entity_id!(RegulationId);
entity_id!(
    /// One user's delivery of a regulation.
    RecipientId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_uuids() {
        let raw = Uuid::new_v4();
        let id = PropertyId(raw);
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            format!("\"{}\"", raw)
        );
        assert_eq!(id.to_string(), raw.to_string());
    }

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(BookingId::new(), BookingId::new());
    }
}
