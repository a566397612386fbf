//! Co-host delegation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownVariant;
use crate::base::{CoHostId, PropertyId, UserId};

/// Management capability a co-host can be granted.
///
/// The set is closed; the owner of a property holds all of them implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageBookings,
    ManageCalendar,
    ManageListing,
    ManageFinances,
    ManageMessages,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ManageBookings,
        Capability::ManageCalendar,
        Capability::ManageListing,
        Capability::ManageFinances,
        Capability::ManageMessages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ManageBookings => "manage_bookings",
            Capability::ManageCalendar => "manage_calendar",
            Capability::ManageListing => "manage_listing",
            Capability::ManageFinances => "manage_finances",
            Capability::ManageMessages => "manage_messages",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|capability| capability.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "capability",
                value: s.to_string(),
            })
    }
}

/// Role tag carried by a co-host row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoHostRole {
    #[default]
    Cohost,
    Manager,
    Cleaner,
    Maintenance,
}

impl CoHostRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoHostRole::Cohost => "cohost",
            CoHostRole::Manager => "manager",
            CoHostRole::Cleaner => "cleaner",
            CoHostRole::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for CoHostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoHostRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cohost" => Ok(CoHostRole::Cohost),
            "manager" => Ok(CoHostRole::Manager),
            "cleaner" => Ok(CoHostRole::Cleaner),
            "maintenance" => Ok(CoHostRole::Maintenance),
            other => Err(UnknownVariant {
                kind: "co-host role",
                value: other.to_string(),
            }),
        }
    }
}

/// Co-host entity; (property_id, user_id) is unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoHost {
    pub id: CoHostId,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub role: CoHostRole,
    pub can_manage_bookings: bool,
    pub can_manage_calendar: bool,
    pub can_manage_listing: bool,
    pub can_manage_finances: bool,
    pub can_manage_messages: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CoHost {
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageBookings => self.can_manage_bookings,
            Capability::ManageCalendar => self.can_manage_calendar,
            Capability::ManageListing => self.can_manage_listing,
            Capability::ManageFinances => self.can_manage_finances,
            Capability::ManageMessages => self.can_manage_messages,
        }
    }
}

/// Co-host creation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCoHost {
    pub user_id: UserId,
    #[serde(default)]
    pub role: CoHostRole,
    #[serde(default)]
    pub can_manage_bookings: bool,
    #[serde(default)]
    pub can_manage_calendar: bool,
    #[serde(default)]
    pub can_manage_listing: bool,
    #[serde(default)]
    pub can_manage_finances: bool,
    #[serde(default)]
    pub can_manage_messages: bool,
}

impl NewCoHost {
    pub fn into_cohost(self, property_id: PropertyId) -> CoHost {
        let now = Utc::now();
        CoHost {
            id: CoHostId::new(),
            property_id,
            user_id: self.user_id,
            role: self.role,
            can_manage_bookings: self.can_manage_bookings,
            can_manage_calendar: self.can_manage_calendar,
            can_manage_listing: self.can_manage_listing,
            can_manage_finances: self.can_manage_finances,
            can_manage_messages: self.can_manage_messages,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Co-host update payload; the (property, user) pair cannot change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoHostUpdate {
    pub role: Option<CoHostRole>,
    pub can_manage_bookings: Option<bool>,
    pub can_manage_calendar: Option<bool>,
    pub can_manage_listing: Option<bool>,
    pub can_manage_finances: Option<bool>,
    pub can_manage_messages: Option<bool>,
}

impl CoHostUpdate {
    pub fn apply(&self, cohost: &mut CoHost) {
        if let Some(role) = self.role {
            cohost.role = role;
        }
        if let Some(flag) = self.can_manage_bookings {
            cohost.can_manage_bookings = flag;
        }
        if let Some(flag) = self.can_manage_calendar {
            cohost.can_manage_calendar = flag;
        }
        if let Some(flag) = self.can_manage_listing {
            cohost.can_manage_listing = flag;
        }
        if let Some(flag) = self.can_manage_finances {
            cohost.can_manage_finances = flag;
        }
        if let Some(flag) = self.can_manage_messages {
            cohost.can_manage_messages = flag;
        }
        cohost.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names_parse() {
        for capability in Capability::ALL {
            assert_eq!(capability.as_str().parse::<Capability>().unwrap(), capability);
        }
        assert!("manage_everything".parse::<Capability>().is_err());
    }

    #[test]
    fn flags_map_to_capabilities() {
        let mut cohost = NewCoHost {
            user_id: UserId::new(),
            can_manage_calendar: true,
            ..Default::default()
        }
        .into_cohost(PropertyId::new());

        assert!(cohost.has(Capability::ManageCalendar));
        assert!(!cohost.has(Capability::ManageBookings));

        CoHostUpdate {
            can_manage_bookings: Some(true),
            can_manage_calendar: Some(false),
            ..Default::default()
        }
        .apply(&mut cohost);

        assert!(cohost.has(Capability::ManageBookings));
        assert!(!cohost.has(Capability::ManageCalendar));
        assert_eq!(cohost.role, CoHostRole::Cohost);
    }

    #[test]
    fn new_cohost_requires_a_user() {
        let result: Result<NewCoHost, _> =
            serde_json::from_value(serde_json::json!({ "role": "cleaner" }));
        assert!(result.is_err());
    }

    #[test]
    fn update_cannot_move_the_pair() {
        let result: Result<CoHostUpdate, _> =
            serde_json::from_value(serde_json::json!({ "user_id": UserId::new() }));
        assert!(result.is_err());
    }
}
