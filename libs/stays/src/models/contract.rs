//! Rental contract model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownVariant;
use super::property::require_text;
use crate::base::{ContractId, ReminderId, UserId};
use crate::error::RentalError;

/// Contract lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    #[default]
    Draft,
    /// Awaiting the customer's signature
    Sent,
    Signed,
    Expired,
    Declined,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Sent => "sent",
            ContractStatus::Signed => "signed",
            ContractStatus::Expired => "expired",
            ContractStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ContractStatus::Draft),
            "sent" => Ok(ContractStatus::Sent),
            "signed" => Ok(ContractStatus::Signed),
            "expired" => Ok(ContractStatus::Expired),
            "declined" => Ok(ContractStatus::Declined),
            other => Err(UnknownVariant {
                kind: "contract status",
                value: other.to_string(),
            }),
        }
    }
}

/// Contract entity; `customer_number` is unique across contracts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub created_by: UserId,
    pub title: String,
    pub content: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_number: String,
    pub status: ContractStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signer_name: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Whether the signing window has closed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|deadline| now > deadline)
    }
}

/// Contract creation payload; the creator is the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContract {
    pub title: String,
    pub content: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub customer_number: String,
}

impl NewContract {
    pub fn validate(&self) -> Result<(), RentalError> {
        require_text("title", &self.title, 255)?;
        require_text("content", &self.content, usize::MAX)?;
        require_text("customer_name", &self.customer_name, 255)?;
        require_text("customer_email", &self.customer_email, 254)?;
        if !looks_like_email(&self.customer_email) {
            return Err(RentalError::invalid(
                "customer_email",
                "enter a valid email address",
            ));
        }
        if let Some(phone) = &self.customer_phone {
            require_text("customer_phone", phone, 20)?;
        }
        require_text("customer_number", &self.customer_number, 50)
    }

    pub fn into_contract(self, created_by: UserId, now: DateTime<Utc>) -> Contract {
        Contract {
            id: ContractId::new(),
            created_by,
            title: self.title,
            content: self.content,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            customer_number: self.customer_number,
            status: ContractStatus::Draft,
            sent_at: None,
            signed_at: None,
            signer_name: None,
            expiration_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

const fn default_expiration_days() -> i64 {
    7
}

/// Longest signing window a contract can be sent with
pub const MAX_EXPIRATION_DAYS: i64 = 365;

/// Payload for sending a draft out for signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendContract {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_expiration_days")]
    pub expiration_days: i64,
}

impl Default for SendContract {
    fn default() -> Self {
        Self {
            message: None,
            expiration_days: default_expiration_days(),
        }
    }
}

impl SendContract {
    pub fn validate(&self) -> Result<(), RentalError> {
        if !(1..=MAX_EXPIRATION_DAYS).contains(&self.expiration_days) {
            return Err(RentalError::invalid(
                "expiration_days",
                format!("must be between 1 and {}", MAX_EXPIRATION_DAYS),
            ));
        }
        Ok(())
    }

    /// Deadline for a contract sent at `now`.
    pub fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.expiration_days)
    }
}

/// Payload for reminding the customer of a pending signature
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindContract {
    #[serde(default)]
    pub message: Option<String>,
}

/// Customer signature, recorded by the contract's creator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignContract {
    pub signer_name: String,
    pub signature_data: String,
}

impl SignContract {
    pub fn validate(&self) -> Result<(), RentalError> {
        require_text("signer_name", &self.signer_name, 255)?;
        require_text("signature_data", &self.signature_data, usize::MAX)
    }
}

/// Reminder sent for a contract awaiting signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractReminder {
    pub id: ReminderId,
    pub contract_id: ContractId,
    pub sent_by: UserId,
    pub notes: String,
    pub sent_at: DateTime<Utc>,
}

/// Contract as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct ContractView {
    #[serde(flatten)]
    pub contract: Contract,
    pub is_expired: bool,
    pub reminders: Vec<ContractReminder>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lease() -> NewContract {
        serde_json::from_value(serde_json::json!({
            "title": "Summer lease",
            "content": "The tenant agrees to the house rules.",
            "customer_name": "Ada Moreau",
            "customer_email": "ada@example.com",
            "customer_number": "C-1001"
        }))
        .unwrap()
    }

    #[test]
    fn accepts_minimal_payload() {
        let payload = lease();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.customer_phone, None);
    }

    #[test]
    fn rejects_malformed_email() {
        for email in ["ada", "@example.com", "ada@localhost", "ada@.com"] {
            let mut payload = lease();
            payload.customer_email = email.to_string();
            assert_eq!(
                payload.validate().unwrap_err().field(),
                Some("customer_email"),
                "{email}"
            );
        }
    }

    #[test]
    fn rejects_blank_customer_number() {
        let mut payload = lease();
        payload.customer_number = " ".to_string();
        assert_eq!(payload.validate().unwrap_err().field(), Some("customer_number"));
    }

    #[test]
    fn send_defaults_to_a_week() {
        let send: SendContract = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(send.expiration_days, 7);

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(
            send.deadline(now),
            Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn send_window_is_bounded() {
        for days in [0, -3, MAX_EXPIRATION_DAYS + 1] {
            let send = SendContract {
                expiration_days: days,
                ..Default::default()
            };
            assert_eq!(send.validate().unwrap_err().field(), Some("expiration_days"));
        }
    }

    #[test]
    fn expiry_is_strictly_after_the_deadline() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut contract = lease().into_contract(UserId::new(), now);
        assert!(!contract.is_expired_at(now));

        contract.expiration_date = Some(now);
        assert!(!contract.is_expired_at(now));
        assert!(contract.is_expired_at(now + Duration::seconds(1)));
    }

    #[test]
    fn status_names_parse() {
        for status in [
            ContractStatus::Draft,
            ContractStatus::Sent,
            ContractStatus::Signed,
            ContractStatus::Expired,
            ContractStatus::Declined,
        ] {
            assert_eq!(status.as_str().parse::<ContractStatus>().unwrap(), status);
        }
        assert!("void".parse::<ContractStatus>().is_err());
    }
}
