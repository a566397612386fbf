//! Regulatory documents and their delivery to users

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownVariant;
use super::property::require_text;
use crate::base::{PropertyId, RecipientId, RegulationId, UserId};
use crate::error::RentalError;

/// Kind of rules a regulation carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Building,
    Community,
    #[default]
    HouseRules,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Building => "building",
            DocumentType::Community => "community",
            DocumentType::HouseRules => "house_rules",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "building" => Ok(DocumentType::Building),
            "community" => Ok(DocumentType::Community),
            "house_rules" => Ok(DocumentType::HouseRules),
            "other" => Ok(DocumentType::Other),
            other => Err(UnknownVariant {
                kind: "document type",
                value: other.to_string(),
            }),
        }
    }
}

/// Publication state of a regulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegulationStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl RegulationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegulationStatus::Draft => "draft",
            RegulationStatus::Published => "published",
            RegulationStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for RegulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegulationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RegulationStatus::Draft),
            "published" => Ok(RegulationStatus::Published),
            "archived" => Ok(RegulationStatus::Archived),
            other => Err(UnknownVariant {
                kind: "regulation status",
                value: other.to_string(),
            }),
        }
    }
}

/// Regulation entity.
///
/// The document itself is carried as text in `body`; `document_name` is
/// metadata only, no file is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regulation {
    pub id: RegulationId,
    pub created_by: UserId,
    pub property_id: Option<PropertyId>,
    pub title: String,
    pub description: String,
    pub body: String,
    pub document_name: Option<String>,
    pub document_type: DocumentType,
    pub status: RegulationStatus,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Regulation {
    pub fn validate_dates(&self) -> Result<(), RentalError> {
        validate_dates(self.effective_date, self.expiration_date)
    }
}

fn validate_dates(effective: NaiveDate, expiration: Option<NaiveDate>) -> Result<(), RentalError> {
    if expiration.is_some_and(|end| end < effective) {
        return Err(RentalError::invalid(
            "expiration_date",
            "expiration date must be after effective date",
        ));
    }
    Ok(())
}

/// Regulation creation payload; `effective_date` defaults to today
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRegulation {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub document_type: DocumentType,
    #[serde(default)]
    pub status: RegulationStatus,
    #[serde(default)]
    pub property_id: Option<PropertyId>,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

impl NewRegulation {
    pub fn validate(&self, today: NaiveDate) -> Result<(), RentalError> {
        require_text("title", &self.title, 255)?;
        if let Some(name) = &self.document_name {
            require_text("document_name", name, 255)?;
        }
        validate_dates(self.effective_date.unwrap_or(today), self.expiration_date)
    }

    pub fn into_regulation(self, created_by: UserId, now: DateTime<Utc>) -> Regulation {
        Regulation {
            id: RegulationId::new(),
            created_by,
            property_id: self.property_id,
            title: self.title,
            description: self.description,
            body: self.body,
            document_name: self.document_name,
            document_type: self.document_type,
            status: self.status,
            effective_date: self.effective_date.unwrap_or_else(|| now.date_naive()),
            expiration_date: self.expiration_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Regulation update payload; the attached property cannot change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegulationUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub document_name: Option<String>,
    pub document_type: Option<DocumentType>,
    pub status: Option<RegulationStatus>,
    pub effective_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
}

impl RegulationUpdate {
    /// Applies the present fields onto `regulation`, then checks the result.
    pub fn apply(
        &self,
        regulation: &mut Regulation,
        now: DateTime<Utc>,
    ) -> Result<(), RentalError> {
        if let Some(title) = &self.title {
            require_text("title", title, 255)?;
            regulation.title = title.clone();
        }
        if let Some(description) = &self.description {
            regulation.description = description.clone();
        }
        if let Some(body) = &self.body {
            regulation.body = body.clone();
        }
        if let Some(name) = &self.document_name {
            require_text("document_name", name, 255)?;
            regulation.document_name = Some(name.clone());
        }
        if let Some(document_type) = self.document_type {
            regulation.document_type = document_type;
        }
        if let Some(status) = self.status {
            regulation.status = status;
        }
        if let Some(effective) = self.effective_date {
            regulation.effective_date = effective;
        }
        if self.expiration_date.is_some() {
            regulation.expiration_date = self.expiration_date;
        }
        regulation.validate_dates()?;
        regulation.updated_at = now;
        Ok(())
    }
}

/// Listing filter; every present field must match
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegulationFilter {
    pub property_id: Option<PropertyId>,
    pub document_type: Option<DocumentType>,
    pub status: Option<RegulationStatus>,
}

impl RegulationFilter {
    pub fn matches(&self, regulation: &Regulation) -> bool {
        self.property_id.is_none_or(|id| regulation.property_id == Some(id))
            && self
                .document_type
                .is_none_or(|kind| regulation.document_type == kind)
            && self.status.is_none_or(|status| regulation.status == status)
    }
}

/// Payload for delivering a regulation to users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRegulation {
    pub user_ids: Vec<UserId>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SendRegulation {
    pub fn validate(&self) -> Result<(), RentalError> {
        if self.user_ids.is_empty() {
            return Err(RentalError::invalid(
                "user_ids",
                "at least one recipient is required",
            ));
        }
        Ok(())
    }

    /// Recipients in request order with repeats dropped.
    pub fn distinct_users(&self) -> Vec<UserId> {
        let mut seen = std::collections::HashSet::new();
        self.user_ids
            .iter()
            .copied()
            .filter(|user| seen.insert(*user))
            .collect()
    }
}

/// One user's copy of a regulation; (regulation_id, user_id) is unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationRecipient {
    pub id: RecipientId,
    pub regulation_id: RegulationId,
    pub user_id: UserId,
    pub sent_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl RegulationRecipient {
    pub fn new(regulation_id: RegulationId, user_id: UserId, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: RecipientId::new(),
            regulation_id,
            user_id,
            sent_at,
            viewed_at: None,
            acknowledged: false,
            acknowledged_at: None,
        }
    }

    /// Records the first view; later views keep the original timestamp.
    /// Returns whether anything changed.
    pub fn mark_viewed(&mut self, now: DateTime<Utc>) -> bool {
        if self.viewed_at.is_some() {
            return false;
        }
        self.viewed_at = Some(now);
        true
    }

    /// Acknowledging also counts as viewing. Returns whether anything changed.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) -> bool {
        if self.acknowledged {
            return false;
        }
        self.mark_viewed(now);
        self.acknowledged = true;
        self.acknowledged_at = Some(now);
        true
    }
}
