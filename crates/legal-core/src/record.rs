//! # Legalization Records
//!
//! The record data model: descriptive fields of a legalization, the
//! visibility gate, and the public projection served to unauthenticated
//! callers who scan a QR code.
//!
//! A record's [`Identifier`] is assigned once and never changes. Its
//! `encoded_url` is a snapshot taken at creation; [`Record::current_url`]
//! recomputes it from the configured base URL.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identifier::Identifier;
use crate::verification::{encode_verification_url, BaseUrl};

const MAX_LEGALIZATION_NO: usize = 50;
const MAX_PLACE_OF_ISSUE: usize = 100;
const MAX_TEXT_FIELD: usize = 200;

/// Auto-increment row id of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row id of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a record is publicly resolvable.
///
/// `Active` is the initial state. `Inactive` is reached only through an
/// authorized update; nothing expires automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityStatus {
    /// Resolvable by public lookup.
    #[default]
    Active,
    /// Hidden from public lookup; still visible to authenticated callers.
    Inactive,
}

impl VisibilityStatus {
    /// Lowercase storage/wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// True if the record may be shown to unauthenticated callers.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for VisibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisibilityStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

/// Descriptive fields of a legalization record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    /// Legalization number as printed on the sticker.
    pub legalization_no: String,
    /// Date the legalization was issued.
    pub issue_date: NaiveDate,
    /// Free-text place of issue.
    #[serde(default)]
    pub place_of_issue: Option<String>,
    /// Kind of legalization performed.
    pub legalization_type: String,
    /// Officer who signed the legalization.
    pub authorized_officer: String,
    /// Person the legalized document belongs to.
    pub document_owner: String,
    /// Kind of document legalized.
    pub document_type: String,
}

impl RecordFields {
    /// Check required fields are non-blank and all fields fit their caps.
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("legalization_no", &self.legalization_no, MAX_LEGALIZATION_NO)?;
        required("legalization_type", &self.legalization_type, MAX_TEXT_FIELD)?;
        required("authorized_officer", &self.authorized_officer, MAX_TEXT_FIELD)?;
        required("document_owner", &self.document_owner, MAX_TEXT_FIELD)?;
        required("document_type", &self.document_type, MAX_TEXT_FIELD)?;
        if let Some(place) = &self.place_of_issue {
            capped("place_of_issue", place, MAX_PLACE_OF_ISSUE)?;
        }
        Ok(())
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    capped(field, value, max)
}

fn capped(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::FieldTooLong { field, max });
    }
    Ok(())
}

/// Partial update of a record. `None` leaves a field unchanged.
///
/// `place_of_issue: Some("")` clears the place of issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFieldsPatch {
    /// New legalization number.
    #[serde(default)]
    pub legalization_no: Option<String>,
    /// New issue date.
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    /// New place of issue.
    #[serde(default)]
    pub place_of_issue: Option<String>,
    /// New legalization type.
    #[serde(default)]
    pub legalization_type: Option<String>,
    /// New authorized officer.
    #[serde(default)]
    pub authorized_officer: Option<String>,
    /// New document owner.
    #[serde(default)]
    pub document_owner: Option<String>,
    /// New document type.
    #[serde(default)]
    pub document_type: Option<String>,
    /// New visibility status.
    #[serde(default)]
    pub status: Option<VisibilityStatus>,
}

impl RecordFieldsPatch {
    /// True if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check every field the patch sets, each on its own.
    ///
    /// Unset fields are not looked at, so a patch that passes here keeps an
    /// already valid [`RecordFields`] valid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required_fields = [
            ("legalization_no", &self.legalization_no, MAX_LEGALIZATION_NO),
            ("legalization_type", &self.legalization_type, MAX_TEXT_FIELD),
            ("authorized_officer", &self.authorized_officer, MAX_TEXT_FIELD),
            ("document_owner", &self.document_owner, MAX_TEXT_FIELD),
            ("document_type", &self.document_type, MAX_TEXT_FIELD),
        ];
        for (field, value, max) in required_fields {
            if let Some(value) = value {
                required(field, value, max)?;
            }
        }
        if let Some(place) = &self.place_of_issue {
            capped("place_of_issue", place, MAX_PLACE_OF_ISSUE)?;
        }
        Ok(())
    }

    /// The place-of-issue change: `None` keeps it, `Some(None)` clears it.
    pub fn place_of_issue_change(&self) -> Option<Option<&str>> {
        self.place_of_issue
            .as_deref()
            .map(|v| if v.trim().is_empty() { None } else { Some(v) })
    }

    /// Overwrite the fields the patch sets. Does not validate.
    pub fn merge_into(&self, fields: &mut RecordFields) {
        if let Some(v) = &self.legalization_no {
            fields.legalization_no = v.clone();
        }
        if let Some(v) = self.issue_date {
            fields.issue_date = v;
        }
        if let Some(place) = self.place_of_issue_change() {
            fields.place_of_issue = place.map(str::to_string);
        }
        if let Some(v) = &self.legalization_type {
            fields.legalization_type = v.clone();
        }
        if let Some(v) = &self.authorized_officer {
            fields.authorized_officer = v.clone();
        }
        if let Some(v) = &self.document_owner {
            fields.document_owner = v.clone();
        }
        if let Some(v) = &self.document_type {
            fields.document_type = v.clone();
        }
    }

    /// Apply the field changes onto `fields`, then validate the result.
    ///
    /// On error `fields` is left untouched. The status component is not
    /// applied here; callers handle it alongside the row.
    pub fn apply_to(&self, fields: &mut RecordFields) -> Result<(), ValidationError> {
        let mut next = fields.clone();
        self.merge_into(&mut next);
        next.validate()?;
        *fields = next;
        Ok(())
    }
}

/// A stored legalization record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Row id.
    pub id: RecordId,
    /// Public identifier embedded in the QR code.
    pub identifier: Identifier,
    /// Verification URL as computed at creation time.
    pub encoded_url: String,
    /// Descriptive fields.
    #[serde(flatten)]
    pub fields: RecordFields,
    /// Visibility status.
    pub status: VisibilityStatus,
    /// Creating user, if still known.
    pub created_by: Option<UserId>,
    /// Creating user's username, if joined in by the store.
    pub created_by_name: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Verification URL recomputed from the given base URL.
    pub fn current_url(&self, base_url: &BaseUrl) -> String {
        encode_verification_url(&self.identifier, base_url)
    }

    /// True if the stored snapshot differs from the URL under `base_url`.
    pub fn url_drifted(&self, base_url: &BaseUrl) -> bool {
        self.encoded_url != self.current_url(base_url)
    }

    /// Project into the public view, or `None` if the record is not public.
    pub fn to_public(&self) -> Option<PublicRecord> {
        if !self.status.is_public() {
            return None;
        }
        Some(PublicRecord {
            identifier: self.identifier.clone(),
            fields: self.fields.clone(),
            status: self.status,
            created_at: self.created_at,
        })
    }
}

/// Read-only projection of an active record for public display.
///
/// Only constructible through [`Record::to_public`], which refuses
/// inactive records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicRecord {
    identifier: Identifier,
    #[serde(flatten)]
    fields: RecordFields,
    status: VisibilityStatus,
    created_at: DateTime<Utc>,
}

impl PublicRecord {
    /// Public identifier.
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Descriptive fields.
    pub fn fields(&self) -> &RecordFields {
        &self.fields
    }

    /// Visibility status; always [`VisibilityStatus::Active`].
    pub fn status(&self) -> VisibilityStatus {
        self.status
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
