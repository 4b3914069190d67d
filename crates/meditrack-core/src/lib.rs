//! MediTrack Core - Domain models, storage traits, and shared types
//!
//! This crate defines the core abstractions used by the MediTrack services:
//! - Accounts, doctors and medical reports
//! - Common error types
//! - Report listing queries (filter, search, sort, pagination)
//! - Storage traits with PostgreSQL and in-memory implementations
//! - Configuration management
//! - Local-disk storage for report files

pub mod config;
pub mod query;
pub mod store;
pub mod uploads;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, Environment, LoggingConfig, PasswordConfig,
    ServerConfig, UploadConfig,
};
pub use query::{PageRequest, Pagination, ReportFilter, ReportPage, ReportQuery, SortOrder};
pub use store::{AccountStore, DoctorStore, MemoryStore, PgStore, ReportStore, Store};
pub use uploads::{UploadError, UploadStore};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for MediTrack operations
#[derive(Error, Debug)]
pub enum MediTrackError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MediTrackError>;

/// Normalize an email into its uniqueness key: trimmed and lowercased.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(MediTrackError::Validation("Email is required".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(MediTrackError::Validation("Invalid email format".to_string())),
    }
}

/// Return the trimmed value, or a validation error naming `field` when blank.
pub fn require_text(field: &str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(MediTrackError::Validation(format!("{field} is required"))),
    }
}

/// Trim an optional text value; blank becomes `None`
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Accounts
// ============================================================================

/// Gender recorded on a health profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = MediTrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            other => Err(MediTrackError::Validation(format!(
                "Invalid gender '{other}': expected Male, Female or Other"
            ))),
        }
    }
}

/// Optional health fields filled in after signup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthProfile {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub blood_group: Option<String>,
    /// Height in centimetres
    pub height: Option<f64>,
    /// Weight in kilograms
    pub weight: Option<f64>,
}

/// Stored account record.
///
/// Deliberately not `Serialize`: the password hash must never reach a response.
/// Use [`Account::profile`] for anything leaving the process.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub health: HealthProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Public projection of the account
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            health: self.health.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Account as returned by the API (no password hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub health: HealthProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account about to be inserted. The email must already be normalized and the
/// password already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: Option<String>,
}

/// Partial account update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    /// `Some(None)` clears the last name
    pub last_name: Option<Option<String>>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    /// `Some(None)` clears the blood group
    pub blood_group: Option<Option<String>>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password_hash.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.date_of_birth.is_none()
            && self.gender.is_none()
            && self.blood_group.is_none()
            && self.height.is_none()
            && self.weight.is_none()
    }

    /// Apply the patch to an in-memory record
    pub fn apply(&self, account: &mut Account) {
        if let Some(email) = &self.email {
            account.email = email.clone();
        }
        if let Some(hash) = &self.password_hash {
            account.password_hash = hash.clone();
        }
        if let Some(first_name) = &self.first_name {
            account.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            account.last_name = last_name.clone();
        }
        if let Some(dob) = self.date_of_birth {
            account.health.date_of_birth = Some(dob);
        }
        if let Some(gender) = self.gender {
            account.health.gender = Some(gender);
        }
        if let Some(blood_group) = &self.blood_group {
            account.health.blood_group = blood_group.clone();
        }
        if let Some(height) = self.height {
            account.health.height = Some(height);
        }
        if let Some(weight) = self.weight {
            account.health.weight = Some(weight);
        }
    }
}

// ============================================================================
// Doctors
// ============================================================================

/// A doctor in a user's personal address book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    /// Owning account
    #[serde(rename = "user")]
    pub owner_id: Uuid,
    pub name: String,
    pub specialization: String,
    pub hospital: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Doctor {
    pub fn summary(&self) -> DoctorSummary {
        DoctorSummary {
            id: self.id,
            name: self.name.clone(),
            specialization: self.specialization.clone(),
            hospital: self.hospital.clone(),
        }
    }
}

/// Doctor fields embedded into a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DoctorSummary {
    pub id: Uuid,
    pub name: String,
    pub specialization: String,
    pub hospital: String,
}

/// Validated doctor ready to be stored
#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub name: String,
    pub specialization: String,
    pub hospital: String,
    pub phone: Option<String>,
}

/// Partial doctor update. `phone: Some(None)` clears the phone number.
#[derive(Debug, Clone, Default)]
pub struct DoctorPatch {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub hospital: Option<String>,
    pub phone: Option<Option<String>>,
}

impl DoctorPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.specialization.is_none()
            && self.hospital.is_none()
            && self.phone.is_none()
    }

    pub fn apply(&self, doctor: &mut Doctor) {
        if let Some(name) = &self.name {
            doctor.name = name.clone();
        }
        if let Some(specialization) = &self.specialization {
            doctor.specialization = specialization.clone();
        }
        if let Some(hospital) = &self.hospital {
            doctor.hospital = hospital.clone();
        }
        if let Some(phone) = &self.phone {
            doctor.phone = phone.clone();
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Report category (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum ReportCategory {
    Lab,
    Prescription,
}

impl ReportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Lab => "Lab",
            ReportCategory::Prescription => "Prescription",
        }
    }
}

impl std::fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportCategory {
    type Err = MediTrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Lab" => Ok(ReportCategory::Lab),
            "Prescription" => Ok(ReportCategory::Prescription),
            other => Err(MediTrackError::Validation(format!(
                "Invalid category '{other}': expected Lab or Prescription"
            ))),
        }
    }
}

/// Parse a report date given as RFC 3339 or as a plain `YYYY-MM-DD` date
/// (interpreted as midnight UTC).
pub fn parse_report_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| MediTrackError::Validation(format!("Invalid reportDate '{raw}'")))
}

/// Stored report record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: ReportCategory,
    pub report_date: DateTime<Utc>,
    pub file_url: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Report with its doctor reference expanded for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportDetails {
    #[serde(flatten)]
    pub report: Report,
    pub doctor: Option<DoctorSummary>,
}

/// Validated report ready to be stored
#[derive(Debug, Clone)]
pub struct NewReport {
    pub title: String,
    pub description: Option<String>,
    pub category: ReportCategory,
    pub report_date: DateTime<Utc>,
    pub file_url: Option<String>,
    pub doctor_id: Option<Uuid>,
}

/// Partial report update. Double options clear the field with `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<ReportCategory>,
    pub report_date: Option<DateTime<Utc>>,
    pub file_url: Option<Option<String>>,
    pub doctor_id: Option<Option<Uuid>>,
}

impl ReportPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.report_date.is_none()
            && self.file_url.is_none()
            && self.doctor_id.is_none()
    }

    pub fn apply(&self, report: &mut Report) {
        if let Some(title) = &self.title {
            report.title = title.clone();
        }
        if let Some(description) = &self.description {
            report.description = description.clone();
        }
        if let Some(category) = self.category {
            report.category = category;
        }
        if let Some(date) = self.report_date {
            report.report_date = date;
        }
        if let Some(file_url) = &self.file_url {
            report.file_url = file_url.clone();
        }
        if let Some(doctor_id) = self.doctor_id {
            report.doctor_id = doctor_id;
        }
    }
}
