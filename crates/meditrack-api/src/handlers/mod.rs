//! API handlers

pub mod auth;
pub mod doctors;
pub mod health;
pub mod profile;
pub mod reports;

use crate::error::AppError;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Plain `{message}` response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a record id from the path. Anything that is not a UUID cannot name a
/// record, so it is reported as not found.
pub(crate) fn parse_record_id(raw: &str, resource: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found(resource))
}

/// Deserialize a field that distinguishes "absent" (`None`) from an explicit
/// JSON `null` (`Some(None)`). Use with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) use meditrack_core::optional_text;
