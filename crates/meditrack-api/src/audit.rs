//! Security audit logging
//!
//! Account and authentication events are emitted at INFO level on the `audit`
//! target, so they can be filtered and shipped separately from request logs
//! (`RUST_LOG=audit=info`). Events never carry passwords or token contents.

use axum::http::{header, HeaderMap};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Client information taken from request headers
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    SignupSuccess {
        account_id: Uuid,
        email: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    SignupRejected {
        email: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    LoginSuccess {
        account_id: Uuid,
        email: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Unknown email and wrong password are both recorded here; the reason is
    /// for the log only and never reaches the client.
    LoginFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    InvalidToken {
        #[serde(flatten)]
        client: ClientInfo,
    },

    ProfileUpdated {
        account_id: Uuid,
        fields: Vec<String>,
    },
}

/// Emit an audit event with structured fields
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::SignupSuccess {
            account_id, email, ..
        } => {
            info!(
                target: "audit",
                event = %event_json,
                account_id = %account_id,
                email = %email,
                "Account created"
            );
        }
        AuditEvent::SignupRejected { email, reason, .. } => {
            info!(
                target: "audit",
                event = %event_json,
                email = %email,
                reason = %reason,
                "Signup rejected"
            );
        }
        AuditEvent::LoginSuccess {
            account_id, email, ..
        } => {
            info!(
                target: "audit",
                event = %event_json,
                account_id = %account_id,
                email = %email,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure { email, reason, .. } => {
            warn!(
                target: "audit",
                event = %event_json,
                email = %email,
                reason = %reason,
                "Login failed"
            );
        }
        AuditEvent::InvalidToken { client } => {
            warn!(
                target: "audit",
                event = %event_json,
                ip_address = ?client.ip_address,
                "Invalid bearer token"
            );
        }
        AuditEvent::ProfileUpdated { account_id, fields } => {
            info!(
                target: "audit",
                event = %event_json,
                account_id = %account_id,
                fields = ?fields,
                "Profile updated"
            );
        }
    }
}

/// Client IP from proxy headers (`X-Forwarded-For`, then `X-Real-IP`)
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(str::to_string)
}
