//! Authentication service layer
//!
//! Account creation, credential checks and profile updates. Passwords are
//! hashed here, explicitly, on signup and on password change; the store only
//! ever sees hashes.

use super::password::{hash_password, validate_password_strength, verify_password};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use chrono::NaiveDate;
use meditrack_core::{
    normalize_email, optional_text, require_text, Account, AccountPatch, AccountProfile, Gender,
    NewAccount, PasswordConfig, Store,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use utoipa::ToSchema;
use uuid::Uuid;

/// Signup request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Partial profile update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    /// `Male`, `Female` or `Other`
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    /// Centimetres
    pub height: Option<f64>,
    /// Kilograms
    pub weight: Option<f64>,
    pub password: Option<String>,
}

/// Signup / login response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: String,
    pub data: AccountProfile,
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

/// Password hashed once per process and checked when a login names no
/// account, so unknown emails cost the same Argon2 work as wrong passwords.
const DUMMY_PASSWORD: &str = "meditrack-unknown-account";

/// Authentication service
pub struct AuthService {
    store: Arc<dyn Store>,
    password: PasswordConfig,
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, password: PasswordConfig) -> Self {
        Self {
            store,
            password,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Create an account after normalizing the email and hashing the password.
    ///
    /// Fails with `Duplicate` if the normalized email is taken.
    pub async fn create_account(
        &self,
        email: &str,
        first_name: &str,
        last_name: Option<&str>,
        password: &str,
    ) -> Result<Account, AppError> {
        let email = normalize_email(email)?;
        let first_name = require_text("firstName", Some(first_name))?;
        validate_password_strength(password).map_err(AppError::Validation)?;

        if self.store.find_account_by_email(&email).await?.is_some() {
            return Err(AppError::Duplicate(
                "An account with this email already exists".to_string(),
            ));
        }

        let password_hash = self.hash(password.to_string()).await?;
        let last_name = last_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        // A concurrent signup that slipped past the check above still fails
        // here on the unique email constraint.
        let account = self
            .store
            .insert_account(NewAccount {
                email,
                password_hash,
                first_name,
                last_name,
            })
            .await?;

        Ok(account)
    }

    /// Check an email / password pair. Every failure is the same 401.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<Account, AppError> {
        let account = match normalize_email(email) {
            Ok(email) => self.store.find_account_by_email(&email).await?,
            Err(_) => None,
        };

        let Some(account) = account else {
            let dummy = self.dummy_hash().await?;
            self.verify(password.to_string(), dummy).await?;
            return Err(AppError::unauthenticated());
        };

        if self.verify(password.to_string(), account.password_hash.clone()).await? {
            Ok(account)
        } else {
            Err(AppError::unauthenticated())
        }
    }

    /// Signup with audit logging
    pub async fn signup(&self, request: SignupRequest, client: ClientInfo) -> Result<Account, AppError> {
        let email = request.email.clone().unwrap_or_default();
        let result: Result<Account, AppError> = async {
            let email = require_text("email", request.email.as_deref())?;
            let first_name = require_text("firstName", request.first_name.as_deref())?;
            let password = request
                .password
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| AppError::Validation("password is required".to_string()))?;

            self.create_account(&email, &first_name, request.last_name.as_deref(), password)
                .await
        }
        .await;

        match &result {
            Ok(account) => audit_log(&AuditEvent::SignupSuccess {
                account_id: account.id,
                email: account.email.clone(),
                client,
            }),
            Err(e) => audit_log(&AuditEvent::SignupRejected {
                email,
                reason: format!("{e:?}"),
                client,
            }),
        }
        result
    }

    /// Login with audit logging
    pub async fn login(&self, request: LoginRequest, client: ClientInfo) -> Result<Account, AppError> {
        let email = require_text("email", request.email.as_deref())?;
        let password = request
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::Validation("password is required".to_string()))?;

        match self.verify_credentials(&email, &password).await {
            Ok(account) => {
                audit_log(&AuditEvent::LoginSuccess {
                    account_id: account.id,
                    email: account.email.clone(),
                    client,
                });
                Ok(account)
            }
            Err(e) => {
                audit_log(&AuditEvent::LoginFailure {
                    email,
                    reason: format!("{e:?}"),
                    client,
                });
                Err(e)
            }
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Account, AppError> {
        self.store
            .find_account_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Account"))
    }

    /// Apply a partial profile update
    pub async fn update_profile(
        &self,
        id: Uuid,
        request: ProfileUpdateRequest,
    ) -> Result<Account, AppError> {
        let mut patch = AccountPatch::default();
        let mut fields = Vec::new();

        if let Some(first_name) = request.first_name.as_deref() {
            patch.first_name = Some(require_text("firstName", Some(first_name))?);
            fields.push("firstName");
        }
        if let Some(last_name) = request.last_name {
            patch.last_name = Some(optional_text(Some(last_name)));
            fields.push("lastName");
        }
        if let Some(email) = request.email.as_deref() {
            let email = normalize_email(email)?;
            if let Some(existing) = self.store.find_account_by_email(&email).await? {
                if existing.id != id {
                    return Err(AppError::Duplicate(
                        "An account with this email already exists".to_string(),
                    ));
                }
            }
            patch.email = Some(email);
            fields.push("email");
        }
        if let Some(dob) = request.date_of_birth.as_deref() {
            let dob = NaiveDate::parse_from_str(dob.trim(), "%Y-%m-%d").map_err(|_| {
                AppError::Validation(format!("Invalid dateOfBirth '{dob}': expected YYYY-MM-DD"))
            })?;
            patch.date_of_birth = Some(dob);
            fields.push("dateOfBirth");
        }
        if let Some(gender) = request.gender.as_deref() {
            patch.gender = Some(gender.trim().parse::<Gender>()?);
            fields.push("gender");
        }
        if let Some(blood_group) = request.blood_group {
            patch.blood_group = Some(optional_text(Some(blood_group)));
            fields.push("bloodGroup");
        }
        if let Some(height) = request.height {
            patch.height = Some(positive("height", height)?);
            fields.push("height");
        }
        if let Some(weight) = request.weight {
            patch.weight = Some(positive("weight", weight)?);
            fields.push("weight");
        }
        if let Some(password) = request.password {
            validate_password_strength(&password).map_err(AppError::Validation)?;
            patch.password_hash = Some(self.hash(password).await?);
            fields.push("password");
        }

        let account = self
            .store
            .update_account(id, &patch)
            .await?
            .ok_or_else(|| AppError::not_found("Account"))?;

        if !fields.is_empty() {
            audit_log(&AuditEvent::ProfileUpdated {
                account_id: id,
                fields: fields.into_iter().map(str::to_string).collect(),
            });
        }
        Ok(account)
    }

    async fn hash(&self, password: String) -> Result<String, AppError> {
        let config = self.password.clone();
        tokio::task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn dummy_hash(&self) -> Result<String, AppError> {
        self.dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD.to_string()))
            .await
            .cloned()
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, AppError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }
}

fn positive(field: &str, value: f64) -> Result<f64, AppError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(AppError::Validation(format!("{field} must be a positive number")))
    }
}
