//! Doctor handlers
//!
//! Every operation is scoped to the authenticated account; another account's
//! doctor answers exactly like a missing one.

use super::{double_option, optional_text, parse_record_id, MessageResponse};
use crate::auth::AuthContext;
use crate::error::{AppError, ApiJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use meditrack_core::{require_text, Doctor, DoctorPatch, NewDoctor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Doctor create / update body
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DoctorRequest {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub hospital: Option<String>,
    /// `null` clears the phone number on update
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
}

impl DoctorRequest {
    fn into_new(self) -> Result<NewDoctor, AppError> {
        Ok(NewDoctor {
            name: require_text("name", self.name.as_deref())?,
            specialization: require_text("specialization", self.specialization.as_deref())?,
            hospital: require_text("hospital", self.hospital.as_deref())?,
            phone: optional_text(self.phone.flatten()),
        })
    }

    fn into_patch(self) -> Result<DoctorPatch, AppError> {
        Ok(DoctorPatch {
            name: self
                .name
                .map(|v| require_text("name", Some(&v)))
                .transpose()?,
            specialization: self
                .specialization
                .map(|v| require_text("specialization", Some(&v)))
                .transpose()?,
            hospital: self
                .hospital
                .map(|v| require_text("hospital", Some(&v)))
                .transpose()?,
            phone: self.phone.map(optional_text),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DoctorResponse {
    pub data: Doctor,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DoctorListResponse {
    pub data: Vec<Doctor>,
}

/// List the caller's doctors, ordered by name
#[utoipa::path(
    get,
    path = "/api/doctors",
    tag = "doctors",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Doctors", body = DoctorListResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn list_doctors(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let doctors = state.store.list_doctors(auth.account_id()).await?;
    Ok(Json(DoctorListResponse { data: doctors }))
}

/// Add a doctor
#[utoipa::path(
    post,
    path = "/api/doctors",
    tag = "doctors",
    security(("bearer_auth" = [])),
    request_body = DoctorRequest,
    responses(
        (status = 201, description = "Doctor created", body = DoctorResponse),
        (status = 400, description = "Missing required field", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn create_doctor(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiJson(request): ApiJson<DoctorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let doctor = state
        .store
        .insert_doctor(auth.account_id(), request.into_new()?)
        .await?;

    tracing::debug!(doctor_id = %doctor.id, "Doctor created");
    Ok((StatusCode::CREATED, Json(DoctorResponse { data: doctor })))
}

/// Get one doctor
#[utoipa::path(
    get,
    path = "/api/doctors/{id}",
    tag = "doctors",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Doctor ID")),
    responses(
        (status = 200, description = "Doctor", body = DoctorResponse),
        (status = 404, description = "Doctor not found", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn get_doctor(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_record_id(&id, "Doctor")?;
    let doctor = state
        .store
        .find_doctor(auth.account_id(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Doctor"))?;

    Ok(Json(DoctorResponse { data: doctor }))
}

/// Update a doctor; only fields present in the body change
#[utoipa::path(
    put,
    path = "/api/doctors/{id}",
    tag = "doctors",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Doctor ID")),
    request_body = DoctorRequest,
    responses(
        (status = 200, description = "Updated doctor", body = DoctorResponse),
        (status = 400, description = "Blank required field", body = crate::error::ErrorEnvelope),
        (status = 404, description = "Doctor not found", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn update_doctor(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<DoctorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_record_id(&id, "Doctor")?;
    let patch = request.into_patch()?;
    let doctor = state
        .store
        .update_doctor(auth.account_id(), id, &patch)
        .await?
        .ok_or_else(|| AppError::not_found("Doctor"))?;

    Ok(Json(DoctorResponse { data: doctor }))
}

/// Delete a doctor
///
/// Reports that referenced the doctor are kept and lose the reference.
#[utoipa::path(
    delete,
    path = "/api/doctors/{id}",
    tag = "doctors",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Doctor ID")),
    responses(
        (status = 200, description = "Doctor deleted", body = MessageResponse),
        (status = 404, description = "Doctor not found", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn delete_doctor(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_record_id(&id, "Doctor")?;
    state
        .store
        .delete_doctor(auth.account_id(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Doctor"))?;

    Ok(Json(MessageResponse::new("Doctor deleted successfully")))
}
