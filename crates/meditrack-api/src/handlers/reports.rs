//! Report handlers
//!
//! Reports are scoped to the authenticated account. Create and update accept
//! either a JSON body or `multipart/form-data` carrying the same fields plus an
//! optional file part named `image` or `file`.

use super::{double_option, optional_text, parse_record_id, MessageResponse};
use crate::auth::AuthContext;
use crate::error::{AppError, ApiJson};
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{rejection::QueryRejection, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use meditrack_core::{
    parse_report_date, require_text, NewReport, ReportCategory, ReportDetails, ReportPatch,
    ReportQuery,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Report create / update fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    /// `Lab` or `Prescription`
    pub category: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`
    pub report_date: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub file_url: Option<Option<String>>,
    /// Doctor ID; `null` removes the reference on update
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub doctor: Option<Option<String>>,
}

/// A file part received with a report
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Report body, from JSON or multipart
#[derive(Debug)]
pub struct ReportForm {
    pub fields: ReportRequest,
    pub file: Option<UploadedFile>,
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
}

#[async_trait]
impl<S> FromRequest<S> for ReportForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&request) {
            let ApiJson(fields) = ApiJson::<ReportRequest>::from_request(request, state).await?;
            return Ok(Self { fields, file: None });
        }

        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;

        let mut fields = ReportRequest::default();
        let mut file = None;
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" | "file" => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    // Browsers send an empty part when no file was picked.
                    if !bytes.is_empty() {
                        file = Some(UploadedFile {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        });
                    }
                }
                "title" => fields.title = Some(field.text().await?),
                "description" => fields.description = Some(Some(field.text().await?)),
                "category" => fields.category = Some(field.text().await?),
                "reportDate" => fields.report_date = Some(field.text().await?),
                "fileUrl" => fields.file_url = Some(Some(field.text().await?)),
                "doctor" => fields.doctor = Some(Some(field.text().await?)),
                _ => {}
            }
        }

        Ok(Self { fields, file })
    }
}

/// Report listing query parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportListParams {
    /// `Lab` or `Prescription`
    pub category: Option<String>,
    /// Doctor ID
    pub doctor: Option<String>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
    /// `date`, `-date`, or a field (`title`, `category`, `reportDate`,
    /// `createdAt`) with an optional leading `-`
    pub sort: Option<String>,
    /// Page number, from 1
    pub page: Option<String>,
    /// Page size, 1 to 100
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReportResponse {
    pub data: ReportDetails,
}

/// Resolve a doctor reference, which must name one of the caller's doctors
async fn owned_doctor(state: &AppState, owner_id: Uuid, raw: &str) -> Result<Uuid, AppError> {
    let id = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("Invalid doctor id '{raw}'")))?;

    match state.store.find_doctor(owner_id, id).await? {
        Some(_) => Ok(id),
        None => Err(AppError::Validation(
            "doctor must reference one of your doctors".to_string(),
        )),
    }
}

/// Doctor reference change from a request field
async fn doctor_change(
    state: &AppState,
    owner_id: Uuid,
    doctor: Option<Option<String>>,
) -> Result<Option<Option<Uuid>>, AppError> {
    match doctor.map(optional_text) {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(raw)) => Ok(Some(Some(owned_doctor(state, owner_id, &raw).await?))),
    }
}

async fn store_file(state: &AppState, file: Option<UploadedFile>) -> Result<Option<String>, AppError> {
    let Some(file) = file else {
        return Ok(None);
    };
    let url = state
        .uploads
        .save(
            file.file_name.as_deref(),
            file.content_type.as_deref(),
            &file.bytes,
        )
        .await?;
    Ok(Some(url))
}

/// Best-effort removal of a stored file; failures are logged, not returned
async fn discard_file(state: &AppState, url: &str) {
    if let Err(e) = state.uploads.remove(url).await {
        tracing::warn!(file = %url, error = %e, "Failed to remove uploaded file");
    }
}

/// A typed `fileUrl` may only point into upload storage when it is the
/// report's current file; other stored files belong to other reports.
fn check_file_url(state: &AppState, url: &str, current: Option<&str>) -> Result<(), AppError> {
    if state.uploads.is_stored(url) && current != Some(url) {
        return Err(AppError::Validation(
            "fileUrl cannot reference another uploaded file; upload the file instead".to_string(),
        ));
    }
    Ok(())
}

/// List the caller's reports
#[utoipa::path(
    get,
    path = "/api/reports",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(ReportListParams),
    responses(
        (status = 200, description = "One page of reports", body = meditrack_core::ReportPage),
        (status = 400, description = "Invalid filter, sort or paging value", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    params: Result<Query<ReportListParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params?;
    let query = ReportQuery::from_params(
        params.category.as_deref(),
        params.doctor.as_deref(),
        params.search.as_deref(),
        params.sort.as_deref(),
        params.page.as_deref(),
        params.limit.as_deref(),
    )?;

    let page = state.store.list_reports(auth.account_id(), &query).await?;
    Ok(Json(page))
}

/// Create a report
///
/// Accepts JSON, or multipart form data with an optional `image` / `file`
/// part. A stored file's URL replaces any `fileUrl` field.
#[utoipa::path(
    post,
    path = "/api/reports",
    tag = "reports",
    security(("bearer_auth" = [])),
    request_body(content = ReportRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Report created", body = ReportResponse),
        (status = 400, description = "Missing or invalid field", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    form: ReportForm,
) -> Result<impl IntoResponse, AppError> {
    let owner_id = auth.account_id();
    let ReportForm { fields, file } = form;

    let title = require_text("title", fields.title.as_deref())?;
    let category: ReportCategory = require_text("category", fields.category.as_deref())?.parse()?;
    let report_date = parse_report_date(&require_text("reportDate", fields.report_date.as_deref())?)?;
    let doctor_id = doctor_change(&state, owner_id, fields.doctor).await?.flatten();

    let typed_url = optional_text(fields.file_url.flatten());
    if let Some(url) = &typed_url {
        check_file_url(&state, url, None)?;
    }

    let stored = store_file(&state, file).await?;
    let inserted = state
        .store
        .insert_report(
            owner_id,
            NewReport {
                title,
                description: optional_text(fields.description.flatten()),
                category,
                report_date,
                file_url: stored.clone().or(typed_url),
                doctor_id,
            },
        )
        .await;

    let report = match inserted {
        Ok(report) => report,
        Err(e) => {
            if let Some(url) = &stored {
                discard_file(&state, url).await;
            }
            return Err(e.into());
        }
    };

    tracing::debug!(report_id = %report.report.id, "Report created");
    Ok((StatusCode::CREATED, Json(ReportResponse { data: report })))
}

/// Get one report with its doctor expanded
#[utoipa::path(
    get,
    path = "/api/reports/{id}",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report", body = ReportResponse),
        (status = 404, description = "Report not found", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_record_id(&id, "Report")?;
    let report = state
        .store
        .find_report(auth.account_id(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Report"))?;

    Ok(Json(ReportResponse { data: report }))
}

/// Update a report; only fields present in the body change
///
/// Replacing or clearing `fileUrl` deletes the previously uploaded file.
#[utoipa::path(
    put,
    path = "/api/reports/{id}",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Report ID")),
    request_body(content = ReportRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Updated report", body = ReportResponse),
        (status = 400, description = "Invalid field", body = crate::error::ErrorEnvelope),
        (status = 404, description = "Report not found", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn update_report(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<String>,
    form: ReportForm,
) -> Result<impl IntoResponse, AppError> {
    let owner_id = auth.account_id();
    let id = parse_record_id(&id, "Report")?;
    let ReportForm { fields, file } = form;

    // Another account's report must look missing before any field, doctor or
    // file handling can reveal anything about it.
    let current = state
        .store
        .find_report(owner_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Report"))?;
    let current_url = current.report.file_url;

    let mut patch = ReportPatch {
        title: fields
            .title
            .map(|v| require_text("title", Some(&v)))
            .transpose()?,
        description: fields.description.map(optional_text),
        category: fields
            .category
            .map(|v| v.parse::<ReportCategory>())
            .transpose()?,
        report_date: fields
            .report_date
            .map(|v| parse_report_date(&v))
            .transpose()?,
        file_url: fields.file_url.map(optional_text),
        doctor_id: None,
    };

    if let Some(Some(url)) = &patch.file_url {
        check_file_url(&state, url, current_url.as_deref())?;
    }

    patch.doctor_id = doctor_change(&state, owner_id, fields.doctor).await?;
    let stored = store_file(&state, file).await?;
    if let Some(url) = &stored {
        patch.file_url = Some(Some(url.clone()));
    }

    let report = match state.store.update_report(owner_id, id, &patch).await {
        Ok(Some(report)) => report,
        outcome => {
            if let Some(url) = &stored {
                discard_file(&state, url).await;
            }
            return Err(match outcome {
                Err(e) => AppError::from(e),
                _ => AppError::not_found("Report"),
            });
        }
    };

    // The previous file is unreachable once replaced or cleared
    if let Some(old) = current_url.as_deref() {
        if report.report.file_url.as_deref() != Some(old) {
            discard_file(&state, old).await;
        }
    }

    Ok(Json(ReportResponse { data: report }))
}

/// Delete a report
#[utoipa::path(
    delete,
    path = "/api/reports/{id}",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report deleted", body = MessageResponse),
        (status = 404, description = "Report not found", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_record_id(&id, "Report")?;
    let report = state
        .store
        .delete_report(auth.account_id(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Report"))?;

    if let Some(url) = report.file_url.as_deref() {
        discard_file(&state, url).await;
    }

    Ok(Json(MessageResponse::new("Report deleted successfully")))
}
