//! OpenAPI document served by Swagger UI

use crate::auth::{AuthResponse, LoginRequest, ProfileUpdateRequest, SignupRequest};
use crate::error::{ApiError, ErrorEnvelope};
use crate::handlers::{self, doctors, health, profile, reports, MessageResponse};
use meditrack_core::{
    AccountProfile, Doctor, DoctorSummary, Gender, HealthProfile, Pagination, Report,
    ReportCategory, ReportDetails, ReportPage,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MediTrack API",
        description = "Personal medical records: doctors, reports and health profile"
    ),
    paths(
        handlers::auth::signup_handler,
        handlers::auth::login_handler,
        profile::get_profile,
        profile::update_profile,
        doctors::list_doctors,
        doctors::create_doctor,
        doctors::get_doctor,
        doctors::update_doctor,
        doctors::delete_doctor,
        reports::list_reports,
        reports::create_report,
        reports::get_report,
        reports::update_report,
        reports::delete_report,
        health::health_check,
        health::readiness_check,
    ),
    components(schemas(
        AccountProfile,
        HealthProfile,
        Gender,
        Doctor,
        DoctorSummary,
        Report,
        ReportCategory,
        ReportDetails,
        ReportPage,
        Pagination,
        SignupRequest,
        LoginRequest,
        ProfileUpdateRequest,
        AuthResponse,
        profile::ProfileResponse,
        doctors::DoctorRequest,
        doctors::DoctorResponse,
        doctors::DoctorListResponse,
        reports::ReportRequest,
        reports::ReportResponse,
        MessageResponse,
        health::HealthResponse,
        health::ReadinessResponse,
        ApiError,
        ErrorEnvelope,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Signup and login"),
        (name = "profile", description = "Account profile"),
        (name = "doctors", description = "Personal doctor directory"),
        (name = "reports", description = "Medical reports"),
        (name = "health", description = "Liveness and readiness"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
