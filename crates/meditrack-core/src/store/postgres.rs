//! PostgreSQL store
//!
//! Accounts, doctors and reports persisted with SQLx. Every doctor and report
//! statement carries `owner_id` in its WHERE clause.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AccountStore, DoctorStore, ReportStore, Store};
use crate::config::DatabaseConfig;
use crate::query::{Pagination, ReportFilter, ReportPage, ReportQuery};
use crate::{
    Account, AccountPatch, Doctor, DoctorPatch, DoctorSummary, HealthProfile, MediTrackError,
    NewAccount, NewDoctor, NewReport, Report, ReportDetails, ReportPatch, Result,
};

/// Schema statements, applied in order. Each one is idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT,
        date_of_birth DATE,
        gender TEXT CHECK (gender IN ('Male', 'Female', 'Other')),
        blood_group TEXT,
        height DOUBLE PRECISION,
        weight DOUBLE PRECISION,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doctors (
        id UUID PRIMARY KEY,
        owner_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        specialization TEXT NOT NULL,
        hospital TEXT NOT NULL,
        phone TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reports (
        id UUID PRIMARY KEY,
        owner_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        description TEXT,
        category TEXT NOT NULL CHECK (category IN ('Lab', 'Prescription')),
        report_date TIMESTAMPTZ NOT NULL,
        file_url TEXT,
        doctor_id UUID REFERENCES doctors(id) ON DELETE SET NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_doctors_owner ON doctors (owner_id, name)",
    "CREATE INDEX IF NOT EXISTS idx_reports_owner_created ON reports (owner_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_reports_owner_doctor ON reports (owner_id, doctor_id)",
];

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, first_name, last_name, date_of_birth, \
     gender, blood_group, height, weight, created_at, updated_at";

const DOCTOR_COLUMNS: &str = "id, owner_id, name, specialization, hospital, phone, created_at";

/// Report columns joined with the referenced doctor. Expects the report
/// relation aliased as `r` and `doctors` as `d`.
const REPORT_SELECT: &str = "SELECT r.id, r.owner_id, r.title, r.description, r.category, \
     r.report_date, r.file_url, r.doctor_id, r.created_at, \
     d.name AS doctor_name, d.specialization AS doctor_specialization, \
     d.hospital AS doctor_hospital";

const DUPLICATE_EMAIL: &str = "An account with this email already exists";

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Build a pool without connecting; connections are opened on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(&config.url)
            .map_err(|e| MediTrackError::Database(format!("Invalid database URL: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MediTrackError::Database(format!("Migration failed: {e}")))?;
        }
        tracing::info!(statements = SCHEMA.len(), "Database schema is up to date");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> MediTrackError + '_ {
    move |e| MediTrackError::Database(format!("{context}: {e}"))
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: Option<String>,
    date_of_birth: Option<NaiveDate>,
    gender: Option<String>,
    blood_group: Option<String>,
    height: Option<f64>,
    weight: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = MediTrackError;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Account {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            health: HealthProfile {
                date_of_birth: row.date_of_birth,
                gender: row.gender.as_deref().map(str::parse).transpose()?,
                blood_group: row.blood_group,
                height: row.height,
                weight: row.weight,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DoctorRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    specialization: String,
    hospital: String,
    phone: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<DoctorRow> for Doctor {
    fn from(row: DoctorRow) -> Self {
        Doctor {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            specialization: row.specialization,
            hospital: row.hospital,
            phone: row.phone,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: Option<String>,
    category: String,
    report_date: DateTime<Utc>,
    file_url: Option<String>,
    doctor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    doctor_name: Option<String>,
    doctor_specialization: Option<String>,
    doctor_hospital: Option<String>,
}

impl TryFrom<ReportRow> for ReportDetails {
    type Error = MediTrackError;

    fn try_from(row: ReportRow) -> Result<Self> {
        let doctor = match (
            row.doctor_id,
            row.doctor_name,
            row.doctor_specialization,
            row.doctor_hospital,
        ) {
            (Some(id), Some(name), Some(specialization), Some(hospital)) => Some(DoctorSummary {
                id,
                name,
                specialization,
                hospital,
            }),
            _ => None,
        };

        Ok(ReportDetails {
            report: Report {
                id: row.id,
                owner_id: row.owner_id,
                title: row.title,
                description: row.description,
                category: row.category.parse()?,
                report_date: row.report_date,
                file_url: row.file_url,
                doctor_id: row.doctor_id,
                created_at: row.created_at,
            },
            doctor,
        })
    }
}

fn push_report_filters(qb: &mut QueryBuilder<'_, Postgres>, owner_id: Uuid, filter: &ReportFilter) {
    qb.push(" WHERE r.owner_id = ").push_bind(owner_id);
    if let Some(category) = filter.category {
        qb.push(" AND r.category = ").push_bind(category.as_str());
    }
    if let Some(doctor_id) = filter.doctor_id {
        qb.push(" AND r.doctor_id = ").push_bind(doctor_id);
    }
    if let Some(search) = &filter.search {
        qb.push(" AND r.title ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)));
    }
}

/// Escape LIKE metacharacters so the search term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// Accounts
// ============================================================================

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, account: NewAccount) -> Result<Account> {
        let row: AccountRow = sqlx::query_as(&format!(
            "INSERT INTO accounts (id, email, password_hash, first_name, last_name) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MediTrackError::Duplicate(DUPLICATE_EMAIL.to_string())
            } else {
                MediTrackError::Database(format!("Failed to create account: {e}"))
            }
        })?;

        row.try_into()
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get account"))?;

        row.map(Account::try_from).transpose()
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get account"))?;

        row.map(Account::try_from).transpose()
    }

    async fn update_account(&self, id: Uuid, patch: &AccountPatch) -> Result<Option<Account>> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE accounts SET updated_at = NOW()");
        if let Some(email) = &patch.email {
            qb.push(", email = ").push_bind(email.clone());
        }
        if let Some(hash) = &patch.password_hash {
            qb.push(", password_hash = ").push_bind(hash.clone());
        }
        if let Some(first_name) = &patch.first_name {
            qb.push(", first_name = ").push_bind(first_name.clone());
        }
        if let Some(last_name) = &patch.last_name {
            qb.push(", last_name = ").push_bind(last_name.clone());
        }
        if let Some(dob) = patch.date_of_birth {
            qb.push(", date_of_birth = ").push_bind(dob);
        }
        if let Some(gender) = patch.gender {
            qb.push(", gender = ").push_bind(gender.as_str());
        }
        if let Some(blood_group) = &patch.blood_group {
            qb.push(", blood_group = ").push_bind(blood_group.clone());
        }
        if let Some(height) = patch.height {
            qb.push(", height = ").push_bind(height);
        }
        if let Some(weight) = patch.weight {
            qb.push(", weight = ").push_bind(weight);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(format!(" RETURNING {ACCOUNT_COLUMNS}"));

        let row: Option<AccountRow> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MediTrackError::Duplicate(DUPLICATE_EMAIL.to_string())
                } else {
                    MediTrackError::Database(format!("Failed to update account: {e}"))
                }
            })?;

        row.map(Account::try_from).transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list accounts"))?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete account"))?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Doctors
// ============================================================================

#[async_trait]
impl DoctorStore for PgStore {
    async fn insert_doctor(&self, owner_id: Uuid, doctor: NewDoctor) -> Result<Doctor> {
        let row: DoctorRow = sqlx::query_as(&format!(
            "INSERT INTO doctors (id, owner_id, name, specialization, hospital, phone) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {DOCTOR_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&doctor.name)
        .bind(&doctor.specialization)
        .bind(&doctor.hospital)
        .bind(&doctor.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create doctor"))?;

        Ok(row.into())
    }

    async fn list_doctors(&self, owner_id: Uuid) -> Result<Vec<Doctor>> {
        let rows: Vec<DoctorRow> = sqlx::query_as(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE owner_id = $1 ORDER BY name, id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list doctors"))?;

        Ok(rows.into_iter().map(Doctor::from).collect())
    }

    async fn find_doctor(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Doctor>> {
        let row: Option<DoctorRow> = sqlx::query_as(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get doctor"))?;

        Ok(row.map(Doctor::from))
    }

    async fn update_doctor(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &DoctorPatch,
    ) -> Result<Option<Doctor>> {
        if patch.is_empty() {
            return self.find_doctor(owner_id, id).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE doctors SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(name) = &patch.name {
                set.push("name = ").push_bind_unseparated(name.clone());
            }
            if let Some(specialization) = &patch.specialization {
                set.push("specialization = ")
                    .push_bind_unseparated(specialization.clone());
            }
            if let Some(hospital) = &patch.hospital {
                set.push("hospital = ").push_bind_unseparated(hospital.clone());
            }
            if let Some(phone) = &patch.phone {
                set.push("phone = ").push_bind_unseparated(phone.clone());
            }
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" AND owner_id = ").push_bind(owner_id);
        qb.push(format!(" RETURNING {DOCTOR_COLUMNS}"));

        let row: Option<DoctorRow> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to update doctor"))?;

        Ok(row.map(Doctor::from))
    }

    async fn delete_doctor(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Doctor>> {
        let row: Option<DoctorRow> = sqlx::query_as(&format!(
            "DELETE FROM doctors WHERE id = $1 AND owner_id = $2 RETURNING {DOCTOR_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to delete doctor"))?;

        Ok(row.map(Doctor::from))
    }

    async fn delete_doctors_for_owner(&self, owner_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM doctors WHERE owner_id = $1")
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete doctors"))?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// Reports
// ============================================================================

#[async_trait]
impl ReportStore for PgStore {
    async fn insert_report(&self, owner_id: Uuid, report: NewReport) -> Result<ReportDetails> {
        let row: ReportRow = sqlx::query_as(&format!(
            "WITH r AS ( \
                 INSERT INTO reports \
                     (id, owner_id, title, description, category, report_date, file_url, doctor_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING * \
             ) \
             {REPORT_SELECT} FROM r LEFT JOIN doctors d ON d.id = r.doctor_id"
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&report.title)
        .bind(&report.description)
        .bind(report.category.as_str())
        .bind(report.report_date)
        .bind(&report.file_url)
        .bind(report.doctor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create report"))?;

        row.try_into()
    }

    async fn list_reports(&self, owner_id: Uuid, query: &ReportQuery) -> Result<ReportPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reports r");
        push_report_filters(&mut count, owner_id, &query.filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count reports"))?;

        let mut select = QueryBuilder::<Postgres>::new(REPORT_SELECT);
        select.push(" FROM reports r LEFT JOIN doctors d ON d.id = r.doctor_id");
        push_report_filters(&mut select, owner_id, &query.filter);
        // Column and direction come from closed enums, never from user input.
        select.push(format!(
            " ORDER BY r.{} {}, r.id ASC",
            query.sort.field.column(),
            query.sort.direction.as_sql()
        ));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(query.page.offset() as i64);

        let rows: Vec<ReportRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list reports"))?;

        let data = rows
            .into_iter()
            .map(ReportDetails::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(ReportPage {
            data,
            pagination: Pagination::new(total.max(0) as u64, query.page),
        })
    }

    async fn find_report(&self, owner_id: Uuid, id: Uuid) -> Result<Option<ReportDetails>> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "{REPORT_SELECT} FROM reports r LEFT JOIN doctors d ON d.id = r.doctor_id \
             WHERE r.id = $1 AND r.owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get report"))?;

        row.map(ReportDetails::try_from).transpose()
    }

    async fn update_report(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &ReportPatch,
    ) -> Result<Option<ReportDetails>> {
        if patch.is_empty() {
            return self.find_report(owner_id, id).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new("WITH r AS (UPDATE reports SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(title) = &patch.title {
                set.push("title = ").push_bind_unseparated(title.clone());
            }
            if let Some(description) = &patch.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
            }
            if let Some(category) = patch.category {
                set.push("category = ")
                    .push_bind_unseparated(category.as_str());
            }
            if let Some(report_date) = patch.report_date {
                set.push("report_date = ").push_bind_unseparated(report_date);
            }
            if let Some(file_url) = &patch.file_url {
                set.push("file_url = ").push_bind_unseparated(file_url.clone());
            }
            if let Some(doctor_id) = patch.doctor_id {
                set.push("doctor_id = ").push_bind_unseparated(doctor_id);
            }
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" AND owner_id = ").push_bind(owner_id);
        qb.push(" RETURNING *) ");
        qb.push(REPORT_SELECT);
        qb.push(" FROM r LEFT JOIN doctors d ON d.id = r.doctor_id");

        let row: Option<ReportRow> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to update report"))?;

        row.map(ReportDetails::try_from).transpose()
    }

    async fn delete_report(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Report>> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "WITH r AS (DELETE FROM reports WHERE id = $1 AND owner_id = $2 RETURNING *) \
             {REPORT_SELECT} FROM r LEFT JOIN doctors d ON d.id = r.doctor_id"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to delete report"))?;

        Ok(row
            .map(ReportDetails::try_from)
            .transpose()?
            .map(|details| details.report))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("Database ping failed"))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
