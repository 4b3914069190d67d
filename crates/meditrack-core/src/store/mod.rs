//! Record storage
//!
//! Storage is split into three repositories (accounts, doctors, reports) that
//! together make up a [`Store`]. Every doctor and report operation takes the
//! owning account id; records belonging to another owner behave exactly as if
//! they did not exist.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::query::{ReportPage, ReportQuery};
use crate::{
    Account, AccountPatch, Doctor, DoctorPatch, NewAccount, NewDoctor, NewReport, Report,
    ReportDetails, ReportPatch, Result,
};

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert an account. Fails with `Duplicate` when the email is taken.
    async fn insert_account(&self, account: NewAccount) -> Result<Account>;

    /// Look up an account by its normalized email
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Apply a partial update. Returns `None` if the account does not exist.
    async fn update_account(&self, id: Uuid, patch: &AccountPatch) -> Result<Option<Account>>;

    /// All accounts, oldest first
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Delete an account together with its doctors and reports
    async fn delete_account(&self, id: Uuid) -> Result<bool>;
}

/// Doctor persistence, scoped by owner
#[async_trait]
pub trait DoctorStore: Send + Sync {
    async fn insert_doctor(&self, owner_id: Uuid, doctor: NewDoctor) -> Result<Doctor>;

    /// The owner's doctors ordered by name
    async fn list_doctors(&self, owner_id: Uuid) -> Result<Vec<Doctor>>;

    async fn find_doctor(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Doctor>>;

    async fn update_doctor(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &DoctorPatch,
    ) -> Result<Option<Doctor>>;

    /// Delete a doctor. Reports that referenced it keep existing with no doctor.
    async fn delete_doctor(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Doctor>>;

    /// Remove every doctor of an owner, returning how many were removed
    async fn delete_doctors_for_owner(&self, owner_id: Uuid) -> Result<u64>;
}

/// Report persistence, scoped by owner
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert a report. A referenced doctor must already have been checked to
    /// belong to the same owner.
    async fn insert_report(&self, owner_id: Uuid, report: NewReport) -> Result<ReportDetails>;

    /// Filtered, sorted and paginated listing of the owner's reports
    async fn list_reports(&self, owner_id: Uuid, query: &ReportQuery) -> Result<ReportPage>;

    async fn find_report(&self, owner_id: Uuid, id: Uuid) -> Result<Option<ReportDetails>>;

    async fn update_report(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &ReportPatch,
    ) -> Result<Option<ReportDetails>>;

    async fn delete_report(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Report>>;
}

/// Complete storage backend
#[async_trait]
pub trait Store: AccountStore + DoctorStore + ReportStore {
    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Short backend name for logs and readiness output
    fn backend(&self) -> &'static str;
}
