//! In-memory store
//!
//! Used by the API test suite and by `meditrack-api --in-memory`. All state
//! sits behind one lock, so every operation is atomic with respect to others.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, DoctorStore, ReportStore, Store};
use crate::query::{Pagination, ReportPage, ReportQuery};
use crate::{
    Account, AccountPatch, Doctor, DoctorPatch, HealthProfile, MediTrackError, NewAccount,
    NewDoctor, NewReport, Report, ReportDetails, ReportPatch, Result,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    doctors: HashMap<Uuid, Doctor>,
    reports: HashMap<Uuid, Report>,
}

impl Inner {
    fn details(&self, report: &Report) -> ReportDetails {
        let doctor = report
            .doctor_id
            .and_then(|id| self.doctors.get(&id))
            .filter(|d| d.owner_id == report.owner_id)
            .map(Doctor::summary);
        ReportDetails {
            report: report.clone(),
            doctor,
        }
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.accounts
            .values()
            .any(|a| a.email == email && Some(a.id) != except)
    }
}

/// Store that keeps everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: NewAccount) -> Result<Account> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(&account.email, None) {
            return Err(MediTrackError::Duplicate(
                "An account with this email already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let record = Account {
            id: Uuid::new_v4(),
            email: account.email,
            password_hash: account.password_hash,
            first_name: account.first_name,
            last_name: account.last_name,
            health: HealthProfile::default(),
            created_at: now,
            updated_at: now,
        };
        inner.accounts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.inner.read().await.accounts.get(&id).cloned())
    }

    async fn update_account(&self, id: Uuid, patch: &AccountPatch) -> Result<Option<Account>> {
        let mut inner = self.inner.write().await;
        if let Some(email) = &patch.email {
            if inner.email_taken(email, Some(id)) {
                return Err(MediTrackError::Duplicate(
                    "An account with this email already exists".to_string(),
                ));
            }
        }

        let Some(account) = inner.accounts.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(account);
        account.updated_at = Utc::now();
        Ok(Some(account.clone()))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let inner = self.inner.read().await;
        let mut accounts: Vec<Account> = inner.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts)
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.accounts.remove(&id).is_none() {
            return Ok(false);
        }
        inner.doctors.retain(|_, d| d.owner_id != id);
        inner.reports.retain(|_, r| r.owner_id != id);
        Ok(true)
    }
}

#[async_trait]
impl DoctorStore for MemoryStore {
    async fn insert_doctor(&self, owner_id: Uuid, doctor: NewDoctor) -> Result<Doctor> {
        let record = Doctor {
            id: Uuid::new_v4(),
            owner_id,
            name: doctor.name,
            specialization: doctor.specialization,
            hospital: doctor.hospital,
            phone: doctor.phone,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .doctors
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_doctors(&self, owner_id: Uuid) -> Result<Vec<Doctor>> {
        let inner = self.inner.read().await;
        let mut doctors: Vec<Doctor> = inner
            .doctors
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        doctors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(doctors)
    }

    async fn find_doctor(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Doctor>> {
        let inner = self.inner.read().await;
        Ok(inner
            .doctors
            .get(&id)
            .filter(|d| d.owner_id == owner_id)
            .cloned())
    }

    async fn update_doctor(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &DoctorPatch,
    ) -> Result<Option<Doctor>> {
        let mut inner = self.inner.write().await;
        match inner.doctors.get_mut(&id) {
            Some(doctor) if doctor.owner_id == owner_id => {
                patch.apply(doctor);
                Ok(Some(doctor.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_doctor(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Doctor>> {
        let mut inner = self.inner.write().await;
        if !inner.doctors.get(&id).is_some_and(|d| d.owner_id == owner_id) {
            return Ok(None);
        }
        let removed = inner.doctors.remove(&id);
        for report in inner.reports.values_mut() {
            if report.doctor_id == Some(id) {
                report.doctor_id = None;
            }
        }
        Ok(removed)
    }

    async fn delete_doctors_for_owner(&self, owner_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.doctors.len();
        inner.doctors.retain(|_, d| d.owner_id != owner_id);
        let removed = (before - inner.doctors.len()) as u64;
        for report in inner.reports.values_mut() {
            if report.owner_id == owner_id {
                report.doctor_id = None;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, owner_id: Uuid, report: NewReport) -> Result<ReportDetails> {
        let record = Report {
            id: Uuid::new_v4(),
            owner_id,
            title: report.title,
            description: report.description,
            category: report.category,
            report_date: report.report_date,
            file_url: report.file_url,
            doctor_id: report.doctor_id,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.write().await;
        inner.reports.insert(record.id, record.clone());
        Ok(inner.details(&record))
    }

    async fn list_reports(&self, owner_id: Uuid, query: &ReportQuery) -> Result<ReportPage> {
        let inner = self.inner.read().await;
        let mut matching: Vec<ReportDetails> = inner
            .reports
            .values()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| inner.details(r))
            .filter(|d| query.filter.matches(d))
            .collect();
        matching.sort_by(|a, b| query.sort.compare(a, b));

        let total = matching.len() as u64;
        let data = matching
            .into_iter()
            .skip(usize::try_from(query.page.offset()).unwrap_or(usize::MAX))
            .take(query.page.limit as usize)
            .collect();

        Ok(ReportPage {
            data,
            pagination: Pagination::new(total, query.page),
        })
    }

    async fn find_report(&self, owner_id: Uuid, id: Uuid) -> Result<Option<ReportDetails>> {
        let inner = self.inner.read().await;
        Ok(inner
            .reports
            .get(&id)
            .filter(|r| r.owner_id == owner_id)
            .map(|r| inner.details(r)))
    }

    async fn update_report(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &ReportPatch,
    ) -> Result<Option<ReportDetails>> {
        let mut inner = self.inner.write().await;
        let updated = match inner.reports.get_mut(&id) {
            Some(report) if report.owner_id == owner_id => {
                patch.apply(report);
                report.clone()
            }
            _ => return Ok(None),
        };
        Ok(Some(inner.details(&updated)))
    }

    async fn delete_report(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Report>> {
        let mut inner = self.inner.write().await;
        if !inner.reports.get(&id).is_some_and(|r| r.owner_id == owner_id) {
            return Ok(None);
        }
        Ok(inner.reports.remove(&id))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{PageRequest, ReportFilter, SortOrder};
    use crate::{parse_report_date, ReportCategory};

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: "Test".to_string(),
            last_name: None,
        }
    }

    fn new_doctor(name: &str) -> NewDoctor {
        NewDoctor {
            name: name.to_string(),
            specialization: "Cardiologist".to_string(),
            hospital: "City Heart Center".to_string(),
            phone: None,
        }
    }

    fn new_report(title: &str, category: ReportCategory, date: &str) -> NewReport {
        NewReport {
            title: title.to_string(),
            description: None,
            category,
            report_date: parse_report_date(date).unwrap(),
            file_url: None,
            doctor_id: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.insert_account(new_account("a@example.com")).await.unwrap();

        let err = store
            .insert_account(new_account("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediTrackError::Duplicate(_)));
        assert_eq!(store.list_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_account_email_conflict() {
        let store = MemoryStore::new();
        store.insert_account(new_account("a@example.com")).await.unwrap();
        let b = store.insert_account(new_account("b@example.com")).await.unwrap();

        let patch = AccountPatch {
            email: Some("a@example.com".to_string()),
            ..Default::default()
        };
        let err = store.update_account(b.id, &patch).await.unwrap_err();
        assert!(matches!(err, MediTrackError::Duplicate(_)));

        let patch = AccountPatch {
            blood_group: Some(Some("AB-".to_string())),
            ..Default::default()
        };
        let updated = store.update_account(b.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.health.blood_group.as_deref(), Some("AB-"));
        assert_eq!(updated.email, "b@example.com");
    }

    #[tokio::test]
    async fn test_doctors_are_scoped_to_owner() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let doctor = store.insert_doctor(alice, new_doctor("Dr. A")).await.unwrap();

        assert!(store.find_doctor(bob, doctor.id).await.unwrap().is_none());
        assert!(store.list_doctors(bob).await.unwrap().is_empty());
        assert!(store
            .update_doctor(bob, doctor.id, &DoctorPatch::default())
            .await
            .unwrap()
            .is_none());
        assert!(store.delete_doctor(bob, doctor.id).await.unwrap().is_none());

        assert!(store.find_doctor(alice, doctor.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_doctors_listed_by_name() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        for name in ["Dr. Lisa White", "Dr. Emily Chen", "Dr. Sarah Smith"] {
            store.insert_doctor(owner, new_doctor(name)).await.unwrap();
        }

        let names: Vec<String> = store
            .list_doctors(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["Dr. Emily Chen", "Dr. Lisa White", "Dr. Sarah Smith"]);
    }

    #[tokio::test]
    async fn test_deleting_doctor_detaches_reports() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let doctor = store.insert_doctor(owner, new_doctor("Dr. A")).await.unwrap();

        let mut report = new_report("CBC", ReportCategory::Lab, "2024-01-01");
        report.doctor_id = Some(doctor.id);
        let created = store.insert_report(owner, report).await.unwrap();
        assert_eq!(created.doctor.as_ref().map(|d| d.id), Some(doctor.id));

        store.delete_doctor(owner, doctor.id).await.unwrap();

        let after = store
            .find_report(owner, created.report.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.report.doctor_id, None);
        assert!(after.doctor.is_none());
    }

    #[tokio::test]
    async fn test_report_pagination() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        for i in 0..25 {
            store
                .insert_report(
                    owner,
                    new_report(&format!("Report {i:02}"), ReportCategory::Lab, "2024-01-01"),
                )
                .await
                .unwrap();
        }

        let query = ReportQuery {
            page: PageRequest::new(Some(3), Some(10)).unwrap(),
            sort: SortOrder::parse("title").unwrap(),
            ..Default::default()
        };
        let page = store.list_reports(owner, &query).await.unwrap();

        assert_eq!(page.data.len(), 5);
        assert_eq!(page.pagination.total, 25);
        assert_eq!(page.pagination.pages, 3);
        assert_eq!(page.data[0].report.title, "Report 20");
    }

    #[tokio::test]
    async fn test_report_filters_and_search() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        store
            .insert_report(owner, new_report("Blood Test", ReportCategory::Lab, "2024-02-01"))
            .await
            .unwrap();
        store
            .insert_report(owner, new_report("Antibiotics", ReportCategory::Prescription, "2024-01-01"))
            .await
            .unwrap();
        store
            .insert_report(other, new_report("Blood Panel", ReportCategory::Lab, "2024-03-01"))
            .await
            .unwrap();

        let query = ReportQuery {
            filter: ReportFilter {
                search: Some("BLOOD".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let page = store.list_reports(owner, &query).await.unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.data[0].report.title, "Blood Test");

        let query = ReportQuery {
            filter: ReportFilter {
                category: Some(ReportCategory::Prescription),
                ..Default::default()
            },
            ..Default::default()
        };
        let page = store.list_reports(owner, &query).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].report.title, "Antibiotics");

        let query = ReportQuery {
            sort: SortOrder::parse("date").unwrap(),
            ..Default::default()
        };
        let page = store.list_reports(owner, &query).await.unwrap();
        let titles: Vec<&str> = page.data.iter().map(|d| d.report.title.as_str()).collect();
        assert_eq!(titles, ["Antibiotics", "Blood Test"]);
    }

    #[tokio::test]
    async fn test_update_report_clears_optional_fields() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut report = new_report("CBC", ReportCategory::Lab, "2024-01-01");
        report.description = Some("fasting".to_string());
        let created = store.insert_report(owner, report).await.unwrap();

        let patch = ReportPatch {
            description: Some(None),
            category: Some(ReportCategory::Prescription),
            ..Default::default()
        };
        let updated = store
            .update_report(owner, created.report.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.report.description, None);
        assert_eq!(updated.report.category, ReportCategory::Prescription);
        assert_eq!(updated.report.title, "CBC");

        assert!(store
            .update_report(Uuid::new_v4(), created.report.id, &patch)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_account_cascades() {
        let store = MemoryStore::new();
        let account = store.insert_account(new_account("a@example.com")).await.unwrap();
        store.insert_doctor(account.id, new_doctor("Dr. A")).await.unwrap();
        store
            .insert_report(account.id, new_report("CBC", ReportCategory::Lab, "2024-01-01"))
            .await
            .unwrap();

        assert!(store.delete_account(account.id).await.unwrap());
        assert!(store.list_doctors(account.id).await.unwrap().is_empty());
        let page = store
            .list_reports(account.id, &ReportQuery::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 0);
        assert!(!store.delete_account(account.id).await.unwrap());
    }
}
