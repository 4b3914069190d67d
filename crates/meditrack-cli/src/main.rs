//! MediTrack CLI - administrative tasks against the PostgreSQL store
//!
//! Usage:
//!   meditrack migrate
//!   meditrack seed-doctors --email <email>
//!   meditrack users list
//!   meditrack users delete --email <email>

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use meditrack_core::{
    normalize_email, query::MAX_LIMIT, AccountStore, AppConfig, DoctorStore, NewDoctor,
    PageRequest, PgStore, ReportQuery, ReportStore, UploadStore,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "meditrack")]
#[command(about = "MediTrack administration CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables and indexes (safe to run repeatedly)
    Migrate,
    /// Replace an account's doctors with a set of sample doctors
    SeedDoctors {
        /// Email of the account to seed
        #[arg(long)]
        email: String,
    },
    /// Manage accounts
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    /// Print every account profile as JSON
    List,
    /// Delete an account with all of its doctors, reports and uploaded files
    Delete {
        #[arg(long)]
        email: String,
    },
}

/// (name, specialization, hospital, phone)
const SAMPLE_DOCTORS: [(&str, &str, &str, &str); 5] = [
    ("Dr. Sarah Smith", "Cardiologist", "City Heart Center", "555-0101"),
    ("Dr. James Jones", "Dermatologist", "Skin & Care Clinic", "555-0102"),
    ("Dr. Emily Chen", "Pediatrician", "Children's General", "555-0103"),
    ("Dr. Michael Brown", "Neurologist", "Neuro Institute", "555-0104"),
    ("Dr. Lisa White", "General Physician", "Community Health", "555-0105"),
];

fn sample_doctors() -> Vec<NewDoctor> {
    SAMPLE_DOCTORS
        .iter()
        .map(|(name, specialization, hospital, phone)| NewDoctor {
            name: name.to_string(),
            specialization: specialization.to_string(),
            hospital: hospital.to_string(),
            phone: Some(phone.to_string()),
        })
        .collect()
}

async fn seed_doctors(store: &PgStore, email: &str) -> anyhow::Result<()> {
    let email = normalize_email(email)?;
    let Some(account) = store.find_account_by_email(&email).await? else {
        bail!("No account with email {email}");
    };

    let removed = store.delete_doctors_for_owner(account.id).await?;
    tracing::info!(account_id = %account.id, removed, "Cleared existing doctors");

    for doctor in sample_doctors() {
        let doctor = store.insert_doctor(account.id, doctor).await?;
        println!("Added {} ({})", doctor.name, doctor.specialization);
    }
    Ok(())
}

async fn list_users(store: &PgStore) -> anyhow::Result<()> {
    let accounts = store.list_accounts().await?;
    if accounts.is_empty() {
        println!("No accounts.");
        return Ok(());
    }
    for account in accounts {
        println!("{}", serde_json::to_string(&account.profile())?);
    }
    Ok(())
}

/// Every file URL attached to an account's reports
async fn report_file_urls(store: &PgStore, owner_id: Uuid) -> anyhow::Result<Vec<String>> {
    let mut urls = Vec::new();
    let mut query = ReportQuery {
        page: PageRequest::new(Some(1), Some(MAX_LIMIT))?,
        ..ReportQuery::default()
    };

    loop {
        let page = store.list_reports(owner_id, &query).await?;
        urls.extend(page.data.into_iter().filter_map(|r| r.report.file_url));
        if u64::from(query.page.page) >= page.pagination.pages {
            break;
        }
        query.page.page += 1;
    }
    Ok(urls)
}

async fn delete_user(store: &PgStore, uploads: &UploadStore, email: &str) -> anyhow::Result<()> {
    let email = normalize_email(email)?;
    let Some(account) = store.find_account_by_email(&email).await? else {
        bail!("No account with email {email}");
    };

    let files = report_file_urls(store, account.id).await?;
    if !store.delete_account(account.id).await? {
        return Ok(());
    }

    let mut removed = 0;
    for url in &files {
        match uploads.remove(url).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(file = %url, error = %e, "Failed to remove uploaded file"),
        }
    }
    println!("Deleted account {email} and all of its records ({removed} uploaded files removed)");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meditrack_core=info,meditrack=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // The CLI never signs tokens; it needs the database and upload sections
    let config = AppConfig::from_env().context("Invalid configuration")?;
    let store = PgStore::connect_lazy(&config.database).context("Failed to configure database")?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await.context("Migration failed")?;
            println!("Database schema is up to date");
        }
        Commands::SeedDoctors { email } => seed_doctors(&store, &email).await?,
        Commands::Users { action } => match action {
            UsersAction::List => list_users(&store).await?,
            UsersAction::Delete { email } => {
                let uploads = UploadStore::new(&config.uploads);
                delete_user(&store, &uploads, &email).await?
            }
        },
    }

    Ok(())
}
