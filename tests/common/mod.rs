#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use laptop_checkout::{
    AppState,
    config::Config,
    error::AppError,
    jobs::{Mailer, OutgoingEmail, OverdueSweep, RecordingQueue, TaskQueue},
    lifecycle::{AssetLifecycleManager, Clock, Datastore, ManualClock, memory::MemoryStore},
    models::{Laptop, LaptopStatus, Role, User},
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "it-admin@example.com";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn user(email: &str, role: Role) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: String::new(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        role,
        group_name: None,
        team: None,
        created_at: t0(),
        updated_at: t0(),
        deleted_at: None,
    }
}

pub fn laptop(unique_id: &str, status: LaptopStatus) -> Laptop {
    Laptop {
        id: Uuid::new_v4(),
        unique_id: unique_id.to_string(),
        serial_number: format!("SN-{unique_id}"),
        make: "Lenovo".to_string(),
        model: "ThinkPad T14".to_string(),
        status,
        qr_code_url: String::new(),
        created_at: t0(),
        updated_at: t0(),
        deleted_at: None,
    }
}

/// Lifecycle manager over the in-memory store, a recording queue and a manual clock.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<RecordingQueue>,
    pub clock: Arc<ManualClock>,
    pub manager: Arc<AssetLifecycleManager>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(RecordingQueue::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = Arc::new(AssetLifecycleManager::new(
            store.clone() as Arc<dyn Datastore>,
            queue.clone() as Arc<dyn TaskQueue>,
            clock.clone() as Arc<dyn Clock>,
            ADMIN_EMAIL,
        ));
        Self {
            store,
            queue,
            clock,
            manager,
        }
    }

    pub async fn add_user(&self, email: &str, role: Role) -> User {
        let user = user(email, role);
        self.store.insert_user(user.clone()).await;
        user
    }

    pub async fn add_laptop(&self, unique_id: &str, status: LaptopStatus) -> Laptop {
        let laptop = laptop(unique_id, status);
        self.store.insert_laptop(laptop.clone()).await;
        laptop
    }

    pub fn sweep(&self, threshold_minutes: i64) -> OverdueSweep {
        OverdueSweep::new(
            self.store.clone(),
            self.queue.clone(),
            self.clock.clone(),
            threshold_minutes,
        )
    }

    /// Application state for HTTP tests. The pool never connects.
    pub fn app_state(&self, config: Config) -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        AppState {
            pool,
            config: Arc::new(config),
            store: self.store.clone(),
            tasks: self.queue.clone(),
            lifecycle: self.manager.clone(),
            sweep: Arc::new(self.sweep(laptop_checkout::lifecycle::DEFAULT_OVERDUE_THRESHOLD_MINUTES)),
        }
    }
}

pub fn test_config() -> Config {
    let mut config = Config::with_defaults("postgres://localhost/laptops_test", "redis://127.0.0.1/", "test-secret");
    config.admin_email = ADMIN_EMAIL.to_string();
    config
}

/// Records every message; fails while `failing` is set.
#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub failing: Mutex<bool>,
}

impl FakeMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        if *self.failing.lock().unwrap() {
            return Err(AppError::internal("send email: connection refused"));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
