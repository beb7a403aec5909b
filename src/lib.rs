use std::sync::Arc;

use config::Config;
use jobs::{OverdueSweep, TaskQueue};
use lifecycle::{AssetLifecycleManager, Datastore};
use sqlx::PgPool;

pub mod config;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod result;
pub mod router;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub store: Arc<dyn Datastore>,
    pub tasks: Arc<dyn TaskQueue>,
    pub lifecycle: Arc<AssetLifecycleManager>,
    pub sweep: Arc<OverdueSweep>,
}
