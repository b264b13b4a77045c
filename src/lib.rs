pub mod api;
pub mod bridge;
pub mod config;
pub mod db;
pub mod errors;
pub mod execution;
pub mod fleet;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod services;
pub mod stealth;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::fleet::TerminalFleetManager;
use crate::models::ExecutionResult;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: AppConfig,
    pub fleet: Arc<TerminalFleetManager>,
    pub outcome_tx: broadcast::Sender<ExecutionResult>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub pause_flag: Arc<AtomicBool>,
}
