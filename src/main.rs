use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use fleetbot::api::router::create_router;
use fleetbot::bridge::FileDropBridge;
use fleetbot::config::AppConfig;
use fleetbot::execution::router::RetryPolicy;
use fleetbot::execution::{DispatchRouter, ResultMonitor};
use fleetbot::fleet::{AllocationRegistry, FileDropLauncher, TerminalFleetManager};
use fleetbot::ingestion::fanout::run_fanout;
use fleetbot::ingestion::signal_listener::run_signal_listener;
use fleetbot::models::{ExecutionResult, Signal};
use fleetbot::services::overlay_cache::{run_overlay_refresher, OverlayCache, RegistryClient};
use fleetbot::services::watchdog::run_fleet_watchdog;
use fleetbot::{db, metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    let metrics_handle = metrics::init_metrics();

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url).await?;
    tracing::info!("Database ready");

    // --- Fleet: allocation registry, bridge, launcher, manager ---
    let registry = AllocationRegistry::new();
    let bridge = Arc::new(FileDropBridge::new(
        config.bridge_root.clone(),
        Duration::from_secs(config.heartbeat_ttl_secs),
    ));
    let launcher = Arc::new(FileDropLauncher::new(
        config.bridge_root.clone(),
        config.template_dir.clone(),
    ));
    let fleet = Arc::new(TerminalFleetManager::new(
        pool.clone(),
        registry,
        bridge.clone(),
        launcher,
        Duration::from_secs(config.provision_timeout_secs),
        Duration::from_millis(config.ready_poll_ms),
    ));

    let restored = fleet.restore_from_db().await?;
    tracing::info!(restored, "Allocation registry rebuilt from live workers");

    // --- Execution: monitor + router ---
    let (outcome_tx, _) = broadcast::channel::<ExecutionResult>(256);
    let monitor = ResultMonitor::new(
        pool.clone(),
        bridge.clone(),
        outcome_tx.clone(),
        Duration::from_secs(config.result_timeout_secs),
        Duration::from_millis(config.result_poll_ms),
    );
    let router = Arc::new(DispatchRouter::new(
        pool.clone(),
        fleet.clone(),
        bridge.clone(),
        monitor,
        config.stealth.clone(),
        RetryPolicy {
            max_attempts: config.dispatch_retry_max,
            base_backoff: Duration::from_millis(config.dispatch_retry_base_ms),
        },
    ));

    let pause_flag = Arc::new(AtomicBool::new(false));

    // --- Overlay cache: periodic refresh from the user registry ---
    let overlays = OverlayCache::new();
    match &config.user_registry_url {
        Some(url) => {
            let client = RegistryClient::new(url.clone(), config.user_registry_token.clone());
            tokio::spawn(run_overlay_refresher(
                client,
                overlays.clone(),
                config.overlay_refresh_secs,
            ));
        }
        None => {
            tracing::warn!("USER_REGISTRY_URL not set — overlay cache will stay empty");
        }
    }

    // --- Signal ingestion → fan-out ---
    if config.dispatch_enabled {
        let (signal_tx, signal_rx) = mpsc::channel::<Signal>(500);

        match &config.signal_ws_url {
            Some(ws_url) => {
                tokio::spawn(run_signal_listener(ws_url.clone(), signal_tx));
            }
            None => {
                tracing::warn!("SIGNAL_WS_URL not set — no signals will arrive");
                drop(signal_tx);
            }
        }

        tokio::spawn(run_fanout(
            signal_rx,
            router,
            overlays,
            pause_flag.clone(),
            config.signal_grace_secs,
        ));
        tracing::info!("Dispatch pipeline spawned");
    } else {
        tracing::info!("Dispatch disabled (DISPATCH_ENABLED=false)");
    }

    // --- Fleet watchdog ---
    tokio::spawn(run_fleet_watchdog(
        pool.clone(),
        fleet.clone(),
        bridge,
        config.watchdog_interval_secs,
        config.watchdog_fail_threshold,
    ));

    let state = AppState {
        db: pool,
        config,
        fleet,
        outcome_tx,
        metrics_handle,
        pause_flag,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
