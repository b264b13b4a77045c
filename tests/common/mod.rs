//! Shared harness for the integration tests: an in-memory database, a
//! scriptable bridge, and a fully wired dispatch pipeline with short
//! timeouts so tests run in milliseconds.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

use fleetbot::bridge::{
    BridgeCommand, BridgeError, BridgeResult, BridgeResultStatus, ExecutionBridge,
};
use fleetbot::execution::router::RetryPolicy;
use fleetbot::execution::{DispatchRouter, ResultMonitor};
use fleetbot::fleet::{AllocationRegistry, TerminalFleetManager, TerminalLauncher};
use fleetbot::models::{
    BrokerProfile, BrokerType, Direction, ExecutionResult, Signal, Tier, UserOverlay, Worker,
};
use fleetbot::stealth::StealthConfig;

/// Fresh in-memory database with the full schema applied. One connection,
/// so every handle sees the same in-memory instance.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database should open");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations should apply");
    pool
}

// ---------------------------------------------------------------------------
// ScriptedBridge
// ---------------------------------------------------------------------------

/// Bridge double: records every sent command and serves pre-scripted
/// results. Probes succeed unless a worker is marked unhealthy.
pub struct ScriptedBridge {
    sent: Mutex<Vec<BridgeCommand>>,
    results: Mutex<HashMap<String, BridgeResult>>,
    unhealthy: Mutex<HashSet<Uuid>>,
    fail_all_probes: AtomicBool,
    flaky_probes: AtomicU32,
    fail_sends: AtomicBool,
    send_attempts: AtomicU32,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            results: Mutex::new(HashMap::new()),
            unhealthy: Mutex::new(HashSet::new()),
            fail_all_probes: AtomicBool::new(false),
            flaky_probes: AtomicU32::new(0),
            fail_sends: AtomicBool::new(false),
            send_attempts: AtomicU32::new(0),
        }
    }

    /// Pre-load the result a worker will report for `dispatch_id`.
    pub fn script_result(&self, result: BridgeResult) {
        self.results
            .lock()
            .unwrap()
            .insert(result.dispatch_id.clone(), result);
    }

    pub fn set_unhealthy(&self, worker_id: Uuid) {
        self.unhealthy.lock().unwrap().insert(worker_id);
    }

    pub fn set_healthy(&self, worker_id: Uuid) {
        self.unhealthy.lock().unwrap().remove(&worker_id);
    }

    pub fn fail_all_probes(&self, fail: bool) {
        self.fail_all_probes.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` probes, then recover. Stretches provisioning by
    /// `n` ready-poll intervals without making it fail.
    pub fn fail_next_probes(&self, n: u32) {
        self.flaky_probes.store(n, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent_commands(&self) -> Vec<BridgeCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> u32 {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBridge for ScriptedBridge {
    async fn send(&self, worker_id: Uuid, command: &BridgeCommand) -> Result<(), BridgeError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BridgeError::Unreachable {
                worker_id,
                reason: "scripted send failure".into(),
            });
        }
        self.sent.lock().unwrap().push(command.clone());
        Ok(())
    }

    async fn poll_result(
        &self,
        _worker_id: Uuid,
        dispatch_id: &str,
    ) -> Result<Option<BridgeResult>, BridgeError> {
        Ok(self.results.lock().unwrap().get(dispatch_id).cloned())
    }

    async fn probe(&self, worker_id: Uuid) -> Result<(), BridgeError> {
        if self
            .flaky_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BridgeError::Unreachable {
                worker_id,
                reason: "scripted transient probe failure".into(),
            });
        }
        if self.fail_all_probes.load(Ordering::SeqCst)
            || self.unhealthy.lock().unwrap().contains(&worker_id)
        {
            return Err(BridgeError::Unreachable {
                worker_id,
                reason: "scripted probe failure".into(),
            });
        }
        Ok(())
    }
}

/// Launcher double: workers "start" instantly and leave nothing behind.
pub struct InstantLauncher;

#[async_trait]
impl TerminalLauncher for InstantLauncher {
    async fn launch(&self, _worker: &Worker, _profile: &BrokerProfile) -> anyhow::Result<()> {
        Ok(())
    }

    async fn terminate(&self, _worker_id: Uuid) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wired pipeline
// ---------------------------------------------------------------------------

pub struct TestRig {
    pub pool: SqlitePool,
    pub bridge: Arc<ScriptedBridge>,
    pub fleet: Arc<TerminalFleetManager>,
    pub router: Arc<DispatchRouter>,
    pub outcome_tx: broadcast::Sender<ExecutionResult>,
}

pub fn make_fleet(pool: SqlitePool, bridge: Arc<ScriptedBridge>) -> Arc<TerminalFleetManager> {
    Arc::new(TerminalFleetManager::new(
        pool,
        AllocationRegistry::new(),
        bridge,
        Arc::new(InstantLauncher),
        Duration::from_millis(300),
        Duration::from_millis(20),
    ))
}

pub async fn rig() -> TestRig {
    rig_with_stealth(StealthConfig::default()).await
}

pub async fn rig_with_stealth(stealth: StealthConfig) -> TestRig {
    let pool = setup_test_db().await;
    let bridge = Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());

    let (outcome_tx, _) = broadcast::channel(64);
    let monitor = ResultMonitor::new(
        pool.clone(),
        bridge.clone(),
        outcome_tx.clone(),
        Duration::from_millis(400),
        Duration::from_millis(25),
    );
    let router = Arc::new(DispatchRouter::new(
        pool.clone(),
        fleet.clone(),
        bridge.clone(),
        monitor,
        stealth,
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(10),
        },
    ));

    TestRig {
        pool,
        bridge,
        fleet,
        router,
        outcome_tx,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// EURUSD long with a 20-pip stop, valid for five minutes.
pub fn eurusd_signal(signal_id: &str) -> Signal {
    let now = Utc::now();
    Signal {
        signal_id: signal_id.into(),
        symbol: "EURUSD".into(),
        direction: Direction::Buy,
        entry_price: dec("1.0800"),
        stop_loss: dec("1.0780"),
        take_profit: dec("1.0840"),
        confidence: dec("0.85"),
        shield_classification: "approved".into(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(5),
    }
}

pub fn expired_signal(signal_id: &str) -> Signal {
    let mut signal = eurusd_signal(signal_id);
    signal.issued_at = Utc::now() - ChronoDuration::minutes(10);
    signal.expires_at = Utc::now() - ChronoDuration::seconds(1);
    signal
}

/// Commander on a $10,000 demo account risking 2% per trade.
pub fn commander_overlay(user_id: i64) -> UserOverlay {
    UserOverlay {
        user_id,
        tier: Tier::Commander,
        account_balance: Decimal::from(10_000),
        risk_percent: dec("2.0"),
        broker: demo_profile(user_id),
    }
}

pub fn demo_profile(user_id: i64) -> BrokerProfile {
    BrokerProfile {
        broker_type: BrokerType::Demo,
        server: "Demo-Server".into(),
        login: format!("10{user_id:04}"),
        password: "hunter2".into(),
    }
}

pub fn filled_result(dispatch_id: &str, fill_price: &str) -> BridgeResult {
    BridgeResult {
        dispatch_id: dispatch_id.into(),
        status: BridgeResultStatus::Filled,
        fill_price: Some(dec(fill_price)),
        ticket_id: Some(778_812),
        message: None,
    }
}
