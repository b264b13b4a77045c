use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::models::{BrokerType, Worker, WorkerStatus};

#[derive(Debug, FromRow)]
struct WorkerRow {
    worker_id: String,
    owner_user_id: i64,
    status: String,
    broker_type: String,
    allocated_port: i64,
    allocated_magic_number: i64,
    created_at: DateTime<Utc>,
    last_health_check_at: Option<DateTime<Utc>>,
}

impl WorkerRow {
    fn into_model(self) -> anyhow::Result<Worker> {
        Ok(Worker {
            worker_id: Uuid::parse_str(&self.worker_id)?,
            owner_user_id: self.owner_user_id,
            status: WorkerStatus::from_db_str(&self.status)
                .ok_or_else(|| anyhow::anyhow!("unknown worker status '{}'", self.status))?,
            broker_type: BrokerType::from_api_str(&self.broker_type)
                .ok_or_else(|| anyhow::anyhow!("unknown broker type '{}'", self.broker_type))?,
            allocated_port: self.allocated_port as u16,
            allocated_magic_number: self.allocated_magic_number,
            created_at: self.created_at,
            last_health_check_at: self.last_health_check_at,
        })
    }
}

const SELECT_COLS: &str = "worker_id, owner_user_id, status, broker_type, allocated_port, \
                           allocated_magic_number, created_at, last_health_check_at";

pub async fn insert_worker(pool: &SqlitePool, worker: &Worker) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO workers
            (worker_id, owner_user_id, status, broker_type, allocated_port,
             allocated_magic_number, created_at, last_health_check_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(worker.worker_id.to_string())
    .bind(worker.owner_user_id)
    .bind(worker.status.as_str())
    .bind(worker.broker_type.to_string())
    .bind(worker.allocated_port as i64)
    .bind(worker.allocated_magic_number)
    .bind(worker.created_at)
    .bind(worker.last_health_check_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_status(
    pool: &SqlitePool,
    worker_id: Uuid,
    status: WorkerStatus,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE workers SET status = ?1 WHERE worker_id = ?2")
        .bind(status.as_str())
        .bind(worker_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_health_check(
    pool: &SqlitePool,
    worker_id: Uuid,
    at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE workers SET last_health_check_at = ?1 WHERE worker_id = ?2")
        .bind(at)
        .bind(worker_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_worker(pool: &SqlitePool, worker_id: Uuid) -> anyhow::Result<Option<Worker>> {
    let row = sqlx::query_as::<_, WorkerRow>(&format!(
        "SELECT {SELECT_COLS} FROM workers WHERE worker_id = ?1"
    ))
    .bind(worker_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.map(WorkerRow::into_model).transpose()
}

/// The user's live worker, if any. A user maps to at most one live worker.
pub async fn get_live_worker_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> anyhow::Result<Option<Worker>> {
    let row = sqlx::query_as::<_, WorkerRow>(&format!(
        r#"
        SELECT {SELECT_COLS} FROM workers
        WHERE owner_user_id = ?1 AND status IN ('provisioning', 'running', 'degraded')
        ORDER BY created_at DESC
        LIMIT 1
        "#
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.map(WorkerRow::into_model).transpose()
}

pub async fn list_by_status(
    pool: &SqlitePool,
    status: WorkerStatus,
) -> anyhow::Result<Vec<Worker>> {
    let rows = sqlx::query_as::<_, WorkerRow>(&format!(
        "SELECT {SELECT_COLS} FROM workers WHERE status = ?1 ORDER BY created_at"
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(WorkerRow::into_model).collect()
}

pub async fn list_live(pool: &SqlitePool) -> anyhow::Result<Vec<Worker>> {
    let rows = sqlx::query_as::<_, WorkerRow>(&format!(
        r#"
        SELECT {SELECT_COLS} FROM workers
        WHERE status IN ('provisioning', 'running', 'degraded')
        ORDER BY created_at
        "#
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(WorkerRow::into_model).collect()
}

pub async fn list_all(pool: &SqlitePool, limit: i64) -> anyhow::Result<Vec<Worker>> {
    let rows = sqlx::query_as::<_, WorkerRow>(&format!(
        "SELECT {SELECT_COLS} FROM workers ORDER BY created_at DESC LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(WorkerRow::into_model).collect()
}
