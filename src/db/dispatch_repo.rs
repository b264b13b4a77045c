use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::models::DispatchRequest;

#[derive(Debug, FromRow)]
struct DispatchRow {
    dispatch_id: String,
    signal_id: String,
    user_id: i64,
    worker_id: String,
    lot_size: String,
    entry_delay_ms: i64,
    price_offset_pips: String,
    skip: bool,
    signal_expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl DispatchRow {
    fn into_model(self) -> anyhow::Result<DispatchRequest> {
        Ok(DispatchRequest {
            dispatch_id: self.dispatch_id,
            signal_id: self.signal_id,
            user_id: self.user_id,
            worker_id: Uuid::parse_str(&self.worker_id)?,
            lot_size: Decimal::from_str(&self.lot_size)?,
            entry_delay_ms: self.entry_delay_ms,
            price_offset_pips: Decimal::from_str(&self.price_offset_pips)?,
            skip: self.skip,
            signal_expires_at: self.signal_expires_at,
            created_at: self.created_at,
        })
    }
}

const SELECT_COLS: &str = "dispatch_id, signal_id, user_id, worker_id, lot_size, \
                           entry_delay_ms, price_offset_pips, skip, signal_expires_at, created_at";

/// Atomic check-and-insert on the idempotency key.
///
/// Returns `true` when this call created the request, `false` when the
/// (signal, user) pair was already dispatched. The primary-key conflict
/// clause is what makes the duplicate check race-free — there is no
/// separate read.
pub async fn try_insert(pool: &SqlitePool, req: &DispatchRequest) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO dispatch_requests
            (dispatch_id, signal_id, user_id, worker_id, lot_size, entry_delay_ms,
             price_offset_pips, skip, signal_expires_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT (dispatch_id) DO NOTHING
        "#,
    )
    .bind(&req.dispatch_id)
    .bind(&req.signal_id)
    .bind(req.user_id)
    .bind(req.worker_id.to_string())
    .bind(req.lot_size.to_string())
    .bind(req.entry_delay_ms)
    .bind(req.price_offset_pips.to_string())
    .bind(req.skip)
    .bind(req.signal_expires_at)
    .bind(req.created_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn exists(pool: &SqlitePool, dispatch_id: &str) -> anyhow::Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM dispatch_requests WHERE dispatch_id = ?1")
            .bind(dispatch_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

pub async fn get_dispatch(
    pool: &SqlitePool,
    dispatch_id: &str,
) -> anyhow::Result<Option<DispatchRequest>> {
    let row = sqlx::query_as::<_, DispatchRow>(&format!(
        "SELECT {SELECT_COLS} FROM dispatch_requests WHERE dispatch_id = ?1"
    ))
    .bind(dispatch_id)
    .fetch_optional(pool)
    .await?;
    row.map(DispatchRow::into_model).transpose()
}

pub async fn list_for_signal(
    pool: &SqlitePool,
    signal_id: &str,
) -> anyhow::Result<Vec<DispatchRequest>> {
    let rows = sqlx::query_as::<_, DispatchRow>(&format!(
        "SELECT {SELECT_COLS} FROM dispatch_requests WHERE signal_id = ?1 ORDER BY created_at"
    ))
    .bind(signal_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(DispatchRow::into_model).collect()
}

pub async fn list_recent(pool: &SqlitePool, limit: i64) -> anyhow::Result<Vec<DispatchRequest>> {
    let rows = sqlx::query_as::<_, DispatchRow>(&format!(
        "SELECT {SELECT_COLS} FROM dispatch_requests ORDER BY created_at DESC LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(DispatchRow::into_model).collect()
}
