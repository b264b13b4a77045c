use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, SqlitePool};

use crate::models::{ExecutionResult, ExecutionStatus};

#[derive(Debug, FromRow)]
struct OutcomeRow {
    dispatch_id: String,
    user_id: i64,
    status: String,
    fill_price: Option<String>,
    ticket_id: Option<i64>,
    detail: Option<String>,
    observed_at: DateTime<Utc>,
}

impl OutcomeRow {
    fn into_model(self) -> anyhow::Result<ExecutionResult> {
        Ok(ExecutionResult {
            dispatch_id: self.dispatch_id,
            user_id: self.user_id,
            status: ExecutionStatus::from_db_str(&self.status)
                .ok_or_else(|| anyhow::anyhow!("unknown execution status '{}'", self.status))?,
            fill_price: self
                .fill_price
                .as_deref()
                .map(Decimal::from_str)
                .transpose()?,
            ticket_id: self.ticket_id,
            detail: self.detail,
            observed_at: self.observed_at,
        })
    }
}

const SELECT_COLS: &str =
    "dispatch_id, user_id, status, fill_price, ticket_id, detail, observed_at";

/// Append one terminal outcome. The log is append-only and keyed on
/// `dispatch_id`, so the first writer wins and every later attempt is a
/// no-op. Returns `true` only for the winning write — callers emit events
/// and metrics solely on that path, which gives exactly-once reporting.
pub async fn insert_once(pool: &SqlitePool, result: &ExecutionResult) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        INSERT INTO execution_results
            (dispatch_id, user_id, status, fill_price, ticket_id, detail, observed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (dispatch_id) DO NOTHING
        "#,
    )
    .bind(&result.dispatch_id)
    .bind(result.user_id)
    .bind(result.status.as_str())
    .bind(result.fill_price.map(|p| p.to_string()))
    .bind(result.ticket_id)
    .bind(&result.detail)
    .bind(result.observed_at)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() > 0)
}

pub async fn get_by_dispatch_id(
    pool: &SqlitePool,
    dispatch_id: &str,
) -> anyhow::Result<Option<ExecutionResult>> {
    let row = sqlx::query_as::<_, OutcomeRow>(&format!(
        "SELECT {SELECT_COLS} FROM execution_results WHERE dispatch_id = ?1"
    ))
    .bind(dispatch_id)
    .fetch_optional(pool)
    .await?;
    row.map(OutcomeRow::into_model).transpose()
}

pub async fn list_recent(pool: &SqlitePool, limit: i64) -> anyhow::Result<Vec<ExecutionResult>> {
    let rows = sqlx::query_as::<_, OutcomeRow>(&format!(
        "SELECT {SELECT_COLS} FROM execution_results ORDER BY observed_at DESC LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(OutcomeRow::into_model).collect()
}

/// Counts per terminal status, for the operational surface.
pub async fn status_counts(pool: &SqlitePool) -> anyhow::Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM execution_results GROUP BY status")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}
