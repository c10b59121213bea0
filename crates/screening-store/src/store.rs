use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use screening_core::{Evaluation, ResultWriter, ScreenError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::str::FromStr;

use crate::models::*;

const STOCK_COLUMNS: &str = "ticker, company_name, price, safety_score, cash_engine_score, \
     roic_current, debt_to_equity, gross_margin, gross_margin_3yr_avg, fcf_yield, status, \
     failure_reasons, valuation_status, lie_detector_status, updated_at";

/// SQLite-backed result writer for the `stocks` table. Every statement binds
/// its values as parameters.
pub struct StockStore {
    pool: SqlitePool,
}

impl StockStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` and make sure
    /// the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url {}", database_url))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open {}", database_url))?;

        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stocks (
                ticker TEXT PRIMARY KEY NOT NULL,
                company_name TEXT NOT NULL,
                price REAL NOT NULL,
                safety_score REAL NOT NULL,
                cash_engine_score REAL NOT NULL,
                roic_current REAL NOT NULL,
                debt_to_equity REAL,
                gross_margin REAL,
                gross_margin_3yr_avg REAL,
                fcf_yield REAL NOT NULL,
                status TEXT NOT NULL,
                failure_reasons TEXT NOT NULL DEFAULT '',
                valuation_status TEXT NOT NULL,
                lie_detector_status TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stocks_status ON stocks(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert or replace the row for the evaluated ticker.
    pub async fn upsert(&self, evaluation: &Evaluation, updated_at: DateTime<Utc>) -> Result<()> {
        let c = &evaluation.classification;
        let failure_reasons = encode_reasons(&c.failure_reasons)
            .with_context(|| format!("cannot persist reasons for {}", c.ticker))?;

        sqlx::query(
            r#"
            INSERT INTO stocks (
                ticker, company_name, price, safety_score, cash_engine_score,
                roic_current, debt_to_equity, gross_margin, gross_margin_3yr_avg, fcf_yield,
                status, failure_reasons, valuation_status, lie_detector_status, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                company_name = excluded.company_name,
                price = excluded.price,
                safety_score = excluded.safety_score,
                cash_engine_score = excluded.cash_engine_score,
                roic_current = excluded.roic_current,
                debt_to_equity = excluded.debt_to_equity,
                gross_margin = excluded.gross_margin,
                gross_margin_3yr_avg = excluded.gross_margin_3yr_avg,
                fcf_yield = excluded.fcf_yield,
                status = excluded.status,
                failure_reasons = excluded.failure_reasons,
                valuation_status = excluded.valuation_status,
                lie_detector_status = excluded.lie_detector_status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&c.ticker)
        .bind(&c.company_name)
        .bind(c.price)
        .bind(c.safety_score)
        .bind(c.cash_engine_score)
        .bind(c.roic_current)
        .bind(finite(evaluation.metrics.debt_to_equity))
        .bind(finite(evaluation.metrics.gross_margin))
        .bind(finite(evaluation.metrics.gross_margin_history.average))
        .bind(c.fcf_yield)
        .bind(c.status.as_str())
        .bind(failure_reasons)
        .bind(c.valuation_status.as_str())
        .bind(c.lie_detector_status.as_str())
        .bind(timestamp(updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, ticker: &str) -> Result<Option<StoredStock>> {
        let row = sqlx::query_as::<_, StoredStock>(&format!(
            "SELECT {} FROM stocks WHERE ticker = ?",
            STOCK_COLUMNS
        ))
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Survivors sorted by quality (ROIC, best first).
    pub async fn survivors(&self) -> Result<Vec<StoredStock>> {
        let rows = sqlx::query_as::<_, StoredStock>(&format!(
            "SELECT {} FROM stocks WHERE status = ? ORDER BY roic_current DESC, ticker ASC",
            STOCK_COLUMNS
        ))
        .bind("SURVIVOR")
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rejected tickers sorted alphabetically.
    pub async fn rejected(&self) -> Result<Vec<StoredStock>> {
        let rows = sqlx::query_as::<_, StoredStock>(&format!(
            "SELECT {} FROM stocks WHERE status = ? ORDER BY ticker ASC",
            STOCK_COLUMNS
        ))
        .bind("REJECTED")
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn counts(&self) -> Result<StockCounts> {
        let (total_scanned, survivor_count): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) FROM stocks",
        )
        .bind("SURVIVOR")
        .fetch_one(&self.pool)
        .await?;

        Ok(StockCounts {
            total_scanned,
            survivor_count,
            rejected_count: total_scanned - survivor_count,
        })
    }

    /// Tickers written within `max_age` of `now`. Used to skip re-screening
    /// recently analysed companies.
    pub async fn fresh_tickers(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let cutoff = now
            .checked_sub_signed(max_age)
            .map(timestamp)
            .context("cache window out of range")?;
        let rows: Vec<(String,)> = sqlx::query_as("SELECT ticker FROM stocks WHERE updated_at >= ?")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

#[async_trait]
impl ResultWriter for StockStore {
    async fn write(
        &self,
        evaluation: &Evaluation,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ScreenError> {
        self.upsert(evaluation, updated_at).await.map_err(|e| {
            tracing::warn!("Failed to persist {}: {:#}", evaluation.classification.ticker, e);
            ScreenError::Storage(format!("{:#}", e))
        })
    }
}

fn finite(value: f64) -> Option<f64> {
    Some(value).filter(|v| v.is_finite())
}

// Fixed-width UTC so the TEXT column sorts chronologically.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
