//! screener: Run acquired fundamentals through the survival gate and persist
//! the verdicts to the `stocks` table.
//!
//! Usage:
//!   cargo run -p screener -- --input financials.json
//!   cargo run -p screener -- --input financials.json --db stocks.db --cache-days 0
//!   cargo run -p screener -- --input financials.json --dry-run --json report.json

mod input;

use anyhow::Context;
use chrono::{Duration, Utc};
use fundamental_screener::{ExecutionMode, FundamentalScreeningEngine};
use screening_core::{BatchSummary, Classification, ResultWriter, ScreeningConfig, SurvivalStatus};
use screening_store::StockStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_DATABASE_URL: &str = "sqlite:stocks.db";
const DEFAULT_CACHE_DAYS: i64 = 7;
const MAX_REASON_LOG_CHARS: usize = 100;

#[derive(Serialize)]
struct RunOutput<'a> {
    summary: BatchSummary,
    survivors: Vec<&'a Classification>,
    rejected: Vec<&'a Classification>,
    excluded: Vec<ExcludedTicker>,
}

#[derive(Serialize)]
struct ExcludedTicker {
    ticker: String,
    reason: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "screener=info,fundamental_screener=info,screening_store=warn".into()
                }),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let dry_run = args.iter().any(|a| a == "--dry-run");
    let sequential = args.iter().any(|a| a == "--sequential");

    let flag_value = |name: &str| -> Option<String> {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let input_path = match flag_value("--input") {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("Usage:");
            eprintln!("  screener --input PATH            JSON array of per-ticker financials");
            eprintln!("");
            eprintln!("Options:");
            eprintln!("  --db PATH          SQLite DB path (default: $DATABASE_URL or stocks.db)");
            eprintln!("  --dry-run          Screen and report without writing to DB");
            eprintln!(
                "  --cache-days N     Skip tickers screened within N days (default: {}, 0 = off)",
                DEFAULT_CACHE_DAYS
            );
            eprintln!("  --sequential       Screen on the current thread only");
            eprintln!("  --json PATH        Also write the run report as JSON");
            std::process::exit(1);
        }
    };

    let database_url = flag_value("--db")
        .map(|path| format!("sqlite:{}", path))
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    let cache_days: i64 = match flag_value("--cache-days") {
        Some(v) => v.parse().with_context(|| format!("invalid --cache-days '{}'", v))?,
        None => std::env::var("CACHE_DURATION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CACHE_DAYS),
    };

    let cache_max_age = cache_window(cache_days)?;

    let json_path = flag_value("--json").map(PathBuf::from);
    let mode = if sequential {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Parallel
    };

    let config = ScreeningConfig::from_env()?;
    let engine = Arc::new(FundamentalScreeningEngine::new(config)?);

    tracing::info!(
        "screener: input={}, db={}, dry_run={}, cache_days={}, mode={:?}",
        input_path.display(),
        database_url,
        dry_run,
        cache_days,
        mode
    );

    let loaded = input::load_records(&input_path)?;
    for bad in &loaded.malformed {
        tracing::warn!("⚠️ entry {} skipped: {}", bad.ticker, bad.error);
    }

    let store = if dry_run {
        None
    } else {
        Some(StockStore::connect(&database_url).await?)
    };

    let mut records = loaded.records;
    if let (Some(store), Some(window)) = (&store, cache_max_age) {
        let fresh = store.fresh_tickers(window, Utc::now()).await?;
        let (cached, pending): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|raw| fresh.contains(&raw.ticker));
        records = pending;

        for raw in &cached {
            match store.get(&raw.ticker).await? {
                Some(row) => tracing::info!(
                    "{}",
                    verdict_line(
                        &row.ticker,
                        row.status == SurvivalStatus::Survivor.as_str(),
                        row.fcf_yield,
                        &row.reasons(),
                        true
                    )
                ),
                None => tracing::info!("⚡ {} [CACHED]", raw.ticker),
            }
        }
    }

    if records.is_empty() && !loaded.malformed.is_empty() {
        anyhow::bail!("no readable records in {}", input_path.display());
    }
    if records.is_empty() {
        tracing::info!(
            "Nothing to screen: every ticker is within the {}-day cache window",
            cache_days
        );
        return Ok(());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("🛑 Interrupt received, finishing in-flight tickers");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let started = Instant::now();
    let total_records = records.len();
    let mut report = {
        let engine = Arc::clone(&engine);
        let cancel = Arc::clone(&cancel);
        tokio::task::spawn_blocking(move || {
            let done = AtomicUsize::new(0);
            engine.run_batch_observed(&records, mode, Some(&cancel), |ticker| {
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!("[{}/{}] {}", n, total_records, ticker);
            })
        })
        .await??
    };
    report.exclusions.extend(loaded.malformed);

    for c in report.classifications() {
        tracing::info!(
            "{}",
            verdict_line(&c.ticker, c.is_survivor(), c.fcf_yield, &c.failure_reasons, false)
        );
    }

    if let Some(store) = &store {
        let updated_at = Utc::now();
        let mut written = 0usize;
        let mut failed = 0usize;
        for evaluation in &report.evaluations {
            match store.write(evaluation, updated_at).await {
                Ok(()) => written += 1,
                Err(_) => failed += 1,
            }
        }
        tracing::info!("💾 Persisted {} rows ({} failed)", written, failed);
    }

    let summary = report.summary();
    if summary.unscheduled_count > 0 {
        tracing::warn!("{} tickers were never started", summary.unscheduled_count);
    }

    if let Some(path) = &json_path {
        let output = RunOutput {
            summary,
            survivors: report.survivors(),
            rejected: report.rejected(),
            excluded: report
                .exclusions
                .iter()
                .map(|e| ExcludedTicker {
                    ticker: e.ticker.clone(),
                    reason: e.error.to_string(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&output)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }

    let elapsed = started.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 {
        total_records as f64 / elapsed
    } else {
        total_records as f64
    };
    tracing::info!(
        "✅ DONE. Screened {} tickers in {:.2} seconds: {} survivors, {} rejected, {} excluded",
        total_records,
        elapsed,
        summary.survivor_count,
        summary.rejected_count,
        summary.excluded_count
    );
    tracing::info!("⚡ Speed: {:.1} tickers/second", rate);

    Ok(())
}

/// `None` when caching is off. Windows chrono cannot represent are refused.
fn cache_window(days: i64) -> anyhow::Result<Option<Duration>> {
    if days <= 0 {
        return Ok(None);
    }
    let window = Duration::try_days(days)
        .filter(|w| Utc::now().checked_sub_signed(*w).is_some())
        .with_context(|| format!("cache window of {} days is out of range", days))?;
    Ok(Some(window))
}

fn verdict_line(
    ticker: &str,
    survivor: bool,
    fcf_yield: f64,
    reasons: &[String],
    cached: bool,
) -> String {
    let tag = if cached { " [CACHED]" } else { "" };
    if survivor {
        return format!("🟢 {}{}: SURVIVOR (Yield: {:.1}%)", ticker, tag, fcf_yield);
    }
    let joined = reasons.join(", ");
    let short: String = joined.chars().take(MAX_REASON_LOG_CHARS).collect();
    let ellipsis = if short.len() < joined.len() { "..." } else { "" };
    format!("🔴 {}{}: {}{}", ticker, tag, short, ellipsis)
}
