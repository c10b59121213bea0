use anyhow::{anyhow, bail, Result};
use screening_core::{Classification, LieDetectorStatus, SurvivalStatus, ValuationStatus};
use serde::{Deserialize, Serialize};

/// Separator between failure reasons in the `failure_reasons` column.
pub const REASON_DELIMITER: char = '|';

/// One row of the `stocks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredStock {
    pub ticker: String,
    pub company_name: String,
    pub price: f64,
    pub safety_score: f64,
    pub cash_engine_score: f64,
    pub roic_current: f64,
    /// NULL when not finite (zero or negative equity).
    pub debt_to_equity: Option<f64>,
    pub gross_margin: Option<f64>,
    /// Averaged over the history periods, or the current margin without history.
    pub gross_margin_3yr_avg: Option<f64>,
    pub fcf_yield: f64,
    pub status: String,
    pub failure_reasons: String,
    pub valuation_status: String,
    pub lie_detector_status: String,
    pub updated_at: String,
}

impl StoredStock {
    pub fn reasons(&self) -> Vec<String> {
        decode_reasons(&self.failure_reasons)
    }

    /// Rebuild the engine record from a stored row.
    pub fn to_classification(&self) -> Result<Classification> {
        Ok(Classification {
            ticker: self.ticker.clone(),
            company_name: self.company_name.clone(),
            price: self.price,
            roic_current: self.roic_current,
            fcf_yield: self.fcf_yield,
            safety_score: self.safety_score,
            cash_engine_score: self.cash_engine_score,
            valuation_status: ValuationStatus::parse(&self.valuation_status)
                .ok_or_else(|| anyhow!("unknown valuation_status '{}'", self.valuation_status))?,
            lie_detector_status: LieDetectorStatus::parse(&self.lie_detector_status)
                .ok_or_else(|| {
                    anyhow!("unknown lie_detector_status '{}'", self.lie_detector_status)
                })?,
            status: SurvivalStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown status '{}'", self.status))?,
            failure_reasons: self.reasons(),
        })
    }
}

/// Dashboard header figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCounts {
    pub total_scanned: i64,
    pub survivor_count: i64,
    pub rejected_count: i64,
}

/// Join reasons with `|`. A reason containing the delimiter is refused, since
/// it could not be split back apart.
pub fn encode_reasons(reasons: &[String]) -> Result<String> {
    if let Some(bad) = reasons.iter().find(|r| r.contains(REASON_DELIMITER)) {
        bail!("failure reason contains delimiter '{}': {}", REASON_DELIMITER, bad);
    }
    Ok(reasons.join(&REASON_DELIMITER.to_string()))
}

pub fn decode_reasons(encoded: &str) -> Vec<String> {
    if encoded.is_empty() {
        return Vec::new();
    }
    encoded.split(REASON_DELIMITER).map(|r| r.to_string()).collect()
}
