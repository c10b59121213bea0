use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ScreenError;

/// Raw per-company statement fields for one evaluation run.
///
/// Every numeric field is optional: acquisition sources routinely omit
/// fields or hand back `null`, `NaN` or free text. Anything that is not a
/// finite number is read as missing and left for the metric calculator to
/// report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinancials {
    #[serde(alias = "symbol")]
    pub ticker: String,
    #[serde(default, alias = "shortName")]
    pub company_name: Option<String>,
    #[serde(default, alias = "currentPrice", deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub invested_capital: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub nopat: Option<f64>,
    #[serde(default, alias = "operatingIncome", deserialize_with = "lenient_f64")]
    pub operating_income: Option<f64>,
    #[serde(default, alias = "totalDebt", deserialize_with = "lenient_f64")]
    pub total_debt: Option<f64>,
    #[serde(default, alias = "totalStockholderEquity", deserialize_with = "lenient_f64")]
    pub total_equity: Option<f64>,
    #[serde(default, alias = "totalRevenue", deserialize_with = "lenient_f64")]
    pub revenue: Option<f64>,
    #[serde(default, alias = "costOfRevenue", deserialize_with = "lenient_f64")]
    pub cost_of_goods_sold: Option<f64>,
    #[serde(default, alias = "freeCashflow", deserialize_with = "lenient_f64")]
    pub free_cash_flow: Option<f64>,
    #[serde(default, alias = "netIncomeToCommon", deserialize_with = "lenient_f64")]
    pub net_income: Option<f64>,
    #[serde(default, alias = "marketCap", deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
    #[serde(default, alias = "sharesOutstanding", deserialize_with = "lenient_f64")]
    pub shares_outstanding: Option<f64>,
    /// Prior annual statements, most recent first. Only the first
    /// `HISTORY_PERIODS` are used.
    #[serde(default)]
    pub history: Vec<PeriodFinancials>,
}

/// Number of annual periods averaged for the stability checks.
pub const HISTORY_PERIODS: usize = 3;

/// One annual statement from a company's history. A period missing the
/// fields for a ratio simply does not contribute to that ratio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodFinancials {
    #[serde(default, alias = "totalRevenue", deserialize_with = "lenient_f64")]
    pub revenue: Option<f64>,
    #[serde(default, alias = "grossProfit", deserialize_with = "lenient_f64")]
    pub gross_profit: Option<f64>,
    #[serde(default, alias = "costOfRevenue", deserialize_with = "lenient_f64")]
    pub cost_of_goods_sold: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub nopat: Option<f64>,
    #[serde(default, alias = "operatingIncome", deserialize_with = "lenient_f64")]
    pub operating_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub invested_capital: Option<f64>,
    #[serde(default, alias = "totalDebt", deserialize_with = "lenient_f64")]
    pub total_debt: Option<f64>,
    #[serde(default, alias = "totalStockholderEquity", deserialize_with = "lenient_f64")]
    pub total_equity: Option<f64>,
}

impl RawFinancials {
    /// Empty record for `ticker`; every statement field missing.
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            company_name: None,
            price: None,
            invested_capital: None,
            nopat: None,
            operating_income: None,
            total_debt: None,
            total_equity: None,
            revenue: None,
            cost_of_goods_sold: None,
            free_cash_flow: None,
            net_income: None,
            market_cap: None,
            shares_outstanding: None,
            history: Vec::new(),
        }
    }

    /// Parse one record out of an acquisition payload.
    pub fn from_value(value: Value) -> Result<Self, ScreenError> {
        let label = value
            .get("ticker")
            .or_else(|| value.get("symbol"))
            .and_then(|t| t.as_str())
            .unwrap_or("<unknown>")
            .to_string();
        serde_json::from_value(value)
            .map_err(|e| ScreenError::Malformed(format!("{}: {}", label, e)))
    }

    pub fn display_name(&self) -> &str {
        match self.company_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.ticker,
        }
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(numeric_value))
}

fn numeric_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

/// A denominator the metric calculator could not divide by. Each one is
/// replaced by a sentinel and later surfaced as a failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateInput {
    NonPositiveInvestedCapital,
    NonPositiveMarketCap,
    NonPositiveRevenue,
}

impl DegenerateInput {
    pub fn field(&self) -> &'static str {
        match self {
            DegenerateInput::NonPositiveInvestedCapital => "invested_capital",
            DegenerateInput::NonPositiveMarketCap => "market_cap",
            DegenerateInput::NonPositiveRevenue => "revenue",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            DegenerateInput::NonPositiveInvestedCapital => "invested capital is zero or negative",
            DegenerateInput::NonPositiveMarketCap => "market capitalization is zero or negative",
            DegenerateInput::NonPositiveRevenue => "revenue is zero or negative",
        }
    }
}

/// Ratios derived from one `RawFinancials`. Percentages are kept at full
/// precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub roic_current: f64,
    pub fcf_yield: f64,
    /// `+inf` when equity is zero or negative.
    pub debt_to_equity: f64,
    pub gross_margin: f64,
    pub earnings_cash_divergence: f64,
    pub net_income: f64,
    pub free_cash_flow: f64,
    pub revenue: f64,
    pub gross_margin_history: PeriodStats,
    pub roic_history: PeriodStats,
    #[serde(default)]
    pub degenerate: Vec<DegenerateInput>,
}

/// Average and worst value of a ratio across usable history periods. With no
/// usable period, both carry the current-period value and `periods` is 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub periods: usize,
    pub average: f64,
    pub worst: f64,
}

impl PeriodStats {
    pub fn current_only(value: f64) -> Self {
        Self {
            periods: 0,
            average: value,
            worst: value,
        }
    }

    /// Falls back to `current` when `values` is empty.
    pub fn from_periods(values: &[f64], current: f64) -> Self {
        if values.is_empty() {
            return Self::current_only(current);
        }
        Self {
            periods: values.len(),
            average: values.iter().sum::<f64>() / values.len() as f64,
            worst: values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub safety_score: f64,
    pub cash_engine_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValuationStatus {
    Bargain,
    Fair,
    Pricey,
}

impl ValuationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationStatus::Bargain => "BARGAIN",
            ValuationStatus::Fair => "FAIR",
            ValuationStatus::Pricey => "PRICEY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BARGAIN" => Some(ValuationStatus::Bargain),
            "FAIR" => Some(ValuationStatus::Fair),
            "PRICEY" => Some(ValuationStatus::Pricey),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LieDetectorStatus {
    Clean,
    Suspicious,
}

impl LieDetectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LieDetectorStatus::Clean => "CLEAN",
            LieDetectorStatus::Suspicious => "SUSPICIOUS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLEAN" => Some(LieDetectorStatus::Clean),
            "SUSPICIOUS" => Some(LieDetectorStatus::Suspicious),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurvivalStatus {
    Survivor,
    Rejected,
}

impl SurvivalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurvivalStatus::Survivor => "SURVIVOR",
            SurvivalStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SURVIVOR" => Some(SurvivalStatus::Survivor),
            "REJECTED" => Some(SurvivalStatus::Rejected),
            _ => None,
        }
    }
}

/// Survival gate output: the verdict plus every failing criterion, in check
/// order. `reasons` is empty iff the status is `Survivor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: SurvivalStatus,
    pub reasons: Vec<String>,
}

impl Verdict {
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        let status = if reasons.is_empty() {
            SurvivalStatus::Survivor
        } else {
            SurvivalStatus::Rejected
        };
        Self { status, reasons }
    }
}

/// The record handed to the result writer and the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub ticker: String,
    pub company_name: String,
    pub price: f64,
    pub roic_current: f64,
    pub fcf_yield: f64,
    pub safety_score: f64,
    pub cash_engine_score: f64,
    pub valuation_status: ValuationStatus,
    pub lie_detector_status: LieDetectorStatus,
    pub status: SurvivalStatus,
    pub failure_reasons: Vec<String>,
}

impl Classification {
    pub fn is_survivor(&self) -> bool {
        self.status == SurvivalStatus::Survivor
    }
}

/// Everything computed for one ticker in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub metrics: DerivedMetrics,
    pub scores: ScoreSet,
    pub classification: Classification,
}

/// A ticker left out of a run's output, with the reason it was left out.
#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub ticker: String,
    pub error: ScreenError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_scanned: usize,
    pub survivor_count: usize,
    pub rejected_count: usize,
    pub excluded_count: usize,
    pub unscheduled_count: usize,
}

/// Result of screening a batch. `evaluations` keeps input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub evaluations: Vec<Evaluation>,
    pub exclusions: Vec<Exclusion>,
    /// Records never started because the run was cancelled.
    pub unscheduled: usize,
}

impl BatchReport {
    pub fn classifications(&self) -> impl Iterator<Item = &Classification> {
        self.evaluations.iter().map(|e| &e.classification)
    }

    pub fn summary(&self) -> BatchSummary {
        let total_scanned = self.evaluations.len();
        let survivor_count = self.classifications().filter(|c| c.is_survivor()).count();
        BatchSummary {
            total_scanned,
            survivor_count,
            rejected_count: total_scanned - survivor_count,
            excluded_count: self.exclusions.len(),
            unscheduled_count: self.unscheduled,
        }
    }

    /// Survivors, best ROIC first.
    pub fn survivors(&self) -> Vec<&Classification> {
        let mut survivors: Vec<&Classification> =
            self.classifications().filter(|c| c.is_survivor()).collect();
        survivors.sort_by(|a, b| {
            b.roic_current
                .total_cmp(&a.roic_current)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });
        survivors
    }

    /// Rejected tickers in alphabetical order.
    pub fn rejected(&self) -> Vec<&Classification> {
        let mut rejected: Vec<&Classification> =
            self.classifications().filter(|c| !c.is_survivor()).collect();
        rejected.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        rejected
    }
}
