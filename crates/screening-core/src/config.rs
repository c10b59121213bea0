use serde::{Deserialize, Serialize};
use std::env;

use crate::ScreenError;

/// Thresholds the screening engine is constructed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningConfig {
    /// 40 admits a D/E of up to 1.5.
    pub min_safety_score: u32,
    pub min_cash_engine_score: u32,
    /// FCF yield, in percent, above which a stock is a bargain.
    pub bargain_threshold: f64,
    pub fair_threshold: f64,
    /// Cash flow below this fraction of net income is suspicious.
    pub divergence_threshold: f64,
    /// Net income must be at least this fraction of revenue to be judged.
    pub materiality_ratio: f64,
    /// Used to derive NOPAT from operating income when NOPAT is absent.
    pub tax_rate: f64,
    /// Gross margin, in percent, a company with history is held to.
    pub min_gross_margin: f64,
    pub min_roic: f64,
    /// A history period below this fraction of the minimum is unstable.
    pub stability_floor_ratio: f64,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            min_safety_score: 40,
            min_cash_engine_score: 30,
            bargain_threshold: 8.0,
            fair_threshold: 4.5,
            divergence_threshold: 0.5,
            materiality_ratio: 0.01,
            tax_rate: 0.21,
            min_gross_margin: 45.0,
            min_roic: 25.0,
            stability_floor_ratio: 0.8,
        }
    }
}

impl ScreeningConfig {
    pub fn from_env() -> Result<Self, ScreenError> {
        let defaults = Self::default();
        let config = Self {
            min_safety_score: env_or("MIN_SAFETY_SCORE", defaults.min_safety_score)?,
            min_cash_engine_score: env_or("MIN_CASH_ENGINE_SCORE", defaults.min_cash_engine_score)?,
            bargain_threshold: env_or("BARGAIN_THRESHOLD", defaults.bargain_threshold)?,
            fair_threshold: env_or("FAIR_THRESHOLD", defaults.fair_threshold)?,
            divergence_threshold: env_or("DIVERGENCE_THRESHOLD", defaults.divergence_threshold)?,
            materiality_ratio: env_or("MATERIALITY_RATIO", defaults.materiality_ratio)?,
            tax_rate: env_or("TAX_RATE", defaults.tax_rate)?,
            min_gross_margin: env_or("MIN_GROSS_MARGIN", defaults.min_gross_margin)?,
            min_roic: env_or("MIN_ROIC", defaults.min_roic)?,
            stability_floor_ratio: env_or("STABILITY_FLOOR_RATIO", defaults.stability_floor_ratio)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScreenError> {
        if self.min_safety_score > 100 {
            return Err(ScreenError::InvalidConfig(format!(
                "min_safety_score must be within 0-100, got {}",
                self.min_safety_score
            )));
        }
        if self.min_cash_engine_score > 100 {
            return Err(ScreenError::InvalidConfig(format!(
                "min_cash_engine_score must be within 0-100, got {}",
                self.min_cash_engine_score
            )));
        }
        if !self.fair_threshold.is_finite() || !self.bargain_threshold.is_finite() {
            return Err(ScreenError::InvalidConfig(
                "valuation thresholds must be finite".to_string(),
            ));
        }
        if self.fair_threshold > self.bargain_threshold {
            return Err(ScreenError::InvalidConfig(format!(
                "fair_threshold ({}) must not exceed bargain_threshold ({})",
                self.fair_threshold, self.bargain_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.divergence_threshold) {
            return Err(ScreenError::InvalidConfig(format!(
                "divergence_threshold must be within 0-1, got {}",
                self.divergence_threshold
            )));
        }
        if !(self.materiality_ratio >= 0.0 && self.materiality_ratio.is_finite()) {
            return Err(ScreenError::InvalidConfig(format!(
                "materiality_ratio must be non-negative, got {}",
                self.materiality_ratio
            )));
        }
        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(ScreenError::InvalidConfig(format!(
                "tax_rate must be within [0, 1), got {}",
                self.tax_rate
            )));
        }
        if !self.min_gross_margin.is_finite() || !self.min_roic.is_finite() {
            return Err(ScreenError::InvalidConfig(
                "stability minimums must be finite".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.stability_floor_ratio) {
            return Err(ScreenError::InvalidConfig(format!(
                "stability_floor_ratio must be within 0-1, got {}",
                self.stability_floor_ratio
            )));
        }
        Ok(())
    }

    /// Worst-period gross margin and ROIC still considered stable.
    pub fn stability_floors(&self) -> (f64, f64) {
        (
            self.min_gross_margin * self.stability_floor_ratio,
            self.min_roic * self.stability_floor_ratio,
        )
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, ScreenError>
where
    T: std::str::FromStr + ToString,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ScreenError::InvalidConfig(format!("{} is not a valid number", key)))
}
