use screening_core::{DerivedMetrics, LieDetectorStatus};

/// Flags profits that are not backed by cash.
///
/// A company is `Suspicious` only when it reports a material profit
/// (net income at least `materiality_ratio` of revenue) and its free cash
/// flow falls below `divergence_threshold` times that profit. Loss-making
/// companies are never flagged.
pub struct EarningsQualityDetector {
    divergence_threshold: f64,
    materiality_ratio: f64,
}

impl EarningsQualityDetector {
    pub fn new(divergence_threshold: f64, materiality_ratio: f64) -> Self {
        Self {
            divergence_threshold,
            materiality_ratio,
        }
    }

    pub fn assess(&self, metrics: &DerivedMetrics) -> LieDetectorStatus {
        let net_income = metrics.net_income;
        if net_income.is_nan() || net_income <= 0.0 {
            return LieDetectorStatus::Clean;
        }

        let net_margin = net_income / metrics.revenue.abs().max(1.0);
        if net_margin < self.materiality_ratio {
            return LieDetectorStatus::Clean;
        }

        // cash at or above profit
        if metrics.earnings_cash_divergence <= 0.0 {
            return LieDetectorStatus::Clean;
        }

        if metrics.free_cash_flow < net_income * self.divergence_threshold {
            LieDetectorStatus::Suspicious
        } else {
            LieDetectorStatus::Clean
        }
    }
}
