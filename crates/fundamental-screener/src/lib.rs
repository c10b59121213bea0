pub mod lie_detector;
pub mod metrics;
pub mod scoring;
pub mod survival_gate;
pub mod valuation;

use rayon::prelude::*;
use screening_core::{
    BatchReport, Classification, Evaluation, Exclusion, RawFinancials, ScreenError, ScreeningConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

pub use lie_detector::EarningsQualityDetector;
pub use metrics::{MetricCalculator, StatementInputs};
pub use survival_gate::{GateCheck, GateInput, SurvivalGate};
pub use valuation::ValuationClassifier;

/// How a batch is spread over threads. Both modes produce identical output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Sequential,
}

enum Outcome {
    Evaluated(Evaluation),
    Excluded(Exclusion),
    Unscheduled,
}

/// Runs raw financials through metrics, scoring, the lie detector,
/// valuation and the survival gate.
pub struct FundamentalScreeningEngine {
    calculator: MetricCalculator,
    detector: EarningsQualityDetector,
    classifier: ValuationClassifier,
    gate: SurvivalGate,
}

impl FundamentalScreeningEngine {
    pub fn new(config: ScreeningConfig) -> Result<Self, ScreenError> {
        config.validate()?;
        let (gross_margin_floor, roic_floor) = config.stability_floors();
        Ok(Self {
            calculator: MetricCalculator::new(config.tax_rate),
            detector: EarningsQualityDetector::new(
                config.divergence_threshold,
                config.materiality_ratio,
            ),
            classifier: ValuationClassifier::new(config.bargain_threshold, config.fair_threshold),
            gate: SurvivalGate::new(config.min_safety_score, config.min_cash_engine_score)
                .with_stability_floors(gross_margin_floor, roic_floor),
        })
    }

    /// Classify a single ticker. Fails only with `InsufficientData`;
    /// degenerate denominators are recovered and end up as failure reasons.
    pub fn evaluate(&self, raw: &RawFinancials) -> Result<Evaluation, ScreenError> {
        let inputs = self.calculator.normalize(raw)?;
        let metrics = self.calculator.derive(&inputs);

        if !metrics.degenerate.is_empty() {
            tracing::warn!(
                "{}: degenerate inputs {:?}, substituting sentinels",
                raw.ticker,
                metrics.degenerate.iter().map(|d| d.field()).collect::<Vec<_>>()
            );
        }

        let scores = scoring::score(&metrics);
        let lie_detector_status = self.detector.assess(&metrics);
        let valuation_status = self.classifier.classify(metrics.fcf_yield);
        let verdict = self.gate.evaluate(&GateInput {
            scores,
            lie_detector_status,
            fcf_yield: metrics.fcf_yield,
            gross_margin_history: metrics.gross_margin_history,
            roic_history: metrics.roic_history,
            degenerate: &metrics.degenerate,
        });

        tracing::debug!(
            "{}: roic={:.2}% fcf_yield={:.2}% d/e={:.2} gm={:.2}% safety={:.1} cash={:.1}",
            raw.ticker,
            metrics.roic_current,
            metrics.fcf_yield,
            metrics.debt_to_equity,
            metrics.gross_margin,
            scores.safety_score,
            scores.cash_engine_score
        );

        let classification = Classification {
            ticker: raw.ticker.clone(),
            company_name: raw.display_name().to_string(),
            price: inputs.price,
            roic_current: metrics.roic_current,
            fcf_yield: metrics.fcf_yield,
            safety_score: scores.safety_score,
            cash_engine_score: scores.cash_engine_score,
            valuation_status,
            lie_detector_status,
            status: verdict.status,
            failure_reasons: verdict.reasons,
        };

        Ok(Evaluation {
            metrics,
            scores,
            classification,
        })
    }

    /// Screen a batch on the rayon pool.
    pub fn evaluate_batch(&self, records: &[RawFinancials]) -> Result<BatchReport, ScreenError> {
        self.run_batch(records, ExecutionMode::Parallel, None)
    }

    /// Screen a batch, checking `cancel` before each ticker is started.
    /// Tickers already running finish; the rest are counted as unscheduled.
    pub fn evaluate_batch_with_cancel(
        &self,
        records: &[RawFinancials],
        mode: ExecutionMode,
        cancel: &AtomicBool,
    ) -> Result<BatchReport, ScreenError> {
        self.run_batch(records, mode, Some(cancel))
    }

    pub fn run_batch(
        &self,
        records: &[RawFinancials],
        mode: ExecutionMode,
        cancel: Option<&AtomicBool>,
    ) -> Result<BatchReport, ScreenError> {
        self.run_batch_observed(records, mode, cancel, |_| {})
    }

    /// Like `run_batch`, calling `on_finished` with the ticker of every
    /// record that was evaluated or excluded, as soon as it is done.
    pub fn run_batch_observed<F>(
        &self,
        records: &[RawFinancials],
        mode: ExecutionMode,
        cancel: Option<&AtomicBool>,
        on_finished: F,
    ) -> Result<BatchReport, ScreenError>
    where
        F: Fn(&str) + Sync,
    {
        if records.is_empty() {
            return Err(ScreenError::EmptyBatch);
        }

        let superseded = superseded_records(records);

        let task = |(idx, raw): (usize, &RawFinancials)| -> Outcome {
            if cancel.map_or(false, |c| c.load(Ordering::Relaxed)) {
                return Outcome::Unscheduled;
            }
            let outcome = if superseded[idx] {
                Outcome::Excluded(Exclusion {
                    ticker: raw.ticker.clone(),
                    error: ScreenError::Superseded(raw.ticker.clone()),
                })
            } else {
                match self.evaluate(raw) {
                    Ok(evaluation) => Outcome::Evaluated(evaluation),
                    Err(error) => {
                        tracing::warn!("{} excluded: {}", raw.ticker, error);
                        Outcome::Excluded(Exclusion {
                            ticker: raw.ticker.clone(),
                            error,
                        })
                    }
                }
            };
            on_finished(&raw.ticker);
            outcome
        };

        let outcomes: Vec<Outcome> = match mode {
            ExecutionMode::Parallel => records.par_iter().enumerate().map(&task).collect(),
            ExecutionMode::Sequential => records.iter().enumerate().map(&task).collect(),
        };

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Evaluated(evaluation) => report.evaluations.push(evaluation),
                Outcome::Excluded(exclusion) => report.exclusions.push(exclusion),
                Outcome::Unscheduled => report.unscheduled += 1,
            }
        }

        let summary = report.summary();
        tracing::info!(
            "Screen complete: {} classified ({} survivors, {} rejected), {} excluded, {} unscheduled",
            summary.total_scanned,
            summary.survivor_count,
            summary.rejected_count,
            summary.excluded_count,
            summary.unscheduled_count
        );

        Ok(report)
    }
}

/// Marks every record that a later record with the same ticker replaces.
fn superseded_records(records: &[RawFinancials]) -> Vec<bool> {
    let mut last_seen: HashMap<&str, usize> = HashMap::new();
    for (idx, raw) in records.iter().enumerate() {
        last_seen.insert(raw.ticker.as_str(), idx);
    }
    records
        .iter()
        .enumerate()
        .map(|(idx, raw)| last_seen.get(raw.ticker.as_str()) != Some(&idx))
        .collect()
}
