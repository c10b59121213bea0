use screening_core::{DegenerateInput, LieDetectorStatus, PeriodStats, ScoreSet, Verdict};

pub const REASON_HIGH_LEVERAGE: &str = "High leverage / fragile balance sheet";
pub const REASON_WEAK_EFFICIENCY: &str = "Weak capital efficiency";
pub const REASON_CASH_MISMATCH: &str = "Accounting/cash-flow mismatch";
pub const REASON_NO_CASH_YIELD: &str = "Negative or zero free cash flow yield";
pub const REASON_UNSTABLE_MARGIN: &str =
    "Unstable moat: gross margin dipped below the stability floor";
pub const REASON_UNSTABLE_ROIC: &str = "Unstable engine: ROIC dipped below the stability floor";

/// One screening rule. Rules run in `GateCheck::ORDER`; a failing rule
/// appends its reason and evaluation continues with the next rule. The two
/// stability rules only judge companies that supplied history periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateCheck {
    Leverage,
    CapitalEfficiency,
    EarningsQuality,
    CashYield,
    MarginStability,
    RoicStability,
}

impl GateCheck {
    pub const ORDER: [GateCheck; 6] = [
        GateCheck::Leverage,
        GateCheck::CapitalEfficiency,
        GateCheck::EarningsQuality,
        GateCheck::CashYield,
        GateCheck::MarginStability,
        GateCheck::RoicStability,
    ];

    pub fn reason(&self) -> &'static str {
        match self {
            GateCheck::Leverage => REASON_HIGH_LEVERAGE,
            GateCheck::CapitalEfficiency => REASON_WEAK_EFFICIENCY,
            GateCheck::EarningsQuality => REASON_CASH_MISMATCH,
            GateCheck::CashYield => REASON_NO_CASH_YIELD,
            GateCheck::MarginStability => REASON_UNSTABLE_MARGIN,
            GateCheck::RoicStability => REASON_UNSTABLE_ROIC,
        }
    }
}

/// What the gate looks at for one ticker.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub scores: ScoreSet,
    pub lie_detector_status: LieDetectorStatus,
    pub fcf_yield: f64,
    pub gross_margin_history: PeriodStats,
    pub roic_history: PeriodStats,
    pub degenerate: &'a [DegenerateInput],
}

pub struct SurvivalGate {
    min_safety_score: f64,
    min_cash_engine_score: f64,
    gross_margin_floor: f64,
    roic_floor: f64,
}

impl SurvivalGate {
    /// Stability floors start disabled.
    pub fn new(min_safety_score: u32, min_cash_engine_score: u32) -> Self {
        Self {
            min_safety_score: min_safety_score as f64,
            min_cash_engine_score: min_cash_engine_score as f64,
            gross_margin_floor: f64::NEG_INFINITY,
            roic_floor: f64::NEG_INFINITY,
        }
    }

    /// Reject companies whose worst history period falls below these
    /// percentages.
    pub fn with_stability_floors(mut self, gross_margin_floor: f64, roic_floor: f64) -> Self {
        self.gross_margin_floor = gross_margin_floor;
        self.roic_floor = roic_floor;
        self
    }

    // Negated comparisons so NaN fails the check.
    fn fails(&self, check: GateCheck, input: &GateInput<'_>) -> bool {
        match check {
            GateCheck::Leverage => !(input.scores.safety_score >= self.min_safety_score),
            GateCheck::CapitalEfficiency => {
                !(input.scores.cash_engine_score >= self.min_cash_engine_score)
            }
            GateCheck::EarningsQuality => {
                input.lie_detector_status == LieDetectorStatus::Suspicious
            }
            GateCheck::CashYield => !(input.fcf_yield > 0.0),
            GateCheck::MarginStability => {
                unstable(&input.gross_margin_history, self.gross_margin_floor)
            }
            GateCheck::RoicStability => unstable(&input.roic_history, self.roic_floor),
        }
    }

    /// Run every rule and collect all failing reasons. Degenerate inputs
    /// recorded by the metric calculator each add a final disqualifying
    /// reason.
    pub fn evaluate(&self, input: &GateInput<'_>) -> Verdict {
        let mut reasons: Vec<String> = GateCheck::ORDER
            .iter()
            .filter(|check| self.fails(**check, input))
            .map(|check| check.reason().to_string())
            .collect();

        reasons.extend(
            input
                .degenerate
                .iter()
                .map(|d| format!("Degenerate input: {}", d.describe())),
        );

        Verdict::from_reasons(reasons)
    }
}

fn unstable(history: &PeriodStats, floor: f64) -> bool {
    history.periods > 0 && !(history.worst >= floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use screening_core::SurvivalStatus;

    fn gate() -> SurvivalGate {
        SurvivalGate::new(40, 30)
    }

    fn input(safety: f64, cash: f64, lie: LieDetectorStatus, fcf_yield: f64) -> GateInput<'static> {
        GateInput {
            scores: ScoreSet {
                safety_score: safety,
                cash_engine_score: cash,
            },
            lie_detector_status: lie,
            fcf_yield,
            gross_margin_history: PeriodStats::current_only(60.0),
            roic_history: PeriodStats::current_only(30.0),
            degenerate: &[],
        }
    }

    fn stable_gate() -> SurvivalGate {
        SurvivalGate::new(40, 30).with_stability_floors(36.0, 20.0)
    }

    #[test]
    fn test_clean_company_survives() {
        let verdict = gate().evaluate(&input(90.0, 90.0, LieDetectorStatus::Clean, 10.0));
        assert_eq!(verdict.status, SurvivalStatus::Survivor);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_reasons_accumulate_in_order() {
        let verdict = gate().evaluate(&input(20.0, 90.0, LieDetectorStatus::Clean, -2.0));
        assert_eq!(verdict.status, SurvivalStatus::Rejected);
        assert_eq!(verdict.reasons, vec![REASON_HIGH_LEVERAGE, REASON_NO_CASH_YIELD]);
    }

    #[test]
    fn test_every_rule_can_fail_together() {
        let verdict = gate().evaluate(&input(0.0, 0.0, LieDetectorStatus::Suspicious, 0.0));
        assert_eq!(
            verdict.reasons,
            vec![
                REASON_HIGH_LEVERAGE,
                REASON_WEAK_EFFICIENCY,
                REASON_CASH_MISMATCH,
                REASON_NO_CASH_YIELD
            ]
        );
    }

    #[test]
    fn test_minimums_are_inclusive() {
        let verdict = gate().evaluate(&input(40.0, 30.0, LieDetectorStatus::Clean, 0.01));
        assert_eq!(verdict.status, SurvivalStatus::Survivor);

        let verdict = gate().evaluate(&input(39.999, 30.0, LieDetectorStatus::Clean, 0.01));
        assert_eq!(verdict.reasons, vec![REASON_HIGH_LEVERAGE]);
    }

    #[test]
    fn test_suspicious_alone_rejects() {
        let verdict = gate().evaluate(&input(90.0, 90.0, LieDetectorStatus::Suspicious, 10.0));
        assert_eq!(verdict.reasons, vec![REASON_CASH_MISMATCH]);
    }

    #[test]
    fn test_degenerate_inputs_disqualify_after_rules() {
        let degenerate = [DegenerateInput::NonPositiveInvestedCapital];
        let verdict = gate().evaluate(&GateInput {
            degenerate: &degenerate,
            ..input(90.0, 90.0, LieDetectorStatus::Clean, -1.0)
        });
        assert_eq!(
            verdict.reasons,
            vec![
                REASON_NO_CASH_YIELD.to_string(),
                "Degenerate input: invested capital is zero or negative".to_string()
            ]
        );
    }

    #[test]
    fn test_shaky_history_fails_stability_after_core_rules() {
        let verdict = stable_gate().evaluate(&GateInput {
            gross_margin_history: PeriodStats::from_periods(&[55.0, 30.0, 50.0], 60.0),
            roic_history: PeriodStats::from_periods(&[25.0, 12.0], 30.0),
            ..input(20.0, 90.0, LieDetectorStatus::Clean, 6.0)
        });
        assert_eq!(
            verdict.reasons,
            vec![REASON_HIGH_LEVERAGE, REASON_UNSTABLE_MARGIN, REASON_UNSTABLE_ROIC]
        );
    }

    #[test]
    fn test_stability_needs_history() {
        // current-period values below the floors are judged by the core rules only
        let verdict = stable_gate().evaluate(&GateInput {
            gross_margin_history: PeriodStats::current_only(10.0),
            roic_history: PeriodStats::current_only(5.0),
            ..input(90.0, 90.0, LieDetectorStatus::Clean, 6.0)
        });
        assert_eq!(verdict.status, SurvivalStatus::Survivor);
    }

    #[test]
    fn test_stability_floor_is_inclusive() {
        let verdict = stable_gate().evaluate(&GateInput {
            gross_margin_history: PeriodStats::from_periods(&[36.0, 70.0], 60.0),
            roic_history: PeriodStats::from_periods(&[20.0], 30.0),
            ..input(90.0, 90.0, LieDetectorStatus::Clean, 6.0)
        });
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_floors_are_off_by_default() {
        let verdict = gate().evaluate(&GateInput {
            gross_margin_history: PeriodStats::from_periods(&[-40.0], 60.0),
            roic_history: PeriodStats::from_periods(&[-90.0], 30.0),
            ..input(90.0, 90.0, LieDetectorStatus::Clean, 6.0)
        });
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_nan_scores_fail_closed() {
        let nan = f64::NAN;
        let verdict = gate().evaluate(&input(nan, nan, LieDetectorStatus::Clean, nan));
        assert_eq!(verdict.reasons.len(), 3);
    }

    #[test]
    fn test_reasons_never_contain_delimiter() {
        for check in GateCheck::ORDER {
            assert!(!check.reason().contains('|'));
        }
    }
}
