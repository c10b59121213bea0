use screening_core::{DerivedMetrics, ScoreSet};

/// Share of the cash-engine score carried by ROIC.
pub const ROIC_WEIGHT: f64 = 0.6;
/// Share of the cash-engine score carried by gross margin.
pub const GROSS_MARGIN_WEIGHT: f64 = 0.4;

/// Leverage score on `100 / (1 + D/E)`.
///
/// Anchors: D/E 0 scores 100, D/E 1.0 scores 50, and the score approaches 0
/// as D/E grows without bound (`+inf` scores exactly 0). Negative D/E (net
/// negative debt) is treated as no debt. NaN is treated as maximal risk.
pub fn safety_score(debt_to_equity: f64) -> f64 {
    if debt_to_equity.is_nan() {
        return 0.0;
    }
    let leverage = debt_to_equity.max(0.0);
    (100.0 / (1.0 + leverage)).clamp(0.0, 100.0)
}

/// Weighted blend of ROIC and gross margin, each clamped to 0-100 first.
pub fn cash_engine_score(roic_current: f64, gross_margin: f64) -> f64 {
    let blended =
        ROIC_WEIGHT * unit_percent(roic_current) + GROSS_MARGIN_WEIGHT * unit_percent(gross_margin);
    blended.clamp(0.0, 100.0)
}

fn unit_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

pub fn score(metrics: &DerivedMetrics) -> ScoreSet {
    ScoreSet {
        safety_score: safety_score(metrics.debt_to_equity),
        cash_engine_score: cash_engine_score(metrics.roic_current, metrics.gross_margin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_safety_anchor_points() {
        assert_relative_eq!(safety_score(0.0), 100.0);
        assert_relative_eq!(safety_score(1.0), 50.0);
        assert_eq!(safety_score(f64::INFINITY), 0.0);
        assert!(safety_score(1e12) < 1e-9);
    }

    #[test]
    fn test_safety_strictly_decreasing() {
        let grid: Vec<f64> = (0..400).map(|i| i as f64 * 0.05).collect();
        for pair in grid.windows(2) {
            assert!(
                safety_score(pair[0]) > safety_score(pair[1]),
                "safety({}) should exceed safety({})",
                pair[0],
                pair[1]
            );
        }
        assert!(safety_score(20.0) > safety_score(f64::INFINITY));
    }

    #[test]
    fn test_safety_degenerate_inputs() {
        assert_relative_eq!(safety_score(-0.5), 100.0);
        assert_eq!(safety_score(f64::NAN), 0.0);
    }

    #[test]
    fn test_cash_engine_weights_sum_to_one() {
        assert_relative_eq!(ROIC_WEIGHT + GROSS_MARGIN_WEIGHT, 1.0);
    }

    #[test]
    fn test_cash_engine_blend() {
        assert_relative_eq!(cash_engine_score(30.0, 60.0), 42.0, epsilon = 1e-9);
        assert_relative_eq!(cash_engine_score(100.0, 100.0), 100.0);
        assert_relative_eq!(cash_engine_score(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_cash_engine_clamps_each_input() {
        // ROIC of 250% counts as 100, negative margin counts as 0
        assert_relative_eq!(cash_engine_score(250.0, -40.0), 60.0, epsilon = 1e-9);
        assert_relative_eq!(cash_engine_score(-80.0, 50.0), 20.0, epsilon = 1e-9);
        assert_eq!(cash_engine_score(f64::NAN, f64::NAN), 0.0);
    }

    #[test]
    fn test_cash_engine_increases_with_each_input() {
        for step in 0..99 {
            let lo = step as f64;
            let hi = lo + 1.0;
            assert!(cash_engine_score(hi, 40.0) > cash_engine_score(lo, 40.0));
            assert!(cash_engine_score(20.0, hi) > cash_engine_score(20.0, lo));
        }
    }
}
