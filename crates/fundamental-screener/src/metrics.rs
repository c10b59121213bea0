use screening_core::{
    DegenerateInput, DerivedMetrics, PeriodFinancials, PeriodStats, RawFinancials, ScreenError,
    HISTORY_PERIODS,
};

/// Statement fields after fallbacks have been applied. All values are finite.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementInputs {
    pub price: f64,
    pub nopat: f64,
    pub invested_capital: f64,
    pub total_debt: f64,
    pub total_equity: f64,
    pub revenue: f64,
    pub cost_of_goods_sold: f64,
    pub free_cash_flow: f64,
    pub net_income: f64,
    pub market_cap: f64,
    /// Gross margin of each usable history period, most recent first.
    pub gross_margin_periods: Vec<f64>,
    pub roic_periods: Vec<f64>,
}

pub struct MetricCalculator {
    tax_rate: f64,
}

impl MetricCalculator {
    pub fn new(tax_rate: f64) -> Self {
        Self { tax_rate }
    }

    /// Resolve every required field, applying fallbacks:
    /// NOPAT from operating income after tax, invested capital as debt plus
    /// equity, market cap as price times shares outstanding.
    pub fn normalize(&self, raw: &RawFinancials) -> Result<StatementInputs, ScreenError> {
        let mut missing: Vec<&str> = Vec::new();

        fn require(value: Option<f64>, name: &'static str, missing: &mut Vec<&str>) -> f64 {
            match value {
                Some(v) => v,
                None => {
                    missing.push(name);
                    0.0
                }
            }
        }

        let price = require(raw.price, "price", &mut missing);
        let nopat = require(
            raw.nopat
                .or_else(|| raw.operating_income.map(|oi| oi * (1.0 - self.tax_rate))),
            "nopat",
            &mut missing,
        );
        let total_debt = require(raw.total_debt, "total_debt", &mut missing);
        let total_equity = require(raw.total_equity, "total_equity", &mut missing);
        let invested_capital = require(
            raw.invested_capital
                .or_else(|| Some(raw.total_debt? + raw.total_equity?)),
            "invested_capital",
            &mut missing,
        );
        let revenue = require(raw.revenue, "revenue", &mut missing);
        let cost_of_goods_sold =
            require(raw.cost_of_goods_sold, "cost_of_goods_sold", &mut missing);
        let free_cash_flow = require(raw.free_cash_flow, "free_cash_flow", &mut missing);
        let net_income = require(raw.net_income, "net_income", &mut missing);
        let market_cap = require(
            raw.market_cap
                .or_else(|| Some(raw.price? * raw.shares_outstanding?))
                .filter(|v| v.is_finite()),
            "market_cap",
            &mut missing,
        );

        if !missing.is_empty() {
            return Err(ScreenError::insufficient(&raw.ticker, &missing));
        }

        let recent = &raw.history[..raw.history.len().min(HISTORY_PERIODS)];
        let gross_margin_periods = recent.iter().filter_map(period_gross_margin).collect();
        let roic_periods = recent.iter().filter_map(|p| self.period_roic(p)).collect();

        Ok(StatementInputs {
            price,
            nopat,
            invested_capital,
            total_debt,
            total_equity,
            revenue,
            cost_of_goods_sold,
            free_cash_flow,
            net_income,
            market_cap,
            gross_margin_periods,
            roic_periods,
        })
    }

    fn period_roic(&self, period: &PeriodFinancials) -> Option<f64> {
        let nopat = period
            .nopat
            .or_else(|| period.operating_income.map(|oi| oi * (1.0 - self.tax_rate)))?;
        let invested_capital = period
            .invested_capital
            .or_else(|| Some(period.total_debt? + period.total_equity?))?;
        roic(nopat, invested_capital).ok()
    }

    /// Derive the ratio set. Non-positive denominators are recorded in
    /// `degenerate` and replaced by a 0.0 sentinel; non-positive equity maps
    /// debt-to-equity to `+inf`.
    pub fn derive(&self, inputs: &StatementInputs) -> DerivedMetrics {
        let mut degenerate = Vec::new();

        let roic_current = roic(inputs.nopat, inputs.invested_capital).unwrap_or_else(|_| {
            degenerate.push(DegenerateInput::NonPositiveInvestedCapital);
            0.0
        });
        let fcf_yield = fcf_yield(inputs.free_cash_flow, inputs.market_cap).unwrap_or_else(|_| {
            degenerate.push(DegenerateInput::NonPositiveMarketCap);
            0.0
        });
        let gross_margin = gross_margin(inputs.revenue, inputs.cost_of_goods_sold)
            .unwrap_or_else(|_| {
                degenerate.push(DegenerateInput::NonPositiveRevenue);
                0.0
            });

        DerivedMetrics {
            roic_current,
            fcf_yield,
            debt_to_equity: debt_to_equity(inputs.total_debt, inputs.total_equity),
            gross_margin,
            earnings_cash_divergence: earnings_cash_divergence(
                inputs.net_income,
                inputs.free_cash_flow,
                inputs.revenue,
            ),
            net_income: inputs.net_income,
            free_cash_flow: inputs.free_cash_flow,
            revenue: inputs.revenue,
            gross_margin_history: PeriodStats::from_periods(
                &inputs.gross_margin_periods,
                gross_margin,
            ),
            roic_history: PeriodStats::from_periods(&inputs.roic_periods, roic_current),
            degenerate,
        }
    }

    pub fn calculate(&self, raw: &RawFinancials) -> Result<DerivedMetrics, ScreenError> {
        let inputs = self.normalize(raw)?;
        Ok(self.derive(&inputs))
    }
}

fn percent_of(numerator: f64, denominator: f64, field: &str) -> Result<f64, ScreenError> {
    if denominator > 0.0 {
        Ok(numerator / denominator * 100.0)
    } else {
        Err(ScreenError::DivisionByZero {
            field: field.to_string(),
        })
    }
}

/// NOPAT / invested capital, in percent.
pub fn roic(nopat: f64, invested_capital: f64) -> Result<f64, ScreenError> {
    percent_of(nopat, invested_capital, "invested_capital")
}

/// Free cash flow / market capitalization, in percent.
pub fn fcf_yield(free_cash_flow: f64, market_cap: f64) -> Result<f64, ScreenError> {
    percent_of(free_cash_flow, market_cap, "market_cap")
}

pub fn gross_margin(revenue: f64, cost_of_goods_sold: f64) -> Result<f64, ScreenError> {
    percent_of(revenue - cost_of_goods_sold, revenue, "revenue")
}

fn period_gross_margin(period: &PeriodFinancials) -> Option<f64> {
    let revenue = period.revenue?;
    match period.gross_profit {
        Some(gross_profit) => percent_of(gross_profit, revenue, "revenue").ok(),
        None => gross_margin(revenue, period.cost_of_goods_sold?).ok(),
    }
}

/// Zero or negative equity is maximal leverage, not a failure.
pub fn debt_to_equity(total_debt: f64, total_equity: f64) -> f64 {
    if total_equity > 0.0 {
        total_debt / total_equity
    } else {
        f64::INFINITY
    }
}

/// Accounting profit in excess of cash profit, per unit of revenue.
pub fn earnings_cash_divergence(net_income: f64, free_cash_flow: f64, revenue: f64) -> f64 {
    (net_income - free_cash_flow) / revenue.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn complete(ticker: &str) -> RawFinancials {
        RawFinancials {
            company_name: Some("Acme Corp".to_string()),
            price: Some(50.0),
            invested_capital: Some(1_000.0),
            nopat: Some(150.0),
            total_debt: Some(200.0),
            total_equity: Some(800.0),
            revenue: Some(2_000.0),
            cost_of_goods_sold: Some(1_200.0),
            free_cash_flow: Some(90.0),
            net_income: Some(120.0),
            market_cap: Some(1_500.0),
            ..RawFinancials::new(ticker)
        }
    }

    #[test]
    fn test_roic_matches_definition() {
        for (nopat, capital) in [(150.0, 1_000.0), (-40.0, 333.0), (1e9, 7.5e9), (0.001, 0.3)] {
            let value = roic(nopat, capital).unwrap();
            assert!((value - nopat / capital * 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_non_positive_denominators_are_division_errors() {
        assert_eq!(
            roic(10.0, 0.0),
            Err(ScreenError::DivisionByZero {
                field: "invested_capital".to_string()
            })
        );
        assert!(fcf_yield(10.0, -5.0).is_err());
        assert!(gross_margin(0.0, 10.0).is_err());
    }

    #[test]
    fn test_debt_to_equity_sentinel() {
        assert_relative_eq!(debt_to_equity(200.0, 800.0), 0.25);
        assert_eq!(debt_to_equity(200.0, 0.0), f64::INFINITY);
        assert_eq!(debt_to_equity(0.0, -10.0), f64::INFINITY);
    }

    #[test]
    fn test_divergence_floors_revenue_at_one() {
        assert_relative_eq!(earnings_cash_divergence(100.0, 10.0, 1_000.0), 0.09, epsilon = 1e-12);
        assert_relative_eq!(earnings_cash_divergence(5.0, 2.0, 0.2), 3.0);
        assert_relative_eq!(earnings_cash_divergence(5.0, 2.0, -300.0), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_calculate_complete_record() {
        let metrics = MetricCalculator::new(0.21).calculate(&complete("ACME")).unwrap();

        assert_relative_eq!(metrics.roic_current, 15.0);
        assert_relative_eq!(metrics.fcf_yield, 6.0);
        assert_relative_eq!(metrics.debt_to_equity, 0.25);
        assert_relative_eq!(metrics.gross_margin, 40.0);
        assert_relative_eq!(metrics.earnings_cash_divergence, 0.015, epsilon = 1e-12);
        assert!(metrics.degenerate.is_empty());
    }

    #[test]
    fn test_missing_fields_are_all_named() {
        let raw = RawFinancials {
            revenue: None,
            free_cash_flow: None,
            ..complete("GAP")
        };

        let err = MetricCalculator::new(0.21).calculate(&raw).unwrap_err();
        assert_eq!(
            err,
            ScreenError::InsufficientData {
                ticker: "GAP".to_string(),
                fields: vec!["revenue".to_string(), "free_cash_flow".to_string()],
            }
        );
    }

    #[test]
    fn test_fallbacks_fill_derivable_fields() {
        let raw = RawFinancials {
            nopat: None,
            operating_income: Some(100.0),
            invested_capital: None,
            market_cap: None,
            shares_outstanding: Some(40.0),
            ..complete("FALL")
        };

        let inputs = MetricCalculator::new(0.21).normalize(&raw).unwrap();
        assert_relative_eq!(inputs.nopat, 79.0, epsilon = 1e-9);
        assert_relative_eq!(inputs.invested_capital, 1_000.0);
        assert_relative_eq!(inputs.market_cap, 2_000.0);
    }

    #[test]
    fn test_market_cap_without_fallback_is_missing() {
        let raw = RawFinancials {
            market_cap: None,
            ..complete("NOCAP")
        };
        let err = MetricCalculator::new(0.21).calculate(&raw).unwrap_err();
        assert!(matches!(
            err,
            ScreenError::InsufficientData { ref fields, .. } if fields == &["market_cap"]
        ));
    }

    #[test]
    fn test_history_is_averaged_over_recent_periods() {
        let period = |revenue: f64, gross_profit: f64, nopat: f64| PeriodFinancials {
            revenue: Some(revenue),
            gross_profit: Some(gross_profit),
            nopat: Some(nopat),
            invested_capital: Some(1_000.0),
            ..PeriodFinancials::default()
        };
        let raw = RawFinancials {
            history: vec![
                period(1_000.0, 500.0, 200.0),
                period(1_000.0, 300.0, 100.0),
                period(1_000.0, 400.0, 300.0),
                // fourth period is beyond the window
                period(1_000.0, 0.0, -500.0),
            ],
            ..complete("HIST")
        };

        let metrics = MetricCalculator::new(0.21).calculate(&raw).unwrap();
        assert_eq!(metrics.gross_margin_history.periods, 3);
        assert_relative_eq!(metrics.gross_margin_history.average, 40.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.gross_margin_history.worst, 30.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.roic_history.average, 20.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.roic_history.worst, 10.0, epsilon = 1e-9);
        // the current-period ratios are untouched
        assert_relative_eq!(metrics.gross_margin, 40.0);
        assert_relative_eq!(metrics.roic_current, 15.0);
    }

    #[test]
    fn test_unusable_periods_are_skipped() {
        let raw = RawFinancials {
            history: vec![
                PeriodFinancials {
                    revenue: Some(0.0),
                    gross_profit: Some(10.0),
                    ..PeriodFinancials::default()
                },
                PeriodFinancials {
                    revenue: Some(500.0),
                    cost_of_goods_sold: Some(400.0),
                    operating_income: Some(100.0),
                    total_debt: Some(100.0),
                    total_equity: Some(300.0),
                    ..PeriodFinancials::default()
                },
            ],
            ..complete("SKIP")
        };

        let metrics = MetricCalculator::new(0.21).calculate(&raw).unwrap();
        assert_eq!(metrics.gross_margin_history.periods, 1);
        assert_relative_eq!(metrics.gross_margin_history.average, 20.0, epsilon = 1e-9);
        assert_eq!(metrics.roic_history.periods, 1);
        assert_relative_eq!(metrics.roic_history.average, 19.75, epsilon = 1e-9);
    }

    #[test]
    fn test_no_history_falls_back_to_current_period() {
        let metrics = MetricCalculator::new(0.21).calculate(&complete("NOW")).unwrap();
        assert_eq!(metrics.gross_margin_history.periods, 0);
        assert_eq!(metrics.gross_margin_history.average, metrics.gross_margin);
        assert_eq!(metrics.roic_history.worst, metrics.roic_current);
    }

    #[test]
    fn test_degenerate_denominators_use_sentinels() {
        let raw = RawFinancials {
            invested_capital: Some(-50.0),
            total_equity: Some(-50.0),
            revenue: Some(0.0),
            ..complete("DEG")
        };

        let metrics = MetricCalculator::new(0.21).calculate(&raw).unwrap();
        assert_eq!(metrics.roic_current, 0.0);
        assert_eq!(metrics.gross_margin, 0.0);
        assert_eq!(metrics.debt_to_equity, f64::INFINITY);
        assert_eq!(
            metrics.degenerate,
            vec![
                DegenerateInput::NonPositiveInvestedCapital,
                DegenerateInput::NonPositiveRevenue
            ]
        );
    }
}
