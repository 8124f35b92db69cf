//! In-sample / out-of-sample robustness check against absolute thresholds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::error::QmetricsError;
use super::ledger::Ledger;
use super::metric_value::MetricValue;
use super::performance::{compute_stats, SummaryStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ProfitFactor,
    WinRate,
    MaxDrawdown,
    MaxDrawdownPct,
    TotalNetProfit,
    Expectancy,
    Sqn,
    AverageWin,
    AverageLoss,
    SharpeRatio,
    SortinoRatio,
    Cagr,
    Stability,
}

impl Metric {
    pub const ALL: [Metric; 13] = [
        Metric::ProfitFactor,
        Metric::WinRate,
        Metric::MaxDrawdown,
        Metric::MaxDrawdownPct,
        Metric::TotalNetProfit,
        Metric::Expectancy,
        Metric::Sqn,
        Metric::AverageWin,
        Metric::AverageLoss,
        Metric::SharpeRatio,
        Metric::SortinoRatio,
        Metric::Cagr,
        Metric::Stability,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::ProfitFactor => "profit_factor",
            Metric::WinRate => "win_rate",
            Metric::MaxDrawdown => "max_drawdown",
            Metric::MaxDrawdownPct => "max_drawdown_pct",
            Metric::TotalNetProfit => "total_net_profit",
            Metric::Expectancy => "expectancy",
            Metric::Sqn => "sqn",
            Metric::AverageWin => "average_win",
            Metric::AverageLoss => "average_loss",
            Metric::SharpeRatio => "sharpe_ratio",
            Metric::SortinoRatio => "sortino_ratio",
            Metric::Cagr => "cagr",
            Metric::Stability => "stability",
        }
    }

    pub fn value(self, stats: &SummaryStats) -> MetricValue {
        match self {
            Metric::ProfitFactor => stats.profit_factor,
            Metric::WinRate => MetricValue::Defined(stats.win_rate),
            Metric::MaxDrawdown => MetricValue::Defined(stats.max_drawdown),
            Metric::MaxDrawdownPct => stats.max_drawdown_pct,
            Metric::TotalNetProfit => MetricValue::Defined(stats.total_net_profit),
            Metric::Expectancy => MetricValue::Defined(stats.expectancy),
            Metric::Sqn => stats.sqn,
            Metric::AverageWin => MetricValue::Defined(stats.average_win),
            Metric::AverageLoss => MetricValue::Defined(stats.average_loss),
            Metric::SharpeRatio => stats.risk.sharpe_ratio,
            Metric::SortinoRatio => stats.risk.sortino_ratio,
            Metric::Cagr => stats.risk.cagr,
            Metric::Stability => stats.risk.stability,
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == key)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    AtLeast,
    AtMost,
}

impl Comparison {
    /// `Infinite` satisfies only `AtLeast`; `Undefined` satisfies neither.
    pub fn holds(self, value: MetricValue, threshold: f64) -> bool {
        match self {
            Comparison::AtLeast => value.at_least(threshold),
            Comparison::AtMost => value.at_most(threshold),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::AtLeast => f.write_str(">="),
            Comparison::AtMost => f.write_str("<="),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricThreshold {
    pub metric: Metric,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl MetricThreshold {
    pub fn new(metric: Metric, comparison: Comparison, threshold: f64) -> Self {
        MetricThreshold {
            metric,
            comparison,
            threshold,
        }
    }

    /// Parse a rule such as `>= 1.5` or `<=0.2`.
    pub fn parse(metric: Metric, rule: &str) -> Result<Self, String> {
        let rule = rule.trim();
        let (comparison, rest) = if let Some(rest) = rule.strip_prefix(">=") {
            (Comparison::AtLeast, rest)
        } else if let Some(rest) = rule.strip_prefix("<=") {
            (Comparison::AtMost, rest)
        } else {
            return Err(format!("expected '>= value' or '<= value', got '{rule}'"));
        };
        let threshold: f64 = rest
            .trim()
            .parse()
            .map_err(|_| format!("threshold '{}' is not a number", rest.trim()))?;
        if !threshold.is_finite() {
            return Err(format!("threshold must be finite, got {threshold}"));
        }
        Ok(MetricThreshold::new(metric, comparison, threshold))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricOutcome {
    pub metric: Metric,
    pub comparison: Comparison,
    pub threshold: f64,
    pub in_sample: MetricValue,
    pub out_of_sample: MetricValue,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobustnessVerdict {
    pub split: DateTime<Utc>,
    pub in_sample_trades: usize,
    pub out_of_sample_trades: usize,
    /// Equity at the split; the out-of-sample segment is folded from here.
    pub equity_at_split: f64,
    pub outcomes: Vec<MetricOutcome>,
    pub passed: bool,
}

/// Score the out-of-sample segment of `ledger` against `thresholds`.
///
/// Trades exiting before `split` are in-sample and the rest out-of-sample. Every
/// threshold is evaluated even after a failure.
pub fn evaluate(
    ledger: &Ledger,
    split: DateTime<Utc>,
    thresholds: &[MetricThreshold],
) -> Result<RobustnessVerdict, QmetricsError> {
    if thresholds.is_empty() {
        return Err(QmetricsError::missing("thresholds", "<metric>"));
    }

    let (in_sample, out_of_sample) = ledger.split_at(split);
    if in_sample.is_empty() {
        return Err(QmetricsError::InsufficientData {
            segment: "in-sample".into(),
            split,
        });
    }
    if out_of_sample.is_empty() {
        return Err(QmetricsError::InsufficientData {
            segment: "out-of-sample".into(),
            split,
        });
    }

    let is_stats = compute_stats(in_sample, ledger.mode(), ledger.initial_equity());
    let equity_at_split = is_stats.final_equity;
    let oos_stats = compute_stats(out_of_sample, ledger.mode(), equity_at_split);

    let outcomes: Vec<MetricOutcome> = thresholds
        .iter()
        .map(|t| {
            let out_value = t.metric.value(&oos_stats);
            MetricOutcome {
                metric: t.metric,
                comparison: t.comparison,
                threshold: t.threshold,
                in_sample: t.metric.value(&is_stats),
                out_of_sample: out_value,
                passed: t.comparison.holds(out_value, t.threshold),
            }
        })
        .collect();
    let passed = outcomes.iter().all(|o| o.passed);

    tracing::debug!(
        in_sample = in_sample.len(),
        out_of_sample = out_of_sample.len(),
        passed,
        "robustness evaluated"
    );

    Ok(RobustnessVerdict {
        split,
        in_sample_trades: in_sample.len(),
        out_of_sample_trades: out_of_sample.len(),
        equity_at_split,
        outcomes,
        passed,
    })
}

/// Exit time of the first out-of-sample trade when the first `fraction` of
/// trades are held in-sample, e.g. 0.7 for a 70/30 split.
pub fn split_point_at_fraction(ledger: &Ledger, fraction: f64) -> Result<DateTime<Utc>, QmetricsError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(QmetricsError::invalid(
            "robustness",
            "split_fraction",
            format!("fraction must lie strictly between 0 and 1, got {fraction}"),
        ));
    }
    let n = ledger.len();
    let idx = (n as f64 * fraction).round() as usize;
    let trades = ledger.trades();
    if idx == 0 || idx >= n {
        let split = trades[idx.min(n - 1)].exit_time;
        let segment = if idx == 0 { "in-sample" } else { "out-of-sample" };
        return Err(QmetricsError::InsufficientData {
            segment: segment.into(),
            split,
        });
    }
    Ok(trades[idx].exit_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{build_ledger, AccumulationMode};
    use crate::domain::trade::RawTrade;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 16, 0, 0).unwrap()
    }

    fn ledger(trades: &[(u32, f64)]) -> Ledger {
        let rows: Vec<RawTrade> = trades
            .iter()
            .map(|&(d, p)| RawTrade::new("S", day(d), day(d), p))
            .collect();
        build_ledger(&rows, AccumulationMode::Additive).unwrap()
    }

    fn pf_at_least(x: f64) -> MetricThreshold {
        MetricThreshold::new(Metric::ProfitFactor, Comparison::AtLeast, x)
    }

    #[test]
    fn degraded_out_of_sample_fails() {
        let l = ledger(&[(1, 100.0), (2, -50.0), (10, 60.0), (11, -50.0)]);
        let verdict = evaluate(&l, day(5), &[pf_at_least(1.5)]).unwrap();
        let outcome = &verdict.outcomes[0];
        assert_eq!(outcome.in_sample, MetricValue::Defined(2.0));
        assert_relative_eq!(outcome.out_of_sample.as_f64().unwrap(), 1.2);
        assert!(!outcome.passed);
        assert!(!verdict.passed);
        assert_eq!(verdict.in_sample_trades, 2);
        assert_eq!(verdict.out_of_sample_trades, 2);
    }

    #[test]
    fn evaluates_every_threshold() {
        let l = ledger(&[(1, 100.0), (2, -50.0), (10, 60.0), (11, -50.0)]);
        let thresholds = [
            pf_at_least(1.5),
            MetricThreshold::new(Metric::WinRate, Comparison::AtLeast, 0.5),
            MetricThreshold::new(Metric::MaxDrawdown, Comparison::AtMost, 100.0),
        ];
        let verdict = evaluate(&l, day(5), &thresholds).unwrap();
        let passed: Vec<bool> = verdict.outcomes.iter().map(|o| o.passed).collect();
        assert_eq!(passed, vec![false, true, true]);
        assert!(!verdict.passed);
    }

    #[test]
    fn out_of_sample_continues_from_split_equity() {
        let l = ledger(&[(1, 100.0), (2, -50.0), (10, 60.0), (11, -50.0)]);
        let verdict = evaluate(
            &l,
            day(5),
            &[MetricThreshold::new(Metric::MaxDrawdown, Comparison::AtMost, 50.0)],
        )
        .unwrap();
        assert_eq!(verdict.equity_at_split, 50.0);
        // OOS curve 110, 60 from a starting peak of 50.
        assert_eq!(verdict.outcomes[0].out_of_sample, MetricValue::Defined(50.0));
        assert!(verdict.passed);
    }

    #[test]
    fn infinite_passes_at_least_only() {
        let l = ledger(&[(1, 10.0), (2, -5.0), (10, 20.0)]);
        let at_least = evaluate(&l, day(5), &[pf_at_least(3.0)]).unwrap();
        assert_eq!(at_least.outcomes[0].out_of_sample, MetricValue::Infinite);
        assert!(at_least.passed);

        let at_most = evaluate(
            &l,
            day(5),
            &[MetricThreshold::new(Metric::ProfitFactor, Comparison::AtMost, 3.0)],
        )
        .unwrap();
        assert!(!at_most.passed);
    }

    #[test]
    fn undefined_fails_both() {
        let l = ledger(&[(1, 10.0), (2, -5.0), (10, 0.0)]);
        for comparison in [Comparison::AtLeast, Comparison::AtMost] {
            let verdict = evaluate(
                &l,
                day(5),
                &[MetricThreshold::new(Metric::ProfitFactor, comparison, 1.0)],
            )
            .unwrap();
            assert_eq!(verdict.outcomes[0].out_of_sample, MetricValue::Undefined);
            assert!(!verdict.passed);
        }
    }

    #[test]
    fn empty_segment_is_insufficient_data() {
        let l = ledger(&[(1, 10.0), (2, -5.0)]);
        let err = evaluate(&l, day(20), &[pf_at_least(1.0)]).unwrap_err();
        assert!(
            matches!(err, QmetricsError::InsufficientData { ref segment, .. } if segment == "out-of-sample")
        );
        let err = evaluate(&l, day(1), &[pf_at_least(1.0)]).unwrap_err();
        assert!(
            matches!(err, QmetricsError::InsufficientData { ref segment, .. } if segment == "in-sample")
        );
    }

    #[test]
    fn split_boundary_trade_is_out_of_sample() {
        let l = ledger(&[(1, 10.0), (5, -5.0), (9, 3.0)]);
        let verdict = evaluate(&l, day(5), &[pf_at_least(0.0)]).unwrap();
        assert_eq!(verdict.in_sample_trades, 1);
        assert_eq!(verdict.out_of_sample_trades, 2);
    }

    #[test]
    fn empty_thresholds_are_config_error() {
        let l = ledger(&[(1, 10.0), (9, 3.0)]);
        let err = evaluate(&l, day(5), &[]).unwrap_err();
        assert!(matches!(err, QmetricsError::ConfigMissing { .. }));
    }

    #[test]
    fn fractional_split() {
        let trades: Vec<(u32, f64)> = (1..=10).map(|d| (d, 1.0)).collect();
        let l = ledger(&trades);
        assert_eq!(split_point_at_fraction(&l, 0.7).unwrap(), day(8));
        assert!(matches!(
            split_point_at_fraction(&l, 1.0).unwrap_err(),
            QmetricsError::ConfigInvalid { .. }
        ));
        assert!(matches!(
            split_point_at_fraction(&l, 0.01).unwrap_err(),
            QmetricsError::InsufficientData { .. }
        ));
    }

    #[test]
    fn risk_ratios_follow_split_equity() {
        let l = ledger(&[(1, 100.0), (2, -50.0), (10, 60.0), (12, -20.0), (14, 30.0)])
            .with_initial_equity(1000.0)
            .unwrap();
        let verdict = evaluate(
            &l,
            day(5),
            &[
                MetricThreshold::new(Metric::SharpeRatio, Comparison::AtLeast, 0.0),
                MetricThreshold::new(Metric::Stability, Comparison::AtMost, 1.0),
            ],
        )
        .unwrap();
        assert!(verdict.outcomes[0].out_of_sample.as_f64().unwrap() > 0.0);
        assert!(verdict.outcomes[1].out_of_sample.is_defined());
        assert!(verdict.passed);

        // Equity below zero at the split leaves no daily returns to rank.
        let underwater = ledger(&[(1, -100.0), (10, 60.0), (12, -20.0)]);
        let verdict = evaluate(
            &underwater,
            day(5),
            &[MetricThreshold::new(Metric::SharpeRatio, Comparison::AtLeast, 0.0)],
        )
        .unwrap();
        assert_eq!(verdict.outcomes[0].out_of_sample, MetricValue::Undefined);
        assert!(!verdict.passed);
    }

    #[test]
    fn threshold_rules_parse() {
        let t = MetricThreshold::parse(Metric::Sqn, ">= 2").unwrap();
        assert_eq!(t.comparison, Comparison::AtLeast);
        assert_eq!(t.threshold, 2.0);
        let t = MetricThreshold::parse(Metric::MaxDrawdownPct, "<=0.25").unwrap();
        assert_eq!(t.comparison, Comparison::AtMost);
        assert!(MetricThreshold::parse(Metric::Sqn, "> 2").is_err());
        assert!(MetricThreshold::parse(Metric::Sqn, ">= abc").is_err());
        assert_eq!("Profit_Factor".parse(), Ok(Metric::ProfitFactor));
        assert_eq!("sharpe_ratio".parse(), Ok(Metric::SharpeRatio));
        assert_eq!("CAGR".parse(), Ok(Metric::Cagr));
    }
}
