//! Pearson correlation across strategies' periodic returns.
//!
//! Series must share one period grid. [`align_returns`] builds that grid from the
//! union of all periods and fills a strategy's missing periods with a zero return:
//! a month in which a strategy closed no trades counts as a flat month. That
//! convention pulls coefficients towards zero for strategies that trade rarely.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::QmetricsError;
use super::ledger::Ledger;
use super::metric_value::MetricValue;
use super::performance::compute_monthly;
use super::risk::is_constant;

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Period { year, month }
    }

    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Period::new(timestamp.year(), timestamp.month())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Period returns ordered by period.
pub type ReturnSeries = BTreeMap<Period, f64>;

/// Which monthly figure feeds the correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnBasis {
    /// Monthly net profit over start-of-month equity.
    Percent,
    /// Monthly net profit in account units.
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub strategies: Vec<String>,
    /// Row-major, `coefficients[i][j]` pairs `strategies[i]` with `strategies[j]`.
    pub coefficients: Vec<Vec<MetricValue>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<MetricValue> {
        let i = self.strategies.iter().position(|s| s == a)?;
        let j = self.strategies.iter().position(|s| s == b)?;
        Some(self.coefficients[i][j])
    }
}

pub fn monthly_returns(ledger: &Ledger, basis: ReturnBasis) -> Result<ReturnSeries, QmetricsError> {
    compute_monthly(ledger)
        .into_iter()
        .map(|bucket| {
            let period = Period::new(bucket.year, bucket.month);
            let value = match basis {
                ReturnBasis::Absolute => bucket.net_profit,
                ReturnBasis::Percent => bucket.net_profit_pct.as_f64().ok_or_else(|| {
                    QmetricsError::Alignment {
                        reason: format!(
                            "monthly return for {period} is undefined (start-of-month equity is zero); \
                             use absolute returns or a non-zero initial equity"
                        ),
                    }
                })?,
            };
            Ok((period, value))
        })
        .collect()
}

/// Re-grid every series on the union of all periods, zero-filling gaps.
pub fn align_returns(returns: &BTreeMap<String, ReturnSeries>) -> BTreeMap<String, ReturnSeries> {
    let grid: BTreeSet<Period> = returns.values().flat_map(|s| s.keys().copied()).collect();
    returns
        .iter()
        .map(|(id, series)| {
            let aligned = grid
                .iter()
                .map(|p| (*p, series.get(p).copied().unwrap_or(0.0)))
                .collect();
            (id.clone(), aligned)
        })
        .collect()
}

pub fn compute_correlation(
    returns: &BTreeMap<String, ReturnSeries>,
) -> Result<CorrelationMatrix, QmetricsError> {
    let (first_id, first) = returns.iter().next().ok_or_else(|| QmetricsError::EmptyInput {
        context: "correlation requires at least one return series".into(),
    })?;

    for (id, series) in returns {
        if !series.keys().eq(first.keys()) {
            let missing = first.keys().filter(|p| !series.contains_key(p)).count();
            let extra = series.keys().filter(|p| !first.contains_key(p)).count();
            return Err(QmetricsError::Alignment {
                reason: format!(
                    "series {id} is not on the period grid of {first_id} \
                     ({missing} periods missing, {extra} extra); align the series first"
                ),
            });
        }
    }

    let strategies: Vec<String> = returns.keys().cloned().collect();
    let values: Vec<Vec<f64>> = returns.values().map(|s| s.values().copied().collect()).collect();
    let n = strategies.len();

    let mut coefficients = vec![vec![MetricValue::Undefined; n]; n];
    for i in 0..n {
        coefficients[i][i] = MetricValue::Defined(1.0);
        for j in (i + 1)..n {
            let r = pearson(&values[i], &values[j]);
            coefficients[i][j] = r;
            coefficients[j][i] = r;
        }
    }

    Ok(CorrelationMatrix {
        strategies,
        coefficients,
    })
}

/// Monthly returns for each ledger, aligned and correlated.
pub fn correlate_ledgers(
    ledgers: &BTreeMap<String, Ledger>,
    basis: ReturnBasis,
) -> Result<CorrelationMatrix, QmetricsError> {
    let returns = ledgers
        .iter()
        .map(|(id, ledger)| Ok((id.clone(), monthly_returns(ledger, basis)?)))
        .collect::<Result<BTreeMap<_, _>, QmetricsError>>()?;
    compute_correlation(&align_returns(&returns))
}

fn pearson(a: &[f64], b: &[f64]) -> MetricValue {
    let n = a.len();
    if n == 0 || is_constant(a) || is_constant(b) {
        return MetricValue::Undefined;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    MetricValue::Defined((cov / (var_a * var_b).sqrt()).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(values: &[f64]) -> ReturnSeries {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (Period::new(2024, i as u32 + 1), v))
            .collect()
    }

    fn coefficient(m: &CorrelationMatrix, a: &str, b: &str) -> f64 {
        m.get(a, b).and_then(|v| v.as_f64()).unwrap()
    }

    #[test]
    fn identical_series_correlate_perfectly() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), series(&[0.01, -0.02, 0.03, 0.005]));
        returns.insert("B".to_string(), series(&[0.01, -0.02, 0.03, 0.005]));
        let m = compute_correlation(&returns).unwrap();
        assert_relative_eq!(coefficient(&m, "A", "B"), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn negated_series_correlate_negatively() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), series(&[0.01, -0.02, 0.03, 0.005]));
        returns.insert("B".to_string(), series(&[-0.01, 0.02, -0.03, -0.005]));
        let m = compute_correlation(&returns).unwrap();
        assert_relative_eq!(coefficient(&m, "A", "B"), -1.0, epsilon = 1e-12);
        assert_relative_eq!(coefficient(&m, "B", "A"), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn diagonal_is_one_even_for_flat_series() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), series(&[0.0, 0.0, 0.0]));
        returns.insert("B".to_string(), series(&[1.0, 2.0, 3.0]));
        let m = compute_correlation(&returns).unwrap();
        assert_eq!(m.get("A", "A"), Some(MetricValue::Defined(1.0)));
        assert_eq!(m.get("A", "B"), Some(MetricValue::Undefined));
    }

    #[test]
    fn flat_fractional_series_is_undefined() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), series(&[0.1, 0.1, 0.1]));
        returns.insert("B".to_string(), series(&[1.0, 2.0, 4.0]));
        let m = compute_correlation(&returns).unwrap();
        assert_eq!(m.get("A", "B"), Some(MetricValue::Undefined));
        assert_eq!(m.get("B", "A"), Some(MetricValue::Undefined));
    }

    #[test]
    fn known_coefficient() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), series(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        returns.insert("B".to_string(), series(&[2.0, 1.0, 4.0, 3.0, 5.0]));
        let m = compute_correlation(&returns).unwrap();
        assert_relative_eq!(coefficient(&m, "A", "B"), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_grids_fail() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), series(&[1.0, 2.0, 3.0]));
        returns.insert("B".to_string(), series(&[1.0, 2.0]));
        let err = compute_correlation(&returns).unwrap_err();
        match err {
            QmetricsError::Alignment { reason } => assert!(reason.contains("series B")),
            other => panic!("expected alignment error, got {other:?}"),
        }
    }

    #[test]
    fn alignment_zero_fills_union() {
        let mut returns = BTreeMap::new();
        returns.insert(
            "A".to_string(),
            BTreeMap::from([(Period::new(2024, 1), 1.0), (Period::new(2024, 3), 3.0)]),
        );
        returns.insert(
            "B".to_string(),
            BTreeMap::from([(Period::new(2024, 2), 2.0)]),
        );
        let aligned = align_returns(&returns);
        let a: Vec<f64> = aligned["A"].values().copied().collect();
        let b: Vec<f64> = aligned["B"].values().copied().collect();
        assert_eq!(a, vec![1.0, 0.0, 3.0]);
        assert_eq!(b, vec![0.0, 2.0, 0.0]);
        assert!(compute_correlation(&aligned).is_ok());
    }

    #[test]
    fn empty_input_fails() {
        let returns: BTreeMap<String, ReturnSeries> = BTreeMap::new();
        assert!(matches!(
            compute_correlation(&returns).unwrap_err(),
            QmetricsError::EmptyInput { .. }
        ));
    }

    #[test]
    fn period_display() {
        assert_eq!(Period::new(2024, 3).to_string(), "2024-03");
    }
}
