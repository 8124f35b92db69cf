//! Risk-adjusted statistics over a daily equity series.
//!
//! Trades are grouped by the UTC date of their exit. The equity after a date's
//! last trade is carried forward over the calendar days without trades, and
//! daily returns are taken against the previous day's equity (the initial
//! equity for the first day).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::ledger::AccumulationMode;
use super::metric_value::MetricValue;
use super::trade::Trade;

/// Annual risk-free rate subtracted in the Sharpe and Sortino ratios.
pub const RISK_FREE_RATE: f64 = 0.02;
pub const TRADING_DAYS: f64 = 252.0;
/// Share of the worst daily returns averaged into the expected shortfall.
pub const SHORTFALL_TAIL: f64 = 0.05;

const DAYS_PER_YEAR: f64 = 365.25;
const RELATIVE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyEquity {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskStats {
    pub sharpe_ratio: MetricValue,
    pub sortino_ratio: MetricValue,
    /// Compound annual growth rate, as a fraction.
    pub cagr: MetricValue,
    /// Net profit per year in account units.
    pub annualized_return: MetricValue,
    pub annualized_volatility: MetricValue,
    /// Mean of the worst 5% of daily returns.
    pub expected_shortfall: MetricValue,
    /// R² of a straight line fitted to daily equity.
    pub stability: MetricValue,
}

impl RiskStats {
    pub fn undefined() -> Self {
        RiskStats {
            sharpe_ratio: MetricValue::Undefined,
            sortino_ratio: MetricValue::Undefined,
            cagr: MetricValue::Undefined,
            annualized_return: MetricValue::Undefined,
            annualized_volatility: MetricValue::Undefined,
            expected_shortfall: MetricValue::Undefined,
            stability: MetricValue::Undefined,
        }
    }
}

/// Equity at the close of every calendar day from the first exit to the last.
pub fn daily_equity(trades: &[Trade], mode: AccumulationMode, initial_equity: f64) -> Vec<DailyEquity> {
    let mut closes: Vec<DailyEquity> = Vec::new();
    let mut equity = initial_equity;
    for trade in trades {
        equity = mode.apply(equity, trade.profit);
        let date = trade.exit_time.date_naive();
        if let Some(last) = closes.last_mut().filter(|l| l.date == date) {
            last.value = equity;
        } else {
            closes.push(DailyEquity { date, value: equity });
        }
    }

    let mut daily: Vec<DailyEquity> = Vec::with_capacity(closes.len());
    for close in closes {
        if let Some(prev) = daily.last().copied() {
            let mut date = prev.date;
            while let Some(next) = date.succ_opt().filter(|d| *d < close.date) {
                daily.push(DailyEquity {
                    date: next,
                    value: prev.value,
                });
                date = next;
            }
        }
        daily.push(close);
    }
    daily
}

/// Day-over-day returns; `None` once any prior equity is not positive.
pub fn daily_returns(daily: &[DailyEquity], initial_equity: f64) -> Option<Vec<f64>> {
    let mut previous = initial_equity;
    daily
        .iter()
        .map(|day| {
            if previous <= 0.0 {
                return None;
            }
            let r = day.value / previous - 1.0;
            previous = day.value;
            Some(r)
        })
        .collect()
}

pub fn risk_stats(trades: &[Trade], mode: AccumulationMode, initial_equity: f64) -> RiskStats {
    let daily = daily_equity(trades, mode, initial_equity);
    let Some(last) = daily.last() else {
        return RiskStats::undefined();
    };
    let years = trading_years(trades);
    let net_profit = last.value - initial_equity;
    let values: Vec<f64> = daily.iter().map(|d| d.value).collect();

    let mut stats = RiskStats {
        cagr: cagr(initial_equity, last.value, years),
        annualized_return: if years > 0.0 {
            MetricValue::Defined(net_profit / years)
        } else {
            MetricValue::Undefined
        },
        stability: stability(&values),
        ..RiskStats::undefined()
    };
    if let Some(returns) = daily_returns(&daily, initial_equity) {
        stats.sharpe_ratio = sharpe_ratio(&returns);
        stats.sortino_ratio = sortino_ratio(&returns);
        stats.annualized_volatility = annualized_volatility(&returns);
        stats.expected_shortfall = expected_shortfall(&returns);
    }
    stats
}

/// Years from the earliest entry to the latest exit.
fn trading_years(trades: &[Trade]) -> f64 {
    let first: Option<DateTime<Utc>> = trades.iter().map(|t| t.entry_time).min();
    let last: Option<DateTime<Utc>> = trades.iter().map(|t| t.exit_time).max();
    match (first, last) {
        (Some(first), Some(last)) => {
            (last - first).num_seconds() as f64 / 86_400.0 / DAYS_PER_YEAR
        }
        _ => 0.0,
    }
}

pub fn sharpe_ratio(returns: &[f64]) -> MetricValue {
    if is_constant(returns) {
        return MetricValue::Undefined;
    }
    match sample_std_dev(returns) {
        Some(std) => MetricValue::Defined(excess_mean(returns) / std * TRADING_DAYS.sqrt()),
        None => MetricValue::Undefined,
    }
}

/// Downside deviation is taken over every return, counting only shortfalls
/// below the daily risk-free rate.
pub fn sortino_ratio(returns: &[f64]) -> MetricValue {
    if returns.len() < 2 {
        return MetricValue::Undefined;
    }
    let target = RISK_FREE_RATE / TRADING_DAYS;
    let downside = (returns
        .iter()
        .map(|r| (r - target).min(0.0).powi(2))
        .sum::<f64>()
        / returns.len() as f64)
        .sqrt();
    let excess = excess_mean(returns);
    if downside > 0.0 {
        MetricValue::Defined(excess / downside * TRADING_DAYS.sqrt())
    } else if excess > 0.0 {
        MetricValue::Infinite
    } else {
        MetricValue::Undefined
    }
}

pub fn annualized_volatility(returns: &[f64]) -> MetricValue {
    if returns.len() >= 2 && is_constant(returns) {
        return MetricValue::Defined(0.0);
    }
    match sample_std_dev(returns) {
        Some(std) => MetricValue::Defined(std * TRADING_DAYS.sqrt()),
        None => MetricValue::Undefined,
    }
}

pub fn expected_shortfall(returns: &[f64]) -> MetricValue {
    let tail = (returns.len() as f64 * SHORTFALL_TAIL).floor() as usize;
    if tail == 0 {
        return MetricValue::Undefined;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    MetricValue::Defined(mean(&sorted[..tail]))
}

pub fn cagr(initial_equity: f64, final_equity: f64, years: f64) -> MetricValue {
    if initial_equity > 0.0 && final_equity > 0.0 && years > 0.0 {
        MetricValue::Defined((final_equity / initial_equity).powf(1.0 / years) - 1.0)
    } else {
        MetricValue::Undefined
    }
}

/// A flat curve is perfectly stable.
pub fn stability(values: &[f64]) -> MetricValue {
    if values.len() < 2 {
        return MetricValue::Undefined;
    }
    if is_constant(values) {
        return MetricValue::Defined(1.0);
    }
    let x_mean = (values.len() - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (mut sxy, mut sxx, mut syy) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (i, y) in values.iter().enumerate() {
        let (dx, dy) = (i as f64 - x_mean, y - y_mean);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    MetricValue::Defined(sxy * sxy / (sxx * syy))
}

/// True when the values differ by no more than floating-point rounding.
///
/// Sums of identical non-integers leave a residue in the variance, so an exact
/// `variance == 0.0` test misses them.
pub(crate) fn is_constant(values: &[f64]) -> bool {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    values.is_empty() || hi - lo <= RELATIVE_TOLERANCE * lo.abs().max(hi.abs())
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn excess_mean(returns: &[f64]) -> f64 {
    mean(returns) - RISK_FREE_RATE / TRADING_DAYS
}
