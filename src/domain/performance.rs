//! Equity curves, drawdown, monthly breakdowns and summary statistics.
//!
//! Monthly buckets use the UTC calendar month of each trade's exit time.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use super::ledger::{AccumulationMode, Ledger};
use super::metric_value::MetricValue;
use super::risk::{is_constant, risk_stats, sample_std_dev, RiskStats};
use super::trade::Trade;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Running peak minus value.
    pub drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBucket {
    pub year: i32,
    pub month: u32,
    pub net_profit: f64,
    /// `net_profit` over the equity at the start of the month, as a fraction.
    pub net_profit_pct: MetricValue,
    pub trade_count: usize,
}

/// One calendar year of monthly net profit, January first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRow {
    pub year: i32,
    pub months: [f64; 12],
    pub ytd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawdownStats {
    pub max_drawdown: f64,
    pub max_drawdown_pct: MetricValue,
    /// Point index at which the maximum drawdown occurs.
    pub max_drawdown_index: Option<usize>,
    /// Longest run of consecutive points below the running peak.
    pub max_drawdown_duration: usize,
}

/// Van Tharp's System Quality Number bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqnRating {
    VeryHardToTrade,
    Average,
    Good,
    Excellent,
    Superb,
    HolyGrail,
}

impl SqnRating {
    pub fn from_sqn(sqn: f64) -> Self {
        if sqn < 1.0 {
            SqnRating::VeryHardToTrade
        } else if sqn < 2.0 {
            SqnRating::Average
        } else if sqn < 3.0 {
            SqnRating::Good
        } else if sqn < 5.0 {
            SqnRating::Excellent
        } else if sqn < 7.0 {
            SqnRating::Superb
        } else {
            SqnRating::HolyGrail
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakeven: usize,
    pub total_net_profit: f64,
    pub total_return_pct: MetricValue,
    pub final_equity: f64,
    pub win_rate: f64,
    pub average_win: f64,
    /// Mean magnitude of losing trades, reported as a positive number.
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub expectancy: f64,
    pub profit_factor: MetricValue,
    pub risk_reward_ratio: MetricValue,
    pub max_drawdown: f64,
    pub max_drawdown_pct: MetricValue,
    pub max_drawdown_duration: usize,
    pub return_to_drawdown: MetricValue,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub sqn: MetricValue,
    pub sqn_rating: Option<SqnRating>,
    pub average_holding_days: f64,
    /// Ratios over the daily equity series.
    pub risk: RiskStats,
}

/// Tracks the running peak while equity values are observed in order.
#[derive(Debug, Clone)]
pub(crate) struct DrawdownTracker {
    peak: f64,
    index: usize,
    max_drawdown: f64,
    peak_at_max: f64,
    max_index: Option<usize>,
    current_run: usize,
    longest_run: usize,
}

impl DrawdownTracker {
    pub(crate) fn new(initial_equity: f64) -> Self {
        DrawdownTracker {
            peak: initial_equity,
            index: 0,
            max_drawdown: 0.0,
            peak_at_max: initial_equity,
            max_index: None,
            current_run: 0,
            longest_run: 0,
        }
    }

    /// Record the next equity value and return its drawdown from the peak.
    pub(crate) fn observe(&mut self, value: f64) -> f64 {
        if value >= self.peak {
            self.peak = value;
            self.current_run = 0;
        } else {
            self.current_run += 1;
            self.longest_run = self.longest_run.max(self.current_run);
        }
        let drawdown = self.peak - value;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
            self.peak_at_max = self.peak;
            self.max_index = Some(self.index);
        }
        self.index += 1;
        drawdown
    }

    pub(crate) fn finish(&self) -> DrawdownStats {
        let max_drawdown_pct = if self.max_index.is_none() {
            MetricValue::Defined(0.0)
        } else if self.peak_at_max > 0.0 {
            MetricValue::Defined(self.max_drawdown / self.peak_at_max)
        } else {
            MetricValue::Undefined
        };
        DrawdownStats {
            max_drawdown: self.max_drawdown,
            max_drawdown_pct,
            max_drawdown_index: self.max_index,
            max_drawdown_duration: self.longest_run,
        }
    }
}

/// Fold profits into equity, calling `visit(index, value, drawdown)` per point.
pub(crate) fn fold_equity<I, F>(
    profits: I,
    mode: AccumulationMode,
    initial_equity: f64,
    mut visit: F,
) -> DrawdownStats
where
    I: IntoIterator<Item = f64>,
    F: FnMut(usize, f64, f64),
{
    let mut tracker = DrawdownTracker::new(initial_equity);
    let mut equity = initial_equity;
    for (i, profit) in profits.into_iter().enumerate() {
        equity = mode.apply(equity, profit);
        let drawdown = tracker.observe(equity);
        visit(i, equity, drawdown);
    }
    tracker.finish()
}

pub fn compute_equity_curve(ledger: &Ledger) -> Vec<EquityPoint> {
    let trades = ledger.trades();
    let mut curve = Vec::with_capacity(trades.len());
    fold_equity(
        ledger.profits(),
        ledger.mode(),
        ledger.initial_equity(),
        |i, value, drawdown| {
            curve.push(EquityPoint {
                timestamp: trades[i].exit_time,
                value,
                drawdown,
            })
        },
    );
    curve
}

pub fn compute_drawdown(ledger: &Ledger) -> DrawdownStats {
    fold_equity(ledger.profits(), ledger.mode(), ledger.initial_equity(), |_, _, _| {})
}

pub fn compute_monthly(ledger: &Ledger) -> Vec<MonthlyBucket> {
    let mut buckets: Vec<MonthlyBucket> = Vec::new();
    let mut equity = ledger.initial_equity();
    let mut month_start = equity;

    for trade in ledger.trades() {
        let (year, month) = (trade.exit_time.year(), trade.exit_time.month());
        let same_month = buckets
            .last()
            .is_some_and(|b| b.year == year && b.month == month);
        if !same_month {
            month_start = equity;
            buckets.push(MonthlyBucket {
                year,
                month,
                net_profit: 0.0,
                net_profit_pct: MetricValue::Undefined,
                trade_count: 0,
            });
        }
        equity = ledger.mode().apply(equity, trade.profit);

        if let Some(bucket) = buckets.last_mut() {
            bucket.trade_count += 1;
            bucket.net_profit = match ledger.mode() {
                AccumulationMode::Additive => bucket.net_profit + trade.profit,
                AccumulationMode::Compounding => equity - month_start,
            };
            bucket.net_profit_pct = MetricValue::ratio(bucket.net_profit, month_start);
        }
    }
    buckets
}

/// Pivot monthly buckets into one row per year with a year-to-date total.
pub fn monthly_table(buckets: &[MonthlyBucket]) -> Vec<YearRow> {
    let mut rows: Vec<YearRow> = Vec::new();
    for bucket in buckets {
        if rows.last().is_none_or(|r| r.year != bucket.year) {
            rows.push(YearRow {
                year: bucket.year,
                months: [0.0; 12],
                ytd: 0.0,
            });
        }
        if let Some(row) = rows.last_mut() {
            row.months[(bucket.month - 1) as usize] += bucket.net_profit;
            row.ytd += bucket.net_profit;
        }
    }
    rows
}

pub fn summary_stats(ledger: &Ledger) -> SummaryStats {
    compute_stats(ledger.trades(), ledger.mode(), ledger.initial_equity())
}

/// Statistics over any chronologically ordered slice of trades.
pub(crate) fn compute_stats(
    trades: &[Trade],
    mode: AccumulationMode,
    initial_equity: f64,
) -> SummaryStats {
    let mut wins = 0usize;
    let mut losses = 0usize;
    let mut breakeven = 0usize;
    let mut gross_profit = 0.0_f64;
    let mut gross_loss = 0.0_f64;
    let mut largest_win = 0.0_f64;
    let mut largest_loss = 0.0_f64;
    let mut sum = 0.0_f64;
    let mut holding_days = 0.0_f64;

    for trade in trades {
        let p = trade.profit;
        sum += p;
        if p > 0.0 {
            wins += 1;
            gross_profit += p;
            largest_win = largest_win.max(p);
        } else if p < 0.0 {
            losses += 1;
            gross_loss += p.abs();
            largest_loss = largest_loss.max(p.abs());
        } else {
            breakeven += 1;
        }
        holding_days += trade.holding_period().num_seconds() as f64 / 86_400.0;
    }

    let n = trades.len();
    let mut final_equity = initial_equity;
    let drawdown = fold_equity(trades.iter().map(|t| t.profit), mode, initial_equity, |_, v, _| {
        final_equity = v
    });

    let total_net_profit = match mode {
        AccumulationMode::Additive => sum,
        AccumulationMode::Compounding => final_equity - initial_equity,
    };

    let average_win = if wins > 0 { gross_profit / wins as f64 } else { 0.0 };
    let average_loss = if losses > 0 { gross_loss / losses as f64 } else { 0.0 };
    let expectancy = if n > 0 { sum / n as f64 } else { 0.0 };
    let win_rate = if n > 0 { wins as f64 / n as f64 } else { 0.0 };

    let return_to_drawdown = if drawdown.max_drawdown > 0.0 {
        MetricValue::Defined(total_net_profit / drawdown.max_drawdown)
    } else if total_net_profit > 0.0 {
        MetricValue::Infinite
    } else {
        MetricValue::Undefined
    };

    let profits: Vec<f64> = trades.iter().map(|t| t.profit).collect();
    let sqn = system_quality_number(&profits);
    let (max_consecutive_wins, max_consecutive_losses) = streaks(trades.iter().map(|t| t.profit));

    SummaryStats {
        trade_count: n,
        wins,
        losses,
        breakeven,
        total_net_profit,
        total_return_pct: MetricValue::ratio(total_net_profit, initial_equity),
        final_equity,
        win_rate,
        average_win,
        average_loss,
        largest_win,
        largest_loss,
        expectancy,
        profit_factor: MetricValue::unbounded_ratio(gross_profit, gross_loss),
        risk_reward_ratio: MetricValue::unbounded_ratio(average_loss, average_win),
        max_drawdown: drawdown.max_drawdown,
        max_drawdown_pct: drawdown.max_drawdown_pct,
        max_drawdown_duration: drawdown.max_drawdown_duration,
        return_to_drawdown,
        max_consecutive_wins,
        max_consecutive_losses,
        sqn,
        sqn_rating: sqn.as_f64().map(SqnRating::from_sqn),
        average_holding_days: if n > 0 { holding_days / n as f64 } else { 0.0 },
        risk: risk_stats(trades, mode, initial_equity),
    }
}

/// Undefined below two trades or when every profit is the same.
fn system_quality_number(profits: &[f64]) -> MetricValue {
    if is_constant(profits) {
        return MetricValue::Undefined;
    }
    match sample_std_dev(profits) {
        Some(stddev) => {
            let mean = profits.iter().sum::<f64>() / profits.len() as f64;
            MetricValue::Defined(mean / stddev * (profits.len() as f64).sqrt())
        }
        None => MetricValue::Undefined,
    }
}

/// Longest runs of consecutive winning and losing profits.
pub(crate) fn streaks<I: IntoIterator<Item = f64>>(profits: I) -> (usize, usize) {
    let (mut win_run, mut loss_run) = (0usize, 0usize);
    let (mut max_win, mut max_loss) = (0usize, 0usize);
    for p in profits {
        if p > 0.0 {
            win_run += 1;
            loss_run = 0;
        } else if p < 0.0 {
            loss_run += 1;
            win_run = 0;
        } else {
            win_run = 0;
            loss_run = 0;
        }
        max_win = max_win.max(win_run);
        max_loss = max_loss.max(loss_run);
    }
    (max_win, max_loss)
}
