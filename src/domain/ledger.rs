//! Validated, chronologically ordered trade ledgers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::{QmetricsError, RowIssue};
use super::trade::{RawTrade, Trade};

/// How trade profits accumulate into equity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationMode {
    /// `equity += profit`
    Additive,
    /// `equity *= 1 + profit`, profits are return fractions.
    Compounding,
}

impl AccumulationMode {
    pub fn default_initial_equity(self) -> f64 {
        match self {
            AccumulationMode::Additive => 0.0,
            AccumulationMode::Compounding => 1.0,
        }
    }

    /// Apply one trade's profit to the running equity.
    pub fn apply(self, equity: f64, profit: f64) -> f64 {
        match self {
            AccumulationMode::Additive => equity + profit,
            AccumulationMode::Compounding => equity * (1.0 + profit),
        }
    }
}

impl FromStr for AccumulationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "additive" => Ok(AccumulationMode::Additive),
            "compounding" => Ok(AccumulationMode::Compounding),
            other => Err(format!(
                "unknown accumulation mode '{other}', expected additive or compounding"
            )),
        }
    }
}

impl fmt::Display for AccumulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccumulationMode::Additive => write!(f, "additive"),
            AccumulationMode::Compounding => write!(f, "compounding"),
        }
    }
}

/// Trades sorted by exit time (ties keep input order), with the accumulation
/// mode and starting equity used to fold them. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ledger {
    trades: Vec<Trade>,
    mode: AccumulationMode,
    initial_equity: f64,
}

impl Ledger {
    /// Wrap trades that are already validated. Sorts stably by exit time.
    pub(crate) fn from_trades(
        mut trades: Vec<Trade>,
        mode: AccumulationMode,
        initial_equity: f64,
    ) -> Result<Self, QmetricsError> {
        if trades.is_empty() {
            return Err(QmetricsError::EmptyInput {
                context: "ledger requires at least one trade".into(),
            });
        }
        trades.sort_by_key(|t| t.exit_time);
        Ok(Ledger {
            trades,
            mode,
            initial_equity,
        })
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    pub fn mode(&self) -> AccumulationMode {
        self.mode
    }

    pub fn initial_equity(&self) -> f64 {
        self.initial_equity
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn profits(&self) -> impl Iterator<Item = f64> + '_ {
        self.trades.iter().map(|t| t.profit)
    }

    pub fn first_exit(&self) -> DateTime<Utc> {
        self.trades[0].exit_time
    }

    pub fn last_exit(&self) -> DateTime<Utc> {
        self.trades[self.trades.len() - 1].exit_time
    }

    /// Same trades folded from a different starting equity.
    pub fn with_initial_equity(self, initial_equity: f64) -> Result<Self, QmetricsError> {
        if !initial_equity.is_finite() {
            return Err(QmetricsError::invalid(
                "analysis",
                "initial_equity",
                "initial equity must be finite",
            ));
        }
        Ok(Ledger {
            initial_equity,
            ..self
        })
    }

    /// Trades exiting strictly before `split` and trades exiting at or after it.
    pub fn split_at(&self, split: DateTime<Utc>) -> (&[Trade], &[Trade]) {
        let idx = self.trades.partition_point(|t| t.exit_time < split);
        self.trades.split_at(idx)
    }
}

/// Validate raw rows and build a ledger sorted by exit time.
///
/// All offending rows are reported together; row numbers are zero-based
/// positions in `raw_trades`.
pub fn build_ledger(
    raw_trades: &[RawTrade],
    mode: AccumulationMode,
) -> Result<Ledger, QmetricsError> {
    if raw_trades.is_empty() {
        return Err(QmetricsError::EmptyInput {
            context: "no trades supplied".into(),
        });
    }
    let trades = validate_rows(raw_trades, mode)?;
    Ledger::from_trades(trades, mode, mode.default_initial_equity())
}

/// Validate a whole trade list, then build one ledger per strategy id.
pub fn build_ledgers(
    raw_trades: &[RawTrade],
    mode: AccumulationMode,
) -> Result<BTreeMap<String, Ledger>, QmetricsError> {
    if raw_trades.is_empty() {
        return Err(QmetricsError::EmptyInput {
            context: "no trades supplied".into(),
        });
    }
    let trades = validate_rows(raw_trades, mode)?;

    let mut grouped: BTreeMap<String, Vec<Trade>> = BTreeMap::new();
    for trade in trades {
        grouped
            .entry(trade.strategy_id.clone())
            .or_default()
            .push(trade);
    }

    grouped
        .into_iter()
        .map(|(id, trades)| {
            let ledger = Ledger::from_trades(trades, mode, mode.default_initial_equity())?;
            Ok((id, ledger))
        })
        .collect()
}

fn validate_rows(
    raw_trades: &[RawTrade],
    mode: AccumulationMode,
) -> Result<Vec<Trade>, QmetricsError> {
    let mut issues = Vec::new();
    let mut trades = Vec::with_capacity(raw_trades.len());

    for (row, raw) in raw_trades.iter().enumerate() {
        match validate_row(row, raw, mode) {
            Ok(trade) => trades.push(trade),
            Err(mut row_issues) => issues.append(&mut row_issues),
        }
    }

    if issues.is_empty() {
        Ok(trades)
    } else {
        Err(QmetricsError::Validation { issues })
    }
}

fn validate_row(
    row: usize,
    raw: &RawTrade,
    mode: AccumulationMode,
) -> Result<Trade, Vec<RowIssue>> {
    let mut issues = Vec::new();
    let mut issue = |reason: String| issues.push(RowIssue { row, reason });

    let strategy = match raw.strategy.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => {
            issue("missing strategy".into());
            None
        }
    };
    if raw.entry_time.is_none() {
        issue("missing entry_time".into());
    }
    if raw.exit_time.is_none() {
        issue("missing exit_time".into());
    }
    match raw.profit {
        None => issue("missing profit".into()),
        Some(p) if !p.is_finite() => issue(format!("profit is not finite ({p})")),
        // A return of -100% or worse wipes out compounding equity.
        Some(p) if mode == AccumulationMode::Compounding && p <= -1.0 => {
            issue(format!("compounding return must be greater than -1 ({p})"))
        }
        Some(_) => {}
    }
    let size = raw.size.unwrap_or(1.0);
    if !size.is_finite() || size <= 0.0 {
        issue(format!("size must be positive and finite ({size})"));
    }
    if let (Some(entry), Some(exit)) = (raw.entry_time, raw.exit_time) {
        if exit < entry {
            issue(format!("exit_time {exit} is before entry_time {entry}"));
        }
    }

    match (strategy, raw.entry_time, raw.exit_time, raw.profit) {
        (Some(strategy_id), Some(entry_time), Some(exit_time), Some(profit))
            if issues.is_empty() =>
        {
            Ok(Trade {
                strategy_id,
                entry_time,
                exit_time,
                profit,
                size,
            })
        }
        _ => Err(issues),
    }
}
