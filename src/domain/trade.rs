//! Closed trade records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

/// A closed position, validated and normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub strategy_id: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Currency amount, R-multiple, or return fraction depending on the ledger mode.
    pub profit: f64,
    /// Risk unit of the trade; 1.0 when the source omits it.
    pub size: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.profit < 0.0
    }

    pub fn holding_period(&self) -> chrono::Duration {
        self.exit_time - self.entry_time
    }
}

/// A trade row as handed over by a parsing collaborator.
///
/// Every attribute is optional so that a missing column or cell can be reported
/// instead of being silently coerced. [`crate::domain::ledger::build_ledger`]
/// turns these into [`Trade`]s or a validation error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrade {
    pub strategy: Option<String>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub profit: Option<f64>,
    pub size: Option<f64>,
}

impl RawTrade {
    pub fn new(
        strategy: &str,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        profit: f64,
    ) -> Self {
        RawTrade {
            strategy: Some(strategy.to_string()),
            entry_time: Some(entry_time),
            exit_time: Some(exit_time),
            profit: Some(profit),
            size: None,
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }
}

impl From<Trade> for RawTrade {
    fn from(trade: Trade) -> Self {
        RawTrade {
            strategy: Some(trade.strategy_id),
            entry_time: Some(trade.entry_time),
            exit_time: Some(trade.exit_time),
            profit: Some(trade.profit),
            size: Some(trade.size),
        }
    }
}

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DD[ HH:MM:SS]` taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
