//! CSV trade file adapter.
//!
//! Expects a header row naming `strategy`, `entry_time`, `exit_time`, `profit` and
//! optionally `size`, in any order. Timestamps are RFC 3339 or naive UTC.

use crate::domain::error::{QmetricsError, RowIssue};
use crate::domain::trade::{parse_timestamp, RawTrade};
use crate::ports::trade_port::TradePort;
use std::io::Read;
use std::path::PathBuf;

const REQUIRED_COLUMNS: [&str; 4] = ["strategy", "entry_time", "exit_time", "profit"];
const OPTIONAL_COLUMNS: [&str; 1] = ["size"];

pub struct CsvTradeAdapter {
    path: PathBuf,
}

#[derive(Debug)]
struct ColumnMap {
    strategy: usize,
    entry_time: usize,
    exit_time: usize,
    profit: usize,
    size: Option<usize>,
}

impl CsvTradeAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Parse trades from any reader; used for files and stdin alike.
    pub fn read_from<R: Read>(reader: R) -> Result<Vec<RawTrade>, QmetricsError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let columns = map_columns(rdr.headers()?)?;

        let mut trades = Vec::new();
        let mut issues = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            match parse_record(row, &record, &columns) {
                Ok(raw) => trades.push(raw),
                Err(mut row_issues) => issues.append(&mut row_issues),
            }
        }

        if !issues.is_empty() {
            return Err(QmetricsError::Validation { issues });
        }
        tracing::debug!(rows = trades.len(), "parsed trade csv");
        Ok(trades)
    }
}

impl TradePort for CsvTradeAdapter {
    fn load_trades(&self) -> Result<Vec<RawTrade>, QmetricsError> {
        let file = std::fs::File::open(&self.path)?;
        Self::read_from(file)
    }
}

/// Header problems are reported against row 0.
fn map_columns(headers: &csv::StringRecord) -> Result<ColumnMap, QmetricsError> {
    let names: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let mut issues = Vec::new();

    for name in &names {
        if !REQUIRED_COLUMNS.contains(&name.as_str()) && !OPTIONAL_COLUMNS.contains(&name.as_str()) {
            issues.push(RowIssue {
                row: 0,
                reason: format!("header: unknown column '{name}'"),
            });
        }
    }
    let position = |column: &str| names.iter().position(|n| n == column);
    for column in REQUIRED_COLUMNS {
        if position(column).is_none() {
            issues.push(RowIssue {
                row: 0,
                reason: format!("header: missing required column '{column}'"),
            });
        }
    }
    if !issues.is_empty() {
        return Err(QmetricsError::Validation { issues });
    }

    Ok(ColumnMap {
        strategy: position("strategy").unwrap_or_default(),
        entry_time: position("entry_time").unwrap_or_default(),
        exit_time: position("exit_time").unwrap_or_default(),
        profit: position("profit").unwrap_or_default(),
        size: position("size"),
    })
}

/// Empty cells become `None` and are reported by the ledger builder; cells that
/// are present but unparseable are reported here.
fn parse_record(
    row: usize,
    record: &csv::StringRecord,
    columns: &ColumnMap,
) -> Result<RawTrade, Vec<RowIssue>> {
    let mut issues = Vec::new();
    let cell = |idx: usize| record.get(idx).filter(|v| !v.is_empty());

    let mut timestamp = |idx: usize, name: &str| {
        cell(idx).and_then(|v| {
            let parsed = parse_timestamp(v);
            if parsed.is_none() {
                issues.push(RowIssue {
                    row,
                    reason: format!("{name} '{v}' is not a recognised timestamp"),
                });
            }
            parsed
        })
    };
    let entry_time = timestamp(columns.entry_time, "entry_time");
    let exit_time = timestamp(columns.exit_time, "exit_time");

    let mut number = |idx: usize, name: &str| {
        cell(idx).and_then(|v| match v.parse::<f64>() {
            Ok(n) => Some(n),
            Err(_) => {
                issues.push(RowIssue {
                    row,
                    reason: format!("{name} '{v}' is not a number"),
                });
                None
            }
        })
    };
    let profit = number(columns.profit, "profit");
    let size = columns.size.and_then(|idx| number(idx, "size"));

    if !issues.is_empty() {
        return Err(issues);
    }
    Ok(RawTrade {
        strategy: cell(columns.strategy).map(str::to_string),
        entry_time,
        exit_time,
        profit,
        size,
    })
}
