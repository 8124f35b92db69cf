#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use qmetrics::domain::ledger::{build_ledger, AccumulationMode, Ledger};
use qmetrics::domain::trade::RawTrade;
use std::io::Write;

pub fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 16, 0, 0).unwrap()
}

/// One trade per day from 2024-01-01, each held for one day.
pub fn daily_trades(strategy: &str, profits: &[f64]) -> Vec<RawTrade> {
    let start = ts(2024, 1, 1);
    profits
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let exit = start + Duration::days(i as i64 + 1);
            RawTrade::new(strategy, exit - Duration::days(1), exit, p)
        })
        .collect()
}

pub fn additive_ledger(strategy: &str, profits: &[f64]) -> Ledger {
    build_ledger(&daily_trades(strategy, profits), AccumulationMode::Additive).unwrap()
}

/// One trade per month from January 2023, exiting on the 15th.
pub fn monthly_trades(strategy: &str, profits: &[f64]) -> Vec<RawTrade> {
    profits
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let year = 2023 + (i / 12) as i32;
            let month = (i % 12) as u32 + 1;
            let exit = ts(year, month, 15);
            RawTrade::new(strategy, exit - Duration::days(2), exit, p)
        })
        .collect()
}

pub fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub const TRADES_CSV: &str = "\
strategy,entry_time,exit_time,profit,size
Trend,2024-01-02,2024-01-05,120,1
Carry,2024-01-03,2024-01-08,-40,1
Trend,2024-01-20,2024-02-02,-60,1
Carry,2024-02-01,2024-02-10,90,1
Trend,2024-02-12,2024-03-01,200,1
Carry,2024-03-02,2024-03-15,-30,1
Trend,2024-03-18,2024-04-03,-20,1
Carry,2024-04-01,2024-04-12,55,1
";

pub const BASE_INI: &str = "\
[analysis]
mode = additive
initial_equity = 10000

[weights]
Trend = 1
Carry = 0.5

[monte_carlo]
runs = 200
method = without_replacement
seed = 11
ruin_threshold = 9800

[robustness]
split = 2024-03-01

[thresholds]
profit_factor = >= 1.5
max_drawdown = <= 500
";
