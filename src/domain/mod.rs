//! Core domain types and logic.

pub mod config_validation;
pub mod correlation;
pub mod error;
pub mod ledger;
pub mod metric_value;
pub mod monte_carlo;
pub mod performance;
pub mod portfolio;
pub mod report;
pub mod risk;
pub mod robustness;
pub mod trade;
