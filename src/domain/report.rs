//! Serializable report bundles produced by the command layer.

use serde::Serialize;
use std::collections::BTreeMap;

use super::correlation::{CorrelationMatrix, ReturnBasis};
use super::error::QmetricsError;
use super::ledger::{AccumulationMode, Ledger};
use super::performance::{
    compute_equity_curve, compute_monthly, monthly_table, summary_stats, EquityPoint,
    MonthlyBucket, SummaryStats, YearRow,
};
use super::portfolio::{RiskWeights, StrategyWeight};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub strategy: String,
    pub mode: AccumulationMode,
    pub initial_equity: f64,
    pub summary: SummaryStats,
    pub equity_curve: Vec<EquityPoint>,
    pub monthly: Vec<MonthlyBucket>,
    pub monthly_table: Vec<YearRow>,
}

impl StrategyReport {
    pub fn build(strategy: &str, ledger: &Ledger) -> Self {
        let monthly = compute_monthly(ledger);
        StrategyReport {
            strategy: strategy.to_string(),
            mode: ledger.mode(),
            initial_equity: ledger.initial_equity(),
            summary: summary_stats(ledger),
            equity_curve: compute_equity_curve(ledger),
            monthly_table: monthly_table(&monthly),
            monthly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioReport {
    /// Multiplier applied to each strategy, after defaults.
    pub weights: Vec<StrategyWeight>,
    pub portfolio: StrategyReport,
    pub strategies: Vec<StrategyReport>,
}

impl PortfolioReport {
    pub fn build(
        ledgers: &BTreeMap<String, Ledger>,
        weights: &RiskWeights,
        portfolio: &Ledger,
    ) -> Result<Self, QmetricsError> {
        let applied = ledgers
            .keys()
            .map(|id| Ok(StrategyWeight::new(id, weights.multiplier_for(id)?)))
            .collect::<Result<Vec<_>, QmetricsError>>()?;
        Ok(PortfolioReport {
            weights: applied,
            portfolio: StrategyReport::build("portfolio", portfolio),
            strategies: ledgers
                .iter()
                .map(|(id, ledger)| StrategyReport::build(id, ledger))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    pub basis: ReturnBasis,
    pub matrix: CorrelationMatrix,
}
