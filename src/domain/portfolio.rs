//! Portfolio aggregation with per-strategy risk scaling.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::error::QmetricsError;
use super::ledger::{AccumulationMode, Ledger};
use super::trade::Trade;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyWeight {
    pub strategy_id: String,
    pub risk_multiplier: f64,
}

impl StrategyWeight {
    pub fn new(strategy_id: &str, risk_multiplier: f64) -> Self {
        StrategyWeight {
            strategy_id: strategy_id.to_string(),
            risk_multiplier,
        }
    }

    /// Scale trades exported at `base_risk` per trade to `desired_risk` per trade.
    pub fn fixed_risk(strategy_id: &str, desired_risk: f64, base_risk: f64) -> Self {
        let risk_multiplier = if base_risk != 0.0 {
            desired_risk / base_risk
        } else {
            1.0
        };
        StrategyWeight::new(strategy_id, risk_multiplier)
    }

    /// Risk `pct` percent of `balance` per trade, relative to `base_risk`.
    pub fn percent_risk(strategy_id: &str, pct: f64, balance: f64, base_risk: f64) -> Self {
        StrategyWeight::fixed_risk(strategy_id, balance * pct / 100.0, base_risk)
    }
}

/// Per-strategy multipliers plus the multiplier applied to unlisted strategies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskWeights {
    pub weights: Vec<StrategyWeight>,
    /// `None` makes an unweighted strategy a configuration error.
    pub default_multiplier: Option<f64>,
}

impl Default for RiskWeights {
    fn default() -> Self {
        RiskWeights {
            weights: Vec::new(),
            default_multiplier: Some(1.0),
        }
    }
}

impl RiskWeights {
    pub fn new(weights: Vec<StrategyWeight>, default_multiplier: Option<f64>) -> Self {
        RiskWeights {
            weights,
            default_multiplier,
        }
    }

    fn resolve(&self) -> Result<HashMap<&str, f64>, QmetricsError> {
        if let Some(default) = self.default_multiplier {
            check_multiplier("default", default)?;
        }
        let mut map = HashMap::with_capacity(self.weights.len());
        for w in &self.weights {
            check_multiplier(&w.strategy_id, w.risk_multiplier)?;
            if map.insert(w.strategy_id.as_str(), w.risk_multiplier).is_some() {
                return Err(QmetricsError::invalid(
                    "weights",
                    &w.strategy_id,
                    "strategy is weighted more than once",
                ));
            }
        }
        Ok(map)
    }

    pub fn multiplier_for(&self, strategy_id: &str) -> Result<f64, QmetricsError> {
        self.weights
            .iter()
            .find(|w| w.strategy_id == strategy_id)
            .map(|w| w.risk_multiplier)
            .or(self.default_multiplier)
            .ok_or_else(|| {
                QmetricsError::invalid(
                    "weights",
                    strategy_id,
                    "no risk multiplier for strategy and no default configured",
                )
            })
    }
}

fn check_multiplier(key: &str, value: f64) -> Result<(), QmetricsError> {
    if !value.is_finite() || value < 0.0 {
        return Err(QmetricsError::invalid(
            "weights",
            key,
            format!("risk multiplier must be finite and non-negative, got {value}"),
        ));
    }
    Ok(())
}

/// Scale each strategy's trades and merge them into one ledger in global exit order.
///
/// Ties on exit time are broken by strategy id, then by each ledger's own order,
/// so the result does not depend on the iteration order of `ledgers`.
pub fn aggregate<'a, I>(ledgers: I, weights: &RiskWeights) -> Result<Ledger, QmetricsError>
where
    I: IntoIterator<Item = (&'a String, &'a Ledger)>,
{
    let sorted: BTreeMap<&String, &Ledger> = ledgers.into_iter().collect();
    let (first_id, first) = match sorted.iter().next() {
        Some((id, ledger)) => (*id, *ledger),
        None => {
            return Err(QmetricsError::EmptyInput {
                context: "portfolio requires at least one strategy ledger".into(),
            })
        }
    };

    let explicit = weights.resolve()?;
    let mut merged: Vec<(usize, Trade)> = Vec::new();

    for (rank, (id, ledger)) in sorted.iter().enumerate() {
        if ledger.mode() != first.mode() {
            return Err(QmetricsError::invalid(
                "analysis",
                "mode",
                format!(
                    "strategy {id} uses {} accumulation but {first_id} uses {}",
                    ledger.mode(),
                    first.mode()
                ),
            ));
        }
        if ledger.initial_equity() != first.initial_equity() {
            return Err(QmetricsError::invalid(
                "analysis",
                "initial_equity",
                format!("strategy {id} starts from a different initial equity than {first_id}"),
            ));
        }

        let multiplier = match explicit.get(id.as_str()) {
            Some(m) => *m,
            None => weights.multiplier_for(id)?,
        };

        if first.mode() == AccumulationMode::Compounding
            && ledger.trades().iter().any(|t| t.profit * multiplier <= -1.0)
        {
            return Err(QmetricsError::invalid(
                "weights",
                id.as_str(),
                format!("multiplier {multiplier} scales a compounding return to -100% or worse"),
            ));
        }

        merged.extend(ledger.trades().iter().map(|t| {
            (
                rank,
                Trade {
                    strategy_id: (*id).clone(),
                    profit: t.profit * multiplier,
                    ..t.clone()
                },
            )
        }));
    }

    // Stable sort: equal keys keep per-ledger order.
    merged.sort_by_key(|(rank, t)| (t.exit_time, *rank));
    let trades = merged.into_iter().map(|(_, t)| t).collect();
    Ledger::from_trades(trades, first.mode(), first.initial_equity())
}
