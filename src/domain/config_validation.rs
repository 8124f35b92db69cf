//! Configuration validation.
//!
//! Converts raw INI sections into typed engine configs, failing on the first
//! missing or malformed value.

use crate::domain::error::QmetricsError;
use crate::domain::ledger::{AccumulationMode, Ledger};
use crate::domain::monte_carlo::{MonteCarloConfig, ResampleMethod};
use crate::domain::portfolio::{RiskWeights, StrategyWeight};
use crate::domain::robustness::{split_point_at_fraction, Metric, MetricThreshold};
use crate::domain::trade::parse_timestamp;
use crate::ports::config_port::ConfigPort;
use chrono::{DateTime, Utc};
use std::str::FromStr;

const DEFAULT_BASE_RISK: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    pub mode: AccumulationMode,
    pub initial_equity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitSpec {
    At(DateTime<Utc>),
    Fraction(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobustnessConfig {
    pub split: SplitSpec,
    pub thresholds: Vec<MetricThreshold>,
}

impl RobustnessConfig {
    pub fn split_point(&self, ledger: &Ledger) -> Result<DateTime<Utc>, QmetricsError> {
        match self.split {
            SplitSpec::At(ts) => Ok(ts),
            SplitSpec::Fraction(f) => split_point_at_fraction(ledger, f),
        }
    }
}

pub fn build_analysis_config(config: &dyn ConfigPort) -> Result<AnalysisConfig, QmetricsError> {
    let raw_mode = config
        .get_string("analysis", "mode")
        .ok_or_else(|| QmetricsError::missing("analysis", "mode"))?;
    let mode: AccumulationMode = raw_mode
        .parse()
        .map_err(|reason: String| QmetricsError::invalid("analysis", "mode", reason))?;
    let initial_equity = parse_optional::<f64>(config, "analysis", "initial_equity")?
        .unwrap_or_else(|| mode.default_initial_equity());
    ensure_finite("analysis", "initial_equity", initial_equity)?;
    Ok(AnalysisConfig {
        mode,
        initial_equity,
    })
}

/// `[weights]` multipliers, overridden per strategy by risk sizes in `[risk]`.
pub fn build_risk_weights(
    config: &dyn ConfigPort,
    analysis: &AnalysisConfig,
) -> Result<RiskWeights, QmetricsError> {
    let default_multiplier = match config.get_string("weights", "default") {
        None => Some(1.0),
        Some(v) if v.eq_ignore_ascii_case("none") => None,
        Some(v) => Some(parse_value::<f64>("weights", "default", &v)?),
    };

    let mut weights: Vec<StrategyWeight> = Vec::new();
    for key in config.keys("weights") {
        if key == "default" {
            continue;
        }
        let multiplier = parse_required::<f64>(config, "weights", &key)?;
        weights.push(StrategyWeight::new(&key, multiplier));
    }

    let base_risk =
        parse_optional::<f64>(config, "risk", "base_risk")?.unwrap_or(DEFAULT_BASE_RISK);
    if !(base_risk.is_finite() && base_risk > 0.0) {
        return Err(QmetricsError::invalid(
            "risk",
            "base_risk",
            format!("base risk must be positive, got {base_risk}"),
        ));
    }
    let balance = parse_optional::<f64>(config, "risk", "balance")?.unwrap_or(analysis.initial_equity);
    ensure_finite("risk", "balance", balance)?;

    for key in config.keys("risk") {
        if key == "base_risk" || key == "balance" {
            continue;
        }
        let raw = config
            .get_string("risk", &key)
            .ok_or_else(|| QmetricsError::missing("risk", &key))?;
        let weight = match raw.strip_suffix('%') {
            Some(pct) => {
                let pct = parse_value::<f64>("risk", &key, pct.trim())?;
                if balance <= 0.0 {
                    return Err(QmetricsError::invalid(
                        "risk",
                        &key,
                        "percent risk needs a positive balance",
                    ));
                }
                StrategyWeight::percent_risk(&key, pct, balance, base_risk)
            }
            None => {
                let amount = parse_value::<f64>("risk", &key, &raw)?;
                StrategyWeight::fixed_risk(&key, amount, base_risk)
            }
        };
        weights.retain(|w| w.strategy_id != key);
        weights.push(weight);
    }

    Ok(RiskWeights::new(weights, default_multiplier))
}

pub fn build_monte_carlo_config(config: &dyn ConfigPort) -> Result<MonteCarloConfig, QmetricsError> {
    let defaults = MonteCarloConfig::default();
    let method = match config.get_string("monte_carlo", "method") {
        Some(raw) => raw
            .parse::<ResampleMethod>()
            .map_err(|reason| QmetricsError::invalid("monte_carlo", "method", reason))?,
        None => defaults.method,
    };
    let percentiles = match config.get_string("monte_carlo", "percentiles") {
        Some(raw) => raw
            .split(',')
            .map(|p| parse_value::<f64>("monte_carlo", "percentiles", p.trim()))
            .collect::<Result<Vec<_>, _>>()?,
        None => defaults.percentiles,
    };

    let mc = MonteCarloConfig {
        n_runs: parse_optional(config, "monte_carlo", "runs")?.unwrap_or(defaults.n_runs),
        method,
        horizon: parse_optional(config, "monte_carlo", "horizon")?,
        seed: parse_optional(config, "monte_carlo", "seed")?,
        ruin_threshold: parse_optional(config, "monte_carlo", "ruin_threshold")?,
        block_size: parse_optional(config, "monte_carlo", "block_size")?,
        percentiles,
        keep_runs: defaults.keep_runs,
    };

    if mc.n_runs == 0 {
        return Err(QmetricsError::invalid("monte_carlo", "runs", "runs must be at least 1"));
    }
    if mc.horizon == Some(0) {
        return Err(QmetricsError::invalid(
            "monte_carlo",
            "horizon",
            "horizon must be at least 1",
        ));
    }
    if mc.block_size == Some(0) {
        return Err(QmetricsError::invalid(
            "monte_carlo",
            "block_size",
            "block size must be at least 1",
        ));
    }
    if let Some(p) = mc.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(QmetricsError::invalid(
            "monte_carlo",
            "percentiles",
            format!("percentile {p} is outside [0, 100]"),
        ));
    }
    Ok(mc)
}

pub fn build_robustness_config(config: &dyn ConfigPort) -> Result<RobustnessConfig, QmetricsError> {
    let split = match (
        config.get_string("robustness", "split"),
        config.get_string("robustness", "split_fraction"),
    ) {
        (Some(_), Some(_)) => {
            return Err(QmetricsError::invalid(
                "robustness",
                "split",
                "set either split or split_fraction, not both",
            ));
        }
        (Some(raw), None) => SplitSpec::At(parse_timestamp(&raw).ok_or_else(|| {
            QmetricsError::invalid(
                "robustness",
                "split",
                format!("'{raw}' is not an RFC 3339 timestamp or YYYY-MM-DD date"),
            )
        })?),
        (None, Some(raw)) => {
            let fraction = parse_value::<f64>("robustness", "split_fraction", &raw)?;
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(QmetricsError::invalid(
                    "robustness",
                    "split_fraction",
                    format!("fraction must lie strictly between 0 and 1, got {fraction}"),
                ));
            }
            SplitSpec::Fraction(fraction)
        }
        (None, None) => return Err(QmetricsError::missing("robustness", "split")),
    };

    Ok(RobustnessConfig {
        split,
        thresholds: build_thresholds(config)?,
    })
}

pub fn build_thresholds(config: &dyn ConfigPort) -> Result<Vec<MetricThreshold>, QmetricsError> {
    let keys = config.keys("thresholds");
    if keys.is_empty() {
        return Err(QmetricsError::missing("thresholds", "<metric>"));
    }
    keys.iter()
        .map(|key| {
            let metric: Metric = key
                .parse()
                .map_err(|reason: String| QmetricsError::invalid("thresholds", key, reason))?;
            let rule = config
                .get_string("thresholds", key)
                .ok_or_else(|| QmetricsError::missing("thresholds", key))?;
            MetricThreshold::parse(metric, &rule)
                .map_err(|reason| QmetricsError::invalid("thresholds", key, reason))
        })
        .collect()
}

fn parse_value<T: FromStr>(section: &str, key: &str, raw: &str) -> Result<T, QmetricsError> {
    raw.trim().parse::<T>().map_err(|_| {
        QmetricsError::invalid(
            section,
            key,
            format!("'{raw}' is not a valid {}", std::any::type_name::<T>()),
        )
    })
}

fn parse_optional<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, QmetricsError> {
    config
        .get_string(section, key)
        .map(|raw| parse_value(section, key, &raw))
        .transpose()
}

fn parse_required<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<T, QmetricsError> {
    parse_optional(config, section, key)?.ok_or_else(|| QmetricsError::missing(section, key))
}

fn ensure_finite(section: &str, key: &str, value: f64) -> Result<(), QmetricsError> {
    if !value.is_finite() {
        return Err(QmetricsError::invalid(section, key, "value must be finite"));
    }
    Ok(())
}
