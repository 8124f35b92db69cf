//! Monte Carlo resampling of a ledger's trade sequence.
//!
//! Runs are independent and evaluated in parallel with rayon. Run `i` draws from
//! its own generator seeded with `seed + i`, and results are collected in run
//! order, so a batch is reproducible from its seed whatever the thread count.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::error::QmetricsError;
use super::ledger::{AccumulationMode, Ledger};
use super::metric_value::MetricValue;
use super::performance::{fold_equity, streaks};

/// Levels reported in the confidence table.
pub const CONFIDENCE_LEVELS: [f64; 7] = [50.0, 70.0, 80.0, 90.0, 95.0, 98.0, 100.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    /// Independent draws from the profit distribution; breaks autocorrelation.
    WithReplacement,
    /// Random permutation of the trades; keeps the profit multiset.
    WithoutReplacement,
    /// Contiguous blocks drawn at random offsets, wrapping at the end.
    BlockBootstrap,
}

impl FromStr for ResampleMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "with_replacement" | "resample_with_replacement" | "random_choice" => {
                Ok(ResampleMethod::WithReplacement)
            }
            "without_replacement" | "resample_without_replacement" | "shuffle" => {
                Ok(ResampleMethod::WithoutReplacement)
            }
            "block_bootstrap" | "block" => Ok(ResampleMethod::BlockBootstrap),
            other => Err(format!(
                "unknown resampling method '{other}', expected with_replacement, \
                 without_replacement or block_bootstrap"
            )),
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResampleMethod::WithReplacement => "with_replacement",
            ResampleMethod::WithoutReplacement => "without_replacement",
            ResampleMethod::BlockBootstrap => "block_bootstrap",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloConfig {
    pub n_runs: usize,
    pub method: ResampleMethod,
    /// Trades per run; the ledger's trade count when `None`.
    pub horizon: Option<usize>,
    /// Drawn from entropy when `None` and recorded in the batch.
    pub seed: Option<u64>,
    /// Equity level at or below which a run counts as ruined.
    pub ruin_threshold: Option<f64>,
    /// Block length for [`ResampleMethod::BlockBootstrap`]; `ceil(sqrt(n))` when `None`.
    pub block_size: Option<usize>,
    pub percentiles: Vec<f64>,
    /// Keep each run's profits and equity points in the batch. Summaries are
    /// computed either way.
    pub keep_runs: bool,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            n_runs: 1000,
            method: ResampleMethod::WithReplacement,
            horizon: None,
            seed: None,
            ruin_threshold: None,
            block_size: None,
            percentiles: vec![5.0, 50.0, 95.0],
            keep_runs: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunPoint {
    /// One-based trade number within the run.
    pub trade: usize,
    pub value: f64,
    pub drawdown: f64,
}

/// One simulated sequence. `profits` and `points` are empty unless the batch
/// was configured to keep runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRun {
    pub index: usize,
    pub seed: u64,
    pub profits: Vec<f64>,
    pub points: Vec<RunPoint>,
    pub final_equity: f64,
    pub min_equity: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: MetricValue,
    pub ruined: bool,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: f64,
}

/// Cross-run distribution of equity after a given trade number.
///
/// `low` and `high` sit at the smallest and largest configured percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityBand {
    pub trade: usize,
    pub low: f64,
    pub median: f64,
    pub high: f64,
    pub mean: f64,
}

/// Outcome that `level` percent of runs meet or beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceRow {
    pub level: f64,
    pub net_profit: f64,
    pub max_drawdown: f64,
    pub return_to_drawdown: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationBatch {
    pub method: ResampleMethod,
    pub n_runs: usize,
    pub horizon: usize,
    pub seed: u64,
    pub block_size: Option<usize>,
    pub initial_equity: f64,
    pub runs: Vec<SimulationRun>,
    pub final_equity: Vec<PercentileValue>,
    pub max_drawdown: Vec<PercentileValue>,
    pub mean_final_equity: f64,
    pub equity_bands: Vec<EquityBand>,
    pub confidence: Vec<ConfidenceRow>,
    pub ruin_threshold: Option<f64>,
    pub probability_of_ruin: Option<f64>,
}

/// Generates one synthetic profit sequence per run.
struct Sampler<'a> {
    profits: &'a [f64],
    method: ResampleMethod,
    horizon: usize,
    block_size: usize,
}

impl Sampler<'_> {
    fn sample(&self, rng: &mut StdRng) -> Vec<f64> {
        let n = self.profits.len();
        match self.method {
            ResampleMethod::WithReplacement => (0..self.horizon)
                .map(|_| self.profits[rng.gen_range(0..n)])
                .collect(),
            ResampleMethod::WithoutReplacement => {
                let mut shuffled = self.profits.to_vec();
                shuffled.shuffle(rng);
                shuffled.truncate(self.horizon);
                shuffled
            }
            ResampleMethod::BlockBootstrap => {
                let mut out = Vec::with_capacity(self.horizon);
                while out.len() < self.horizon {
                    let start = rng.gen_range(0..n);
                    let take = self.block_size.min(self.horizon - out.len());
                    out.extend((0..take).map(|k| self.profits[(start + k) % n]));
                }
                out
            }
        }
    }
}

pub fn simulate(ledger: &Ledger, config: &MonteCarloConfig) -> Result<SimulationBatch, QmetricsError> {
    let profits: Vec<f64> = ledger.profits().collect();
    let n = profits.len();
    let horizon = config.horizon.unwrap_or(n);
    validate_config(config, n, horizon)?;

    let block_size = match config.method {
        ResampleMethod::BlockBootstrap => {
            Some(config.block_size.unwrap_or_else(|| (n as f64).sqrt().ceil() as usize))
        }
        _ => None,
    };
    let seed = config.seed.unwrap_or_else(rand::random);
    let sampler = Sampler {
        profits: &profits,
        method: config.method,
        horizon,
        block_size: block_size.unwrap_or(1),
    };
    let mode = ledger.mode();
    let initial_equity = ledger.initial_equity();

    let (runs, paths): (Vec<SimulationRun>, Vec<Vec<f64>>) = (0..config.n_runs)
        .into_par_iter()
        .map(|index| {
            let run_seed = seed.wrapping_add(index as u64);
            let mut rng = StdRng::seed_from_u64(run_seed);
            let sampled = sampler.sample(&mut rng);
            evaluate_run(
                index,
                run_seed,
                sampled,
                mode,
                initial_equity,
                config.ruin_threshold,
                config.keep_runs,
            )
        })
        .unzip();

    let mut finals: Vec<f64> = runs.iter().map(|r| r.final_equity).collect();
    let mut drawdowns: Vec<f64> = runs.iter().map(|r| r.max_drawdown).collect();
    finals.sort_by(f64::total_cmp);
    drawdowns.sort_by(f64::total_cmp);

    let probability_of_ruin = config
        .ruin_threshold
        .map(|_| runs.iter().filter(|r| r.ruined).count() as f64 / runs.len() as f64);

    let batch = SimulationBatch {
        method: config.method,
        n_runs: config.n_runs,
        horizon,
        seed,
        block_size,
        initial_equity,
        final_equity: percentile_values(&finals, &config.percentiles),
        max_drawdown: percentile_values(&drawdowns, &config.percentiles),
        mean_final_equity: finals.iter().sum::<f64>() / finals.len() as f64,
        equity_bands: equity_bands(&paths, horizon, &config.percentiles),
        confidence: confidence_table(&finals, &drawdowns, initial_equity),
        ruin_threshold: config.ruin_threshold,
        probability_of_ruin,
        runs: if config.keep_runs { runs } else { Vec::new() },
    };

    tracing::debug!(
        runs = batch.n_runs,
        horizon,
        seed,
        method = %batch.method,
        "simulation batch complete"
    );
    Ok(batch)
}

fn validate_config(config: &MonteCarloConfig, n: usize, horizon: usize) -> Result<(), QmetricsError> {
    if config.n_runs == 0 {
        return Err(QmetricsError::invalid("monte_carlo", "runs", "runs must be at least 1"));
    }
    if horizon == 0 {
        return Err(QmetricsError::invalid(
            "monte_carlo",
            "horizon",
            "horizon must be at least 1",
        ));
    }
    if config.method == ResampleMethod::WithoutReplacement && horizon > n {
        return Err(QmetricsError::invalid(
            "monte_carlo",
            "horizon",
            format!("without_replacement cannot draw {horizon} trades from a ledger of {n}"),
        ));
    }
    if let Some(block) = config.block_size {
        if block == 0 || block > n {
            return Err(QmetricsError::invalid(
                "monte_carlo",
                "block_size",
                format!("block size must be between 1 and the trade count ({n}), got {block}"),
            ));
        }
    }
    if config.percentiles.is_empty() {
        return Err(QmetricsError::missing("monte_carlo", "percentiles"));
    }
    if let Some(p) = config
        .percentiles
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p > 100.0)
    {
        return Err(QmetricsError::invalid(
            "monte_carlo",
            "percentiles",
            format!("percentile {p} is outside [0, 100]"),
        ));
    }
    if let Some(threshold) = config.ruin_threshold {
        if !threshold.is_finite() {
            return Err(QmetricsError::invalid(
                "monte_carlo",
                "ruin_threshold",
                "ruin threshold must be finite",
            ));
        }
    }
    Ok(())
}

/// Fold one sampled sequence; also returns its equity path for the bands.
fn evaluate_run(
    index: usize,
    seed: u64,
    profits: Vec<f64>,
    mode: AccumulationMode,
    initial_equity: f64,
    ruin_threshold: Option<f64>,
    keep_runs: bool,
) -> (SimulationRun, Vec<f64>) {
    let mut path = Vec::with_capacity(profits.len());
    let mut points = Vec::new();
    let mut min_equity = f64::INFINITY;
    let drawdown = fold_equity(profits.iter().copied(), mode, initial_equity, |i, value, dd| {
        min_equity = min_equity.min(value);
        path.push(value);
        if keep_runs {
            points.push(RunPoint {
                trade: i + 1,
                value,
                drawdown: dd,
            });
        }
    });
    let (max_consecutive_wins, max_consecutive_losses) = streaks(profits.iter().copied());
    let final_equity = path.last().copied().unwrap_or(initial_equity);

    let run = SimulationRun {
        index,
        seed,
        final_equity,
        min_equity,
        max_drawdown: drawdown.max_drawdown,
        max_drawdown_pct: drawdown.max_drawdown_pct,
        ruined: ruin_threshold.is_some_and(|t| min_equity <= t),
        max_consecutive_wins,
        max_consecutive_losses,
        profits: if keep_runs { profits } else { Vec::new() },
        points,
    };
    (run, path)
}

/// Linear interpolation between order statistics of an ascending slice.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = pct / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

fn percentile_values(sorted: &[f64], percentiles: &[f64]) -> Vec<PercentileValue> {
    percentiles
        .iter()
        .map(|&p| PercentileValue {
            percentile: p,
            value: percentile(sorted, p),
        })
        .collect()
}

fn equity_bands(paths: &[Vec<f64>], horizon: usize, percentiles: &[f64]) -> Vec<EquityBand> {
    let low = percentiles.iter().copied().fold(f64::INFINITY, f64::min);
    let high = percentiles.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (0..horizon)
        .into_par_iter()
        .map(|step| {
            let mut values: Vec<f64> = paths.iter().map(|p| p[step]).collect();
            values.sort_by(f64::total_cmp);
            EquityBand {
                trade: step + 1,
                low: percentile(&values, low),
                median: percentile(&values, 50.0),
                high: percentile(&values, high),
                mean: values.iter().sum::<f64>() / values.len() as f64,
            }
        })
        .collect()
}

/// Net profit reached by at least `level`% of runs and drawdown not exceeded by `level`% of runs.
fn confidence_table(finals: &[f64], drawdowns: &[f64], initial_equity: f64) -> Vec<ConfidenceRow> {
    CONFIDENCE_LEVELS
        .iter()
        .map(|&level| {
            let net_profit = percentile(finals, 100.0 - level) - initial_equity;
            let max_drawdown = percentile(drawdowns, level);
            let return_to_drawdown = if max_drawdown > 0.0 {
                MetricValue::Defined(net_profit / max_drawdown)
            } else if net_profit > 0.0 {
                MetricValue::Infinite
            } else {
                MetricValue::Undefined
            };
            ConfidenceRow {
                level,
                net_profit,
                max_drawdown,
                return_to_drawdown,
            }
        })
        .collect()
}
