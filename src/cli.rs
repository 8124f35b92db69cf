//! CLI definition and dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_trade_adapter::CsvTradeAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::config_validation::{
    build_analysis_config, build_monte_carlo_config, build_risk_weights, build_robustness_config,
    AnalysisConfig,
};
use crate::domain::correlation::{correlate_ledgers, ReturnBasis};
use crate::domain::error::QmetricsError;
use crate::domain::ledger::{build_ledgers, AccumulationMode, Ledger};
use crate::domain::monte_carlo::{simulate, SimulationBatch};
use crate::domain::portfolio::{aggregate, RiskWeights};
use crate::domain::report::{CorrelationReport, PortfolioReport, StrategyReport};
use crate::domain::robustness::{evaluate, RobustnessVerdict};
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;
use crate::ports::trade_port::TradePort;

#[derive(Parser, Debug)]
#[command(name = "qmetrics", about = "Trade performance and robustness analytics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every analysis command.
#[derive(clap::Args, Debug, Clone)]
pub struct Inputs {
    /// Trade CSV with strategy, entry_time, exit_time, profit and optional size columns
    #[arg(short, long)]
    pub trades: PathBuf,
    /// INI configuration file
    #[arg(short, long)]
    pub config: PathBuf,
    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Indent the JSON report
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BasisArg {
    Percent,
    Absolute,
}

impl From<BasisArg> for ReturnBasis {
    fn from(arg: BasisArg) -> Self {
        match arg {
            BasisArg::Percent => ReturnBasis::Percent,
            BasisArg::Absolute => ReturnBasis::Absolute,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Per-strategy summary, equity curve and monthly breakdown
    Analyze {
        #[command(flatten)]
        inputs: Inputs,
        /// Only report this strategy
        #[arg(short, long)]
        strategy: Option<String>,
    },
    /// Risk-weighted portfolio of all strategies
    Portfolio {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Correlation of monthly returns between strategies
    Correlate {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, value_enum, default_value_t = BasisArg::Absolute)]
        basis: BasisArg,
    },
    /// Monte Carlo resampling of a strategy or the portfolio
    MonteCarlo {
        #[command(flatten)]
        inputs: Inputs,
        /// Simulate this strategy instead of the weighted portfolio
        #[arg(short, long)]
        strategy: Option<String>,
        /// Overrides [monte_carlo] seed
        #[arg(long)]
        seed: Option<u64>,
        /// Include every simulated run in the report
        #[arg(long)]
        include_runs: bool,
    },
    /// In-sample / out-of-sample threshold check
    Robustness {
        #[command(flatten)]
        inputs: Inputs,
        /// Evaluate this strategy instead of the weighted portfolio
        #[arg(short, long)]
        strategy: Option<String>,
    },
    /// Validate a trade file and, optionally, a configuration file
    Validate {
        #[arg(short, long)]
        trades: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Analyze { inputs, strategy } => {
            run_analyze(&inputs, strategy.as_deref()).and_then(|r| emit(&inputs, &r))
        }
        Command::Portfolio { inputs } => run_portfolio(&inputs).and_then(|r| emit(&inputs, &r)),
        Command::Correlate { inputs, basis } => {
            run_correlate(&inputs, basis.into()).and_then(|r| emit(&inputs, &r))
        }
        Command::MonteCarlo {
            inputs,
            strategy,
            seed,
            include_runs,
        } => run_monte_carlo(&inputs, strategy.as_deref(), seed, include_runs)
            .and_then(|r| emit(&inputs, &r)),
        Command::Robustness { inputs, strategy } => {
            run_robustness(&inputs, strategy.as_deref()).and_then(|verdict| {
                emit(&inputs, &verdict)?;
                if !verdict.passed {
                    tracing::warn!("robustness thresholds not met");
                }
                Ok(())
            })
        }
        Command::Validate { trades, config } => run_validate(&trades, config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn emit<T: serde::Serialize>(inputs: &Inputs, report: &T) -> Result<(), QmetricsError> {
    JsonReportAdapter::new(inputs.output.clone(), inputs.pretty).write(report)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, QmetricsError> {
    tracing::info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Read, validate and group the trade file, applying the configured initial equity.
pub fn load_ledgers(
    trades_path: &Path,
    analysis: &AnalysisConfig,
) -> Result<BTreeMap<String, Ledger>, QmetricsError> {
    tracing::info!(path = %trades_path.display(), "loading trades");
    let raw = CsvTradeAdapter::new(trades_path.to_path_buf()).load_trades()?;
    let ledgers = build_ledgers(&raw, analysis.mode)?
        .into_iter()
        .map(|(id, ledger)| Ok((id, ledger.with_initial_equity(analysis.initial_equity)?)))
        .collect::<Result<BTreeMap<_, _>, QmetricsError>>()?;
    tracing::info!(
        trades = raw.len(),
        strategies = ledgers.len(),
        mode = %analysis.mode,
        "ledgers built"
    );
    Ok(ledgers)
}

/// The named strategy's ledger, or the risk-weighted portfolio when none is named.
pub fn select_ledger(
    ledgers: &BTreeMap<String, Ledger>,
    strategy: Option<&str>,
    weights: &RiskWeights,
) -> Result<(String, Ledger), QmetricsError> {
    match strategy {
        Some(id) => ledgers
            .get(id)
            .map(|l| (id.to_string(), l.clone()))
            .ok_or_else(|| QmetricsError::EmptyInput {
                context: format!("no trades for strategy {id}"),
            }),
        None => Ok(("portfolio".to_string(), aggregate(ledgers, weights)?)),
    }
}

pub fn run_analyze(
    inputs: &Inputs,
    strategy: Option<&str>,
) -> Result<Vec<StrategyReport>, QmetricsError> {
    let config = load_config(&inputs.config)?;
    let analysis = build_analysis_config(&config)?;
    let ledgers = load_ledgers(&inputs.trades, &analysis)?;

    let reports: Vec<StrategyReport> = ledgers
        .iter()
        .filter(|(id, _)| strategy.is_none_or(|s| s == id.as_str()))
        .map(|(id, ledger)| StrategyReport::build(id, ledger))
        .collect();
    if reports.is_empty() {
        return Err(QmetricsError::EmptyInput {
            context: format!("no trades for strategy {}", strategy.unwrap_or_default()),
        });
    }
    Ok(reports)
}

pub fn run_portfolio(inputs: &Inputs) -> Result<PortfolioReport, QmetricsError> {
    let config = load_config(&inputs.config)?;
    let analysis = build_analysis_config(&config)?;
    let weights = build_risk_weights(&config, &analysis)?;
    let ledgers = load_ledgers(&inputs.trades, &analysis)?;

    let portfolio = aggregate(&ledgers, &weights)?;
    tracing::info!(trades = portfolio.len(), "portfolio aggregated");
    PortfolioReport::build(&ledgers, &weights, &portfolio)
}

pub fn run_correlate(inputs: &Inputs, basis: ReturnBasis) -> Result<CorrelationReport, QmetricsError> {
    let config = load_config(&inputs.config)?;
    let analysis = build_analysis_config(&config)?;
    let ledgers = load_ledgers(&inputs.trades, &analysis)?;

    let matrix = correlate_ledgers(&ledgers, basis)?;
    tracing::info!(strategies = matrix.strategies.len(), "correlation computed");
    Ok(CorrelationReport { basis, matrix })
}

pub fn run_monte_carlo(
    inputs: &Inputs,
    strategy: Option<&str>,
    seed: Option<u64>,
    include_runs: bool,
) -> Result<SimulationBatch, QmetricsError> {
    let config = load_config(&inputs.config)?;
    let analysis = build_analysis_config(&config)?;
    let weights = build_risk_weights(&config, &analysis)?;
    let mut mc = build_monte_carlo_config(&config)?;
    if seed.is_some() {
        mc.seed = seed;
    }
    mc.keep_runs = include_runs;
    let ledgers = load_ledgers(&inputs.trades, &analysis)?;
    let (scope, ledger) = select_ledger(&ledgers, strategy, &weights)?;

    tracing::info!(scope = %scope, runs = mc.n_runs, method = %mc.method, "running simulation");
    let batch = simulate(&ledger, &mc)?;
    tracing::info!(seed = batch.seed, "simulation finished");
    Ok(batch)
}

pub fn run_robustness(
    inputs: &Inputs,
    strategy: Option<&str>,
) -> Result<RobustnessVerdict, QmetricsError> {
    let config = load_config(&inputs.config)?;
    let analysis = build_analysis_config(&config)?;
    let weights = build_risk_weights(&config, &analysis)?;
    let robustness = build_robustness_config(&config)?;
    let ledgers = load_ledgers(&inputs.trades, &analysis)?;
    let (scope, ledger) = select_ledger(&ledgers, strategy, &weights)?;

    let split = robustness.split_point(&ledger)?;
    tracing::info!(scope = %scope, %split, "evaluating robustness");
    evaluate(&ledger, split, &robustness.thresholds)
}

/// Check the trade file and every configured section without producing a report.
pub fn run_validate(trades_path: &Path, config_path: Option<&Path>) -> Result<(), QmetricsError> {
    let analysis = match config_path {
        Some(path) => {
            let config = load_config(path)?;
            let analysis = build_analysis_config(&config)?;
            build_risk_weights(&config, &analysis)?;
            if config.has_section("monte_carlo") {
                build_monte_carlo_config(&config)?;
            }
            if config.has_section("robustness") || config.has_section("thresholds") {
                build_robustness_config(&config)?;
            }
            eprintln!("Config {} is valid", path.display());
            analysis
        }
        None => AnalysisConfig {
            mode: AccumulationMode::Additive,
            initial_equity: AccumulationMode::Additive.default_initial_equity(),
        },
    };

    let ledgers = load_ledgers(trades_path, &analysis)?;
    for (id, ledger) in &ledgers {
        eprintln!(
            "  {id}: {} trades, {} to {}",
            ledger.len(),
            ledger.first_exit().format("%Y-%m-%d"),
            ledger.last_exit().format("%Y-%m-%d")
        );
    }
    eprintln!("Trade file {} is valid", trades_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_monte_carlo_arguments() {
        let cli = Cli::try_parse_from([
            "qmetrics",
            "monte-carlo",
            "--trades",
            "t.csv",
            "--config",
            "c.ini",
            "--seed",
            "9",
            "--include-runs",
        ])
        .unwrap();
        match cli.command {
            Command::MonteCarlo {
                inputs,
                seed,
                include_runs,
                strategy,
            } => {
                assert_eq!(inputs.trades, PathBuf::from("t.csv"));
                assert_eq!(seed, Some(9));
                assert!(include_runs);
                assert_eq!(strategy, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn correlate_basis_defaults_to_absolute() {
        let cli = Cli::try_parse_from(["qmetrics", "correlate", "-t", "t.csv", "-c", "c.ini"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Correlate {
                basis: BasisArg::Absolute,
                ..
            }
        ));
    }

    #[test]
    fn analysis_commands_require_config() {
        assert!(Cli::try_parse_from(["qmetrics", "analyze", "--trades", "t.csv"]).is_err());
    }
}
