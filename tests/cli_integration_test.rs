//! CLI integration tests over real CSV and INI files on disk.

mod common;

use approx::assert_relative_eq;
use clap::Parser;
use common::*;
use qmetrics::cli::{self, Cli, Inputs};
use qmetrics::domain::correlation::ReturnBasis;
use qmetrics::domain::error::{ErrorKind, QmetricsError};
use std::path::PathBuf;
use std::process::ExitCode;
use tempfile::{NamedTempFile, TempDir};

struct Fixture {
    trades: NamedTempFile,
    config: NamedTempFile,
}

impl Fixture {
    fn new(trades: &str, config: &str) -> Self {
        Fixture {
            trades: write_temp(trades),
            config: write_temp(config),
        }
    }

    fn inputs(&self) -> Inputs {
        Inputs {
            trades: self.trades.path().to_path_buf(),
            config: self.config.path().to_path_buf(),
            output: None,
            pretty: false,
        }
    }
}

fn exit_code_is(code: ExitCode, expected: u8) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::from(expected))
}

mod commands {
    use super::*;

    #[test]
    fn analyze_reports_every_strategy() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let reports = cli::run_analyze(&fx.inputs(), None).unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(names, vec!["Carry", "Trend"]);

        let trend = &reports[1];
        assert_eq!(trend.initial_equity, 10_000.0);
        assert_eq!(trend.summary.trade_count, 4);
        assert_relative_eq!(trend.summary.total_net_profit, 240.0);
        assert_eq!(trend.monthly.len(), 4);
    }

    #[test]
    fn analyze_single_strategy_filter() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let reports = cli::run_analyze(&fx.inputs(), Some("Carry")).unwrap();
        assert_eq!(reports.len(), 1);
        let err = cli::run_analyze(&fx.inputs(), Some("Nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn portfolio_applies_weights() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let report = cli::run_portfolio(&fx.inputs()).unwrap();
        let summary = &report.portfolio.summary;
        assert_eq!(summary.trade_count, 8);
        assert_relative_eq!(summary.total_net_profit, 277.5);
        assert_relative_eq!(summary.max_drawdown, 80.0);
        let carry = report.weights.iter().find(|w| w.strategy_id == "Carry").unwrap();
        assert_eq!(carry.risk_multiplier, 0.5);
    }

    #[test]
    fn correlate_builds_matrix() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let report = cli::run_correlate(&fx.inputs(), ReturnBasis::Percent).unwrap();
        assert_eq!(report.matrix.strategies, vec!["Carry", "Trend"]);
        assert_eq!(report.matrix.coefficients.len(), 2);
    }

    #[test]
    fn monte_carlo_shuffle_keeps_final_equity() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let batch = cli::run_monte_carlo(&fx.inputs(), None, None, true).unwrap();
        assert_eq!(batch.seed, 11);
        assert_eq!(batch.runs.len(), 200);
        for run in &batch.runs {
            assert_relative_eq!(run.final_equity, 10_277.5, epsilon = 1e-9);
        }
        assert_eq!(batch.probability_of_ruin, Some(0.0));
    }

    #[test]
    fn monte_carlo_seed_override_and_run_trimming() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let batch = cli::run_monte_carlo(&fx.inputs(), Some("Trend"), Some(99), false).unwrap();
        assert_eq!(batch.seed, 99);
        assert!(batch.runs.is_empty());
        assert_eq!(batch.horizon, 4);
        assert_eq!(batch.equity_bands.len(), 4);
    }

    #[test]
    fn robustness_passes_on_fixture() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let verdict = cli::run_robustness(&fx.inputs(), None).unwrap();
        assert_eq!(verdict.in_sample_trades, 4);
        assert_eq!(verdict.out_of_sample_trades, 4);
        assert_relative_eq!(verdict.equity_at_split, 10_085.0);
        assert!(verdict.passed);
    }

    #[test]
    fn robustness_split_after_last_trade_is_insufficient() {
        let config = BASE_INI.replace("split = 2024-03-01", "split = 2025-01-01");
        let fx = Fixture::new(TRADES_CSV, &config);
        let err = cli::run_robustness(&fx.inputs(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }
}

mod failures {
    use super::*;

    #[test]
    fn missing_mode_is_config_error() {
        let config = BASE_INI.replace("mode = additive\n", "");
        let fx = Fixture::new(TRADES_CSV, &config);
        let err = cli::run_portfolio(&fx.inputs()).unwrap_err();
        assert!(matches!(err, QmetricsError::ConfigMissing { .. }));
    }

    #[test]
    fn bad_rows_are_validation_errors() {
        let trades = "strategy,entry_time,exit_time,profit\n\
                      A,2024-01-05,2024-01-02,10\n\
                      A,2024-01-01,2024-01-02,\n";
        let fx = Fixture::new(trades, BASE_INI);
        match cli::run_analyze(&fx.inputs(), None).unwrap_err() {
            QmetricsError::Validation { issues } => {
                let rows: Vec<usize> = issues.iter().map(|i| i.row).collect();
                assert_eq!(rows, vec![0, 1]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_trade_file_is_io_error() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let mut inputs = fx.inputs();
        inputs.trades = PathBuf::from("/nonexistent/trades.csv");
        let err = cli::run_analyze(&inputs, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}

mod dispatch {
    use super::*;

    #[test]
    fn run_writes_report_and_succeeds() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("portfolio.json");
        let cli = Cli::try_parse_from([
            "qmetrics",
            "portfolio",
            "--trades",
            fx.trades.path().to_str().unwrap(),
            "--config",
            fx.config.path().to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
        ])
        .unwrap();
        assert!(exit_code_is(cli::run(cli), 0));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["portfolio"]["summary"]["trade_count"], 8);
    }

    #[test]
    fn run_maps_errors_to_exit_codes() {
        let fx = Fixture::new(TRADES_CSV, "[analysis]\nmode = sideways\n");
        let cli = Cli::try_parse_from([
            "qmetrics",
            "analyze",
            "-t",
            fx.trades.path().to_str().unwrap(),
            "-c",
            fx.config.path().to_str().unwrap(),
        ])
        .unwrap();
        assert!(exit_code_is(cli::run(cli), 2));

        let fx = Fixture::new("strategy,profit\nA,1\n", BASE_INI);
        let cli = Cli::try_parse_from([
            "qmetrics",
            "validate",
            "-t",
            fx.trades.path().to_str().unwrap(),
        ])
        .unwrap();
        assert!(exit_code_is(cli::run(cli), 3));
    }

    #[test]
    fn validate_accepts_good_inputs() {
        let fx = Fixture::new(TRADES_CSV, BASE_INI);
        cli::run_validate(fx.trades.path(), Some(fx.config.path())).unwrap();
        cli::run_validate(fx.trades.path(), None).unwrap();
    }
}
