//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::{CsvReportAdapter, summary_rows};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, EquityMode, run_backtest};
use crate::domain::config_validation::{
    parse_finite, parse_key, parse_list, require_key, validate_backtest_config,
    validate_data_config, validate_signal_config, validate_strategy_config,
    validate_sweep_config,
};
use crate::domain::error::BacktestError;
use crate::domain::price_series::Dataset;
use crate::domain::signal::{
    RollingMean, RollingMeanChange, RollingSpread, RollingZScore, Signal, StdDevBreakout,
};
use crate::domain::strategy::{BreakoutStrategy, PairStrategy, Strategy, ThresholdStrategy};
use crate::domain::sweep::{ParamGrid, RunSpec, SweepPoint, rank_by_sharpe, run_sweep};
use crate::domain::tracker::{PerformanceReport, Tracker};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "barlag", about = "Bar-by-bar strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for equity, trade and summary CSVs
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration and the data it points at
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a lookback × entry-threshold grid in parallel
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        /// Number of ranked runs to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest { config, output } => run_backtest_command(&config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Sweep { config, top } => run_sweep_command(&config, top),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BacktestError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Validate every section a single backtest reads.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_backtest_config(config)?;
    validate_data_config(config)?;
    validate_signal_config(config)?;
    validate_strategy_config(config)?;
    Ok(())
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    let defaults = BacktestConfig::default();
    let equity_mode = match config.get_string("backtest", "equity_mode") {
        Some(s) => s.parse::<EquityMode>().map_err(|reason| BacktestError::ConfigInvalid {
            section: "backtest".into(),
            key: "equity_mode".into(),
            reason,
        })?,
        None => defaults.equity_mode,
    };

    let bt = BacktestConfig {
        lookback_window: parse_key(config, "backtest", "lookback_window")?
            .unwrap_or(defaults.lookback_window),
        transaction_cost_per_unit: parse_key(config, "backtest", "transaction_cost_per_unit")?
            .unwrap_or(defaults.transaction_cost_per_unit),
        equity_mode,
        periods_per_year: parse_key(config, "backtest", "periods_per_year")?
            .unwrap_or(defaults.periods_per_year),
        risk_free_rate: parse_key(config, "backtest", "risk_free_rate")?
            .unwrap_or(defaults.risk_free_rate),
        capital_base: parse_key(config, "backtest", "capital_base")?
            .unwrap_or(defaults.capital_base),
    };
    bt.validate()?;
    Ok(bt)
}

fn legs(config: &dyn ConfigPort, section: &str) -> Result<(String, String, f64), BacktestError> {
    let long: String = require_key(config, section, "long_leg")?;
    let short: String = require_key(config, section, "short_leg")?;
    let hedge_ratio = parse_finite(config, section, "hedge_ratio")?.unwrap_or(1.0);
    Ok((long, short, hedge_ratio))
}

/// Build the configured signal. `entry_override` replaces the breakout
/// multiples during a sweep; other signals have no threshold of their own.
pub fn build_signal(
    config: &dyn ConfigPort,
    entry_override: Option<f64>,
) -> Result<Box<dyn Signal>, BacktestError> {
    let kind: String = require_key(config, "signal", "kind")?;
    let signal: Box<dyn Signal> = match kind.to_lowercase().as_str() {
        "rolling_mean" => {
            let instrument: String = require_key(config, "signal", "instrument")?;
            Box::new(RollingMean::new(&instrument))
        }
        "rolling_mean_change" => {
            let instrument: String = require_key(config, "signal", "instrument")?;
            Box::new(RollingMeanChange::new(&instrument))
        }
        "rolling_spread" => {
            let (long, short, h) = legs(config, "signal")?;
            Box::new(RollingSpread::new(&long, &short, h))
        }
        "zscore" => match parse_key::<String>(config, "signal", "instrument")? {
            Some(instrument) => Box::new(RollingZScore::of_price(&instrument)),
            None => {
                let (long, short, h) = legs(config, "signal")?;
                Box::new(RollingZScore::of_spread(&long, &short, h))
            }
        },
        "stddev_breakout" => {
            let instrument: String = require_key(config, "signal", "instrument")?;
            let rise = parse_finite(config, "signal", "rise")?.unwrap_or(2.0);
            let drop = parse_finite(config, "signal", "drop")?.unwrap_or(2.0);
            let (rise, drop) = entry_override.map_or((rise, drop), |e| (e, e));
            Box::new(StdDevBreakout::new(&instrument, rise, drop))
        }
        other => {
            return Err(BacktestError::ConfigInvalid {
                section: "signal".into(),
                key: "kind".into(),
                reason: format!("unknown signal '{other}'"),
            });
        }
    };
    Ok(signal)
}

/// Build the configured strategy. `entry_override` replaces the entry
/// threshold of threshold and pair strategies during a sweep.
pub fn build_strategy(
    config: &dyn ConfigPort,
    entry_override: Option<f64>,
) -> Result<Box<dyn Strategy>, BacktestError> {
    let kind: String = require_key(config, "strategy", "kind")?;
    let strategy: Box<dyn Strategy> = match kind.to_lowercase().as_str() {
        "threshold" => {
            let instrument: String = require_key(config, "strategy", "instrument")?;
            let long_size = parse_finite(config, "strategy", "long_size")?.unwrap_or(1.0);
            let configured_entry = parse_finite(config, "strategy", "entry_long")?.unwrap_or(0.0);
            let entry_long = entry_override.unwrap_or(configured_entry);
            let exit_long = parse_finite(config, "strategy", "exit_long")?
                .unwrap_or(entry_long)
                .min(entry_long);

            let mut strategy =
                ThresholdStrategy::long_only(&instrument, long_size, entry_long, exit_long);
            if config.get_bool("strategy", "allow_shorting", false) {
                let short_size = parse_finite(config, "strategy", "short_size")?.unwrap_or(long_size);
                let entry_short = parse_finite(config, "strategy", "entry_short")?.unwrap_or(-entry_long);
                let exit_short = parse_finite(config, "strategy", "exit_short")?
                    .unwrap_or(entry_short)
                    .max(entry_short);
                strategy = strategy.with_short(short_size, entry_short, exit_short);
            }
            Box::new(strategy)
        }
        "pair" => {
            let (long_leg, short_leg, hedge_ratio) =
                if config.get_string("strategy", "long_leg").is_some() {
                    legs(config, "strategy")?
                } else {
                    legs(config, "signal")?
                };
            let entry = match entry_override {
                Some(e) => e,
                None => parse_finite(config, "strategy", "entry")?.unwrap_or(2.0),
            };
            let exit = parse_finite(config, "strategy", "exit")?
                .unwrap_or(0.5)
                .min(entry);
            Box::new(PairStrategy {
                long_leg,
                short_leg,
                hedge_ratio,
                size: parse_finite(config, "strategy", "size")?.unwrap_or(1.0),
                entry,
                exit,
            })
        }
        "breakout" => {
            let instrument: String = require_key(config, "strategy", "instrument")?;
            let long_size = parse_finite(config, "strategy", "long_size")?.unwrap_or(1.0);
            let short_size = parse_finite(config, "strategy", "short_size")?.unwrap_or(long_size);
            Box::new(BreakoutStrategy::new(&instrument, long_size, short_size))
        }
        other => {
            return Err(BacktestError::ConfigInvalid {
                section: "strategy".into(),
                key: "kind".into(),
                reason: format!("unknown strategy '{other}'"),
            });
        }
    };
    Ok(strategy)
}

/// Entry threshold the configuration uses when no sweep override is given.
fn configured_entry(config: &dyn ConfigPort) -> Result<f64, BacktestError> {
    let kind: String = require_key(config, "strategy", "kind")?;
    Ok(match kind.to_lowercase().as_str() {
        "threshold" => parse_finite(config, "strategy", "entry_long")?.unwrap_or(0.0),
        "pair" => parse_finite(config, "strategy", "entry")?.unwrap_or(2.0),
        _ => parse_finite(config, "signal", "rise")?.unwrap_or(2.0),
    })
}

pub fn build_param_grid(config: &dyn ConfigPort) -> Result<ParamGrid, BacktestError> {
    validate_sweep_config(config)?;
    let lookback_windows: Vec<usize> = parse_list(config, "sweep", "lookback_windows")?;
    let mut entry_thresholds: Vec<f64> = parse_list(config, "sweep", "entry_thresholds")?;
    if entry_thresholds.is_empty() {
        entry_thresholds.push(configured_entry(config)?);
    }
    Ok(ParamGrid {
        lookback_windows,
        entry_thresholds,
    })
}

/// Fetch and align the named instruments. Any series that fails to load
/// fails the whole dataset.
pub fn load_dataset(
    data_port: &dyn DataPort,
    instruments: &[String],
) -> Result<Dataset, BacktestError> {
    let series = instruments
        .iter()
        .map(|instrument| data_port.fetch_series(instrument))
        .collect::<Result<Vec<_>, _>>()?;
    let dataset = Dataset::new(series)?;
    info!(
        instruments = instruments.len(),
        bars = dataset.len(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Check that the data source holds every configured instrument, naming what
/// it does hold when one is missing.
pub fn check_instruments_available(
    data_port: &dyn DataPort,
    instruments: &[String],
) -> Result<(), BacktestError> {
    let available = data_port.list_instruments()?;
    let missing: Vec<&str> = instruments
        .iter()
        .filter(|i| !available.contains(i))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    let listed = if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    };
    Err(BacktestError::configuration(format!(
        "no data for {} (available: {listed})",
        missing.join(", ")
    )))
}

fn data_port_for(config: &dyn ConfigPort) -> Result<(CsvAdapter, Vec<String>), BacktestError> {
    let directory: String = require_key(config, "data", "directory")?;
    let instruments = config.get_list("data", "instruments");
    Ok((CsvAdapter::new(PathBuf::from(directory)), instruments))
}

/// Load, run, report. A run that aborts with a partial trajectory still has
/// that trajectory written before the error is returned.
pub fn run_backtest_pipeline(
    config: &dyn ConfigPort,
    data_port: &dyn DataPort,
    instruments: &[String],
    report_port: &dyn ReportPort,
    output_path: Option<&Path>,
) -> Result<PerformanceReport, BacktestError> {
    // Stage 1: validate
    validate_config(config)?;

    // Stage 2: build run inputs
    let bt_config = build_backtest_config(config)?;
    let signal = build_signal(config, None)?;
    let strategy = build_strategy(config, None)?;
    info!(
        signal = %signal.name(),
        strategy = %strategy.name(),
        mode = %bt_config.equity_mode,
        lookback = bt_config.lookback_window,
        "backtest configured"
    );

    // Stage 3: load data
    let dataset = load_dataset(data_port, instruments)?;

    // Stage 4: run and report
    let tracker = Tracker::new(bt_config.tracker_config());
    match run_backtest(&dataset, signal.as_ref(), strategy.as_ref(), &bt_config) {
        Ok(result) => {
            let report = tracker.report_result(&result);
            if let Some(path) = output_path {
                report_port.write(&result, &report, path)?;
            }
            Ok(report)
        }
        Err(failure) => {
            if let (Some(partial), Some(path)) = (&failure.partial, output_path) {
                warn!(
                    points = partial.equity_curve.len(),
                    "writing partial results of aborted run"
                );
                let report = tracker.report_result(partial);
                report_port.write(partial, &report, path)?;
            }
            Err(failure.error)
        }
    }
}

fn print_summary(report: &PerformanceReport) {
    println!("{:<24}{:>16}", "metric", "value");
    for (name, value) in summary_rows(report) {
        println!("{name:<24}{value:>16}");
    }
}

fn run_backtest_command(config_path: &Path, output: Option<&Path>) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    let (data_port, instruments) = data_port_for(&config)?;
    let report = run_backtest_pipeline(
        &config,
        &data_port,
        &instruments,
        &CsvReportAdapter::new(),
        output,
    )?;
    print_summary(&report);
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;
    if config.get_string("sweep", "lookback_windows").is_some() {
        validate_sweep_config(&config)?;
    }

    let bt_config = build_backtest_config(&config)?;
    let signal = build_signal(&config, None)?;
    let strategy = build_strategy(&config, None)?;

    let (data_port, instruments) = data_port_for(&config)?;
    check_instruments_available(&data_port, &instruments)?;
    let dataset = load_dataset(&data_port, &instruments)?;

    for needed in signal.instruments().iter().chain(strategy.instruments().iter()) {
        if !dataset.contains(needed) {
            return Err(BacktestError::configuration(format!(
                "instrument {needed} is not listed in [data] instruments"
            )));
        }
    }
    if bt_config.lookback_window > dataset.len() {
        return Err(BacktestError::configuration(format!(
            "lookback_window {} exceeds the {} bars available",
            bt_config.lookback_window,
            dataset.len()
        )));
    }

    println!("signal:      {}", signal.name());
    println!("strategy:    {}", strategy.name());
    println!("equity mode: {}", bt_config.equity_mode);
    println!("lookback:    {}", bt_config.lookback_window);
    println!(
        "data:        {} instruments, {} bars",
        instruments.len(),
        dataset.len()
    );
    println!("configuration is valid");
    Ok(())
}

fn run_sweep_command(config_path: &Path, top: usize) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;
    validate_sweep_config(&config)?;

    let base = build_backtest_config(&config)?;
    let grid = build_param_grid(&config)?;
    let (data_port, instruments) = data_port_for(&config)?;
    let dataset = load_dataset(&data_port, &instruments)?;

    let points = grid.points();
    let runs = run_sweep(&dataset, &points, |p: &SweepPoint| {
        Ok(RunSpec {
            signal: build_signal(&config, Some(p.entry_threshold))?,
            strategy: build_strategy(&config, Some(p.entry_threshold))?,
            config: BacktestConfig {
                lookback_window: p.lookback_window,
                ..base.clone()
            },
        })
    });

    for run in &runs {
        if let Err(failure) = &run.outcome {
            warn!(
                lookback = run.params.lookback_window,
                entry = run.params.entry_threshold,
                "run failed: {}",
                failure.error
            );
        }
    }

    let ranked = rank_by_sharpe(&runs);
    info!(
        runs = runs.len(),
        succeeded = ranked.len(),
        "sweep complete"
    );

    println!(
        "{:>8}{:>10}{:>12}{:>12}{:>12}{:>8}",
        "lookback", "entry", "sharpe", "return", "max_dd", "trades"
    );
    for (params, report) in ranked.into_iter().take(top) {
        println!(
            "{:>8}{:>10.4}{:>12.4}{:>12.4}{:>12.4}{:>8}",
            params.lookback_window,
            params.entry_threshold,
            report.sharpe_ratio,
            report.total_return,
            report.max_drawdown,
            report.trade_count
        );
    }
    Ok(())
}
