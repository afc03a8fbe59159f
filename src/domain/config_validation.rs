//! Configuration validation.
//!
//! Validates every config field before a run is built, so that a bad value is
//! reported with its section and key instead of silently falling back to a
//! default.

use crate::domain::backtest::EquityMode;
use crate::domain::error::BacktestError;
use crate::ports::config_port::ConfigPort;
use std::str::FromStr;

pub const SIGNAL_KINDS: &[&str] = &[
    "rolling_mean",
    "rolling_mean_change",
    "rolling_spread",
    "zscore",
    "stddev_breakout",
];

pub const STRATEGY_KINDS: &[&str] = &["threshold", "pair", "breakout"];

/// Parse an optional key. Absent or blank is `Ok(None)`; present but
/// unparseable is `ConfigInvalid`.
pub fn parse_key<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, BacktestError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| BacktestError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("cannot parse '{}'", s.trim()),
            }),
    }
}

/// Parse a key that must be present.
pub fn require_key<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<T, BacktestError> {
    parse_key(config, section, key)?.ok_or_else(|| BacktestError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

/// Parse every item of a comma-separated key.
pub fn parse_list<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Vec<T>, BacktestError> {
    config
        .get_list(section, key)
        .iter()
        .map(|item| {
            item.parse::<T>().map_err(|_| BacktestError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("cannot parse list item '{item}'"),
            })
        })
        .collect()
}

/// Parse an optional float key, rejecting `nan` and `inf`.
pub fn parse_finite(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, BacktestError> {
    match parse_key::<f64>(config, section, key)? {
        Some(v) if !v.is_finite() => Err(invalid(section, key, "must be a finite number")),
        other => Ok(other),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> BacktestError {
    BacktestError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_lookback(config)?;
    validate_transaction_cost(config)?;
    validate_equity_mode(config)?;
    validate_periods_per_year(config)?;
    validate_risk_free_rate(config)?;
    validate_capital_base(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    match config.get_string("data", "directory") {
        Some(s) if !s.trim().is_empty() => {}
        _ => {
            return Err(BacktestError::ConfigMissing {
                section: "data".to_string(),
                key: "directory".to_string(),
            });
        }
    }
    if config.get_list("data", "instruments").is_empty() {
        return Err(BacktestError::ConfigMissing {
            section: "data".to_string(),
            key: "instruments".to_string(),
        });
    }
    Ok(())
}

pub fn validate_signal_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let kind: String = require_key(config, "signal", "kind")?;
    let kind = kind.to_lowercase();
    if !SIGNAL_KINDS.contains(&kind.as_str()) {
        return Err(invalid(
            "signal",
            "kind",
            &format!("unknown signal '{kind}', expected one of {}", SIGNAL_KINDS.join(", ")),
        ));
    }

    match kind.as_str() {
        "rolling_spread" => validate_legs(config, "signal")?,
        "zscore" => {
            if config.get_string("signal", "instrument").is_none() {
                validate_legs(config, "signal")?;
            }
        }
        _ => {
            require_key::<String>(config, "signal", "instrument")?;
        }
    }

    if kind == "stddev_breakout" {
        for key in ["rise", "drop"] {
            if parse_finite(config, "signal", key)?.is_some_and(|v| v < 0.0) {
                return Err(invalid("signal", key, "must be non-negative"));
            }
        }
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let kind: String = require_key(config, "strategy", "kind")?;
    let kind = kind.to_lowercase();
    if !STRATEGY_KINDS.contains(&kind.as_str()) {
        return Err(invalid(
            "strategy",
            "kind",
            &format!(
                "unknown strategy '{kind}', expected one of {}",
                STRATEGY_KINDS.join(", ")
            ),
        ));
    }

    for key in ["long_size", "short_size", "size"] {
        if parse_finite(config, "strategy", key)?.is_some_and(|v| v <= 0.0) {
            return Err(invalid("strategy", key, "must be positive"));
        }
    }

    match kind.as_str() {
        "threshold" | "breakout" => {
            require_key::<String>(config, "strategy", "instrument")?;
        }
        _ => {
            let entry = parse_finite(config, "strategy", "entry")?.unwrap_or(2.0);
            let exit = parse_finite(config, "strategy", "exit")?.unwrap_or(0.5);
            if exit < 0.0 || exit > entry {
                return Err(invalid(
                    "strategy",
                    "exit",
                    "exit must be between 0 and entry",
                ));
            }
        }
    }

    if kind == "threshold" {
        let entry = parse_finite(config, "strategy", "entry_long")?.unwrap_or(0.0);
        let exit = parse_finite(config, "strategy", "exit_long")?.unwrap_or(entry);
        if exit > entry {
            return Err(invalid(
                "strategy",
                "exit_long",
                "exit_long must not exceed entry_long",
            ));
        }
        parse_finite(config, "strategy", "entry_short")?;
        parse_finite(config, "strategy", "exit_short")?;
    }
    Ok(())
}

pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let lookbacks: Vec<usize> = parse_list(config, "sweep", "lookback_windows")?;
    if lookbacks.is_empty() {
        return Err(BacktestError::ConfigMissing {
            section: "sweep".to_string(),
            key: "lookback_windows".to_string(),
        });
    }
    if lookbacks.contains(&0) {
        return Err(invalid(
            "sweep",
            "lookback_windows",
            "every lookback must be at least 1",
        ));
    }
    let thresholds: Vec<f64> = parse_list(config, "sweep", "entry_thresholds")?;
    if thresholds.iter().any(|t| !t.is_finite()) {
        return Err(invalid(
            "sweep",
            "entry_thresholds",
            "every threshold must be a finite number",
        ));
    }
    Ok(())
}

fn validate_legs(config: &dyn ConfigPort, section: &str) -> Result<(), BacktestError> {
    require_key::<String>(config, section, "long_leg")?;
    require_key::<String>(config, section, "short_leg")?;
    parse_finite(config, section, "hedge_ratio")?;
    Ok(())
}

fn validate_lookback(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let value = parse_key::<i64>(config, "backtest", "lookback_window")?;
    if value.is_some_and(|v| v < 1) {
        return Err(invalid(
            "backtest",
            "lookback_window",
            "lookback_window must be at least 1",
        ));
    }
    Ok(())
}

fn validate_transaction_cost(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let value = parse_key::<f64>(config, "backtest", "transaction_cost_per_unit")?;
    if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
        return Err(invalid(
            "backtest",
            "transaction_cost_per_unit",
            "transaction_cost_per_unit must be non-negative",
        ));
    }
    Ok(())
}

fn validate_equity_mode(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(s) = config.get_string("backtest", "equity_mode") {
        EquityMode::from_str(&s).map_err(|reason| invalid("backtest", "equity_mode", &reason))?;
    }
    Ok(())
}

fn validate_periods_per_year(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let value = parse_key::<i64>(config, "backtest", "periods_per_year")?;
    if value.is_some_and(|v| v < 1 || v > u32::MAX as i64) {
        return Err(invalid(
            "backtest",
            "periods_per_year",
            "periods_per_year must be positive",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let value = parse_key::<f64>(config, "backtest", "risk_free_rate")?;
    if value.is_some_and(|v| !v.is_finite() || v <= -1.0 || v >= 1.0) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be a per-period rate between -1 and 1",
        ));
    }
    Ok(())
}

fn validate_capital_base(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let value = parse_key::<f64>(config, "backtest", "capital_base")?;
    if value.is_some_and(|v| !v.is_finite() || v <= 0.0) {
        return Err(invalid(
            "backtest",
            "capital_base",
            "capital_base must be positive",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn adapter(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn assert_invalid(result: Result<(), BacktestError>, expected_key: &str) {
        match result {
            Err(BacktestError::ConfigInvalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected ConfigInvalid for {expected_key}, got {other:?}"),
        }
    }

    fn assert_missing(result: Result<(), BacktestError>, expected_key: &str) {
        match result {
            Err(BacktestError::ConfigMissing { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected ConfigMissing for {expected_key}, got {other:?}"),
        }
    }

    #[test]
    fn empty_backtest_section_uses_defaults() {
        assert!(validate_backtest_config(&adapter("[backtest]\n")).is_ok());
    }

    #[test]
    fn full_backtest_section_is_valid() {
        let c = adapter(
            "[backtest]\nlookback_window = 10\ntransaction_cost_per_unit = 0.1\n\
             equity_mode = compounding\nperiods_per_year = 52\nrisk_free_rate = 0.0004\n\
             capital_base = 50000\n",
        );
        assert!(validate_backtest_config(&c).is_ok());
    }

    #[test]
    fn lookback_must_be_positive_integer() {
        assert_invalid(
            validate_backtest_config(&adapter("[backtest]\nlookback_window = 0\n")),
            "lookback_window",
        );
        assert_invalid(
            validate_backtest_config(&adapter("[backtest]\nlookback_window = ten\n")),
            "lookback_window",
        );
    }

    #[test]
    fn negative_cost_rejected() {
        assert_invalid(
            validate_backtest_config(&adapter(
                "[backtest]\ntransaction_cost_per_unit = -1\n",
            )),
            "transaction_cost_per_unit",
        );
    }

    #[test]
    fn unknown_equity_mode_rejected() {
        assert_invalid(
            validate_backtest_config(&adapter("[backtest]\nequity_mode = geometric\n")),
            "equity_mode",
        );
    }

    #[test]
    fn periods_and_capital_must_be_positive() {
        assert_invalid(
            validate_backtest_config(&adapter("[backtest]\nperiods_per_year = 0\n")),
            "periods_per_year",
        );
        assert_invalid(
            validate_backtest_config(&adapter("[backtest]\ncapital_base = -5\n")),
            "capital_base",
        );
    }

    #[test]
    fn data_section_requires_directory_and_instruments() {
        assert_missing(
            validate_data_config(&adapter("[data]\ninstruments = ES\n")),
            "directory",
        );
        assert_missing(
            validate_data_config(&adapter("[data]\ndirectory = /tmp\ninstruments = \n")),
            "instruments",
        );
        assert!(validate_data_config(&adapter("[data]\ndirectory = /tmp\ninstruments = ES\n")).is_ok());
    }

    #[test]
    fn signal_kind_must_be_known() {
        assert_invalid(
            validate_signal_config(&adapter("[signal]\nkind = macd\ninstrument = ES\n")),
            "kind",
        );
        assert_missing(validate_signal_config(&adapter("[signal]\n")), "kind");
    }

    #[test]
    fn spread_signal_requires_legs() {
        assert_missing(
            validate_signal_config(&adapter("[signal]\nkind = rolling_spread\nlong_leg = GC\n")),
            "short_leg",
        );
        assert!(
            validate_signal_config(&adapter(
                "[signal]\nkind = rolling_spread\nlong_leg = GC\nshort_leg = SI\nhedge_ratio = 1.5\n"
            ))
            .is_ok()
        );
    }

    #[test]
    fn zscore_accepts_price_or_legs() {
        assert!(validate_signal_config(&adapter("[signal]\nkind = zscore\ninstrument = ES\n")).is_ok());
        assert!(
            validate_signal_config(&adapter(
                "[signal]\nkind = zscore\nlong_leg = GC\nshort_leg = SI\n"
            ))
            .is_ok()
        );
        assert_missing(
            validate_signal_config(&adapter("[signal]\nkind = zscore\n")),
            "long_leg",
        );
    }

    #[test]
    fn strategy_sizes_must_be_positive() {
        assert_invalid(
            validate_strategy_config(&adapter(
                "[strategy]\nkind = threshold\ninstrument = ES\nlong_size = 0\n",
            )),
            "long_size",
        );
    }

    #[test]
    fn non_finite_sizes_rejected() {
        for (key, value) in [("long_size", "nan"), ("short_size", "inf"), ("size", "NaN")] {
            assert_invalid(
                validate_strategy_config(&adapter(&format!(
                    "[strategy]\nkind = threshold\ninstrument = ES\n{key} = {value}\n"
                ))),
                key,
            );
        }
    }

    #[test]
    fn non_finite_thresholds_rejected() {
        for key in ["entry_long", "exit_long", "entry_short", "exit_short"] {
            assert_invalid(
                validate_strategy_config(&adapter(&format!(
                    "[strategy]\nkind = threshold\ninstrument = ES\n{key} = nan\n"
                ))),
                key,
            );
        }
        for key in ["entry", "exit"] {
            assert_invalid(
                validate_strategy_config(&adapter(&format!(
                    "[strategy]\nkind = pair\n{key} = inf\n"
                ))),
                key,
            );
        }
    }

    #[test]
    fn non_finite_breakout_multiples_rejected() {
        for key in ["rise", "drop"] {
            assert_invalid(
                validate_signal_config(&adapter(&format!(
                    "[signal]\nkind = stddev_breakout\ninstrument = SI\n{key} = nan\n"
                ))),
                key,
            );
        }
    }

    #[test]
    fn non_finite_hedge_ratio_rejected() {
        assert_invalid(
            validate_signal_config(&adapter(
                "[signal]\nkind = rolling_spread\nlong_leg = GC\nshort_leg = SI\nhedge_ratio = nan\n",
            )),
            "hedge_ratio",
        );
    }

    #[test]
    fn threshold_exit_above_entry_rejected() {
        assert_invalid(
            validate_strategy_config(&adapter(
                "[strategy]\nkind = threshold\ninstrument = ES\nentry_long = 0.5\nexit_long = 1.0\n",
            )),
            "exit_long",
        );
    }

    #[test]
    fn pair_exit_must_be_inside_entry() {
        assert_invalid(
            validate_strategy_config(&adapter(
                "[strategy]\nkind = pair\nentry = 1.0\nexit = 1.5\n",
            )),
            "exit",
        );
        assert!(validate_strategy_config(&adapter("[strategy]\nkind = pair\n")).is_ok());
    }

    #[test]
    fn sweep_lists_are_parsed() {
        assert!(
            validate_sweep_config(&adapter(
                "[sweep]\nlookback_windows = 5, 10\nentry_thresholds = 0.5, 1\n"
            ))
            .is_ok()
        );
        assert_invalid(
            validate_sweep_config(&adapter("[sweep]\nlookback_windows = 5, x\n")),
            "lookback_windows",
        );
        assert_invalid(
            validate_sweep_config(&adapter("[sweep]\nlookback_windows = 0\n")),
            "lookback_windows",
        );
        assert_missing(validate_sweep_config(&adapter("[sweep]\n")), "lookback_windows");
        assert_invalid(
            validate_sweep_config(&adapter(
                "[sweep]\nlookback_windows = 5\nentry_thresholds = 0.5, nan\n"
            )),
            "entry_thresholds",
        );
    }

    #[test]
    fn parse_key_reports_section_and_key() {
        let c = adapter("[backtest]\nlookback_window = 3.5\n");
        let err = parse_key::<usize>(&c, "backtest", "lookback_window").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config value [backtest] lookback_window: cannot parse '3.5'"
        );
    }
}
