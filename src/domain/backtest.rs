//! Backtest engine and event loop.
//!
//! For each bar `t` from `lookback_window - 1` to the second-to-last bar:
//! 1. compute the signal on history through `t`
//! 2. ask the strategy for a target position
//! 3. record a trade per changed instrument, charging the per-unit cost
//! 4. earn the return of the new position over `[t, t+1]`
//! 5. append the equity point for `t+1`
//!
//! A decision at `t` therefore never touches the return of the interval
//! ending at `t`.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, trace, warn};

use crate::domain::error::{BacktestError, ExtensionError};
use crate::domain::history::History;
use crate::domain::position::{Position, Trade};
use crate::domain::price_series::Dataset;
use crate::domain::signal::Signal;
use crate::domain::strategy::Strategy;
use crate::domain::tracker::TrackerConfig;

/// How bar gains accumulate into the equity curve. Fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquityMode {
    /// Equity is raw P&L starting at 0; sizes are units of the instrument.
    Additive,
    /// Equity is NAV normalised to 1; sizes are fractions of NAV.
    Compounding,
}

impl EquityMode {
    pub fn initial_equity(self) -> f64 {
        match self {
            EquityMode::Additive => 0.0,
            EquityMode::Compounding => 1.0,
        }
    }
}

impl fmt::Display for EquityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquityMode::Additive => write!(f, "additive"),
            EquityMode::Compounding => write!(f, "compounding"),
        }
    }
}

impl FromStr for EquityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "additive" => Ok(EquityMode::Additive),
            "compounding" => Ok(EquityMode::Compounding),
            other => Err(format!(
                "unknown equity mode '{other}' (expected additive or compounding)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub lookback_window: usize,
    pub transaction_cost_per_unit: f64,
    pub equity_mode: EquityMode,
    pub periods_per_year: u32,
    /// Per-period rate, same basis as bar returns.
    pub risk_free_rate: f64,
    /// Capital that additive P&L is measured against when computing returns.
    pub capital_base: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            lookback_window: 20,
            transaction_cost_per_unit: 0.0,
            equity_mode: EquityMode::Additive,
            periods_per_year: 252,
            risk_free_rate: 0.0,
            capital_base: 1_000_000.0,
        }
    }
}

impl BacktestConfig {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            equity_mode: self.equity_mode,
            periods_per_year: self.periods_per_year,
            risk_free_rate: self.risk_free_rate,
            capital_base: self.capital_base,
        }
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.lookback_window == 0 {
            return Err(BacktestError::configuration(
                "lookback_window must be at least 1",
            ));
        }
        if !self.transaction_cost_per_unit.is_finite() || self.transaction_cost_per_unit < 0.0 {
            return Err(BacktestError::configuration(
                "transaction_cost_per_unit must be a non-negative number",
            ));
        }
        if self.periods_per_year == 0 {
            return Err(BacktestError::configuration(
                "periods_per_year must be positive",
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(BacktestError::configuration(
                "risk_free_rate must be finite",
            ));
        }
        if !self.capital_base.is_finite() || self.capital_base <= 0.0 {
            return Err(BacktestError::configuration(
                "capital_base must be positive",
            ));
        }
        Ok(())
    }
}

/// Equity after the bar at `index`, with the position held into that bar.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub index: usize,
    pub date: NaiveDate,
    pub equity: f64,
    pub position: Position,
    /// Gain per instrument over the bar ending here, in equity units and
    /// before costs. Empty for the first point.
    pub gains: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub equity_mode: EquityMode,
    /// First bar evaluated, i.e. `lookback_window - 1`.
    pub start_index: usize,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub final_position: Position,
}

impl BacktestResult {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or_else(|| self.equity_mode.initial_equity())
    }
}

/// A run that stopped early. `partial` holds everything recorded before the
/// failing bar, except after a causality violation where nothing is kept.
#[derive(Debug, thiserror::Error)]
#[error("backtest aborted: {error}")]
pub struct RunFailure {
    pub error: BacktestError,
    pub partial: Option<BacktestResult>,
}

impl From<BacktestError> for RunFailure {
    fn from(error: BacktestError) -> Self {
        RunFailure {
            error,
            partial: None,
        }
    }
}

struct RunState {
    position: Position,
    equity: f64,
    equity_curve: Vec<EquityPoint>,
    trades: Vec<Trade>,
}

/// Drives one run. Holds the dataset, signal and strategy by reference; all
/// mutable state lives inside [`Engine::run`].
pub struct Engine<'a> {
    dataset: &'a Dataset,
    signal: &'a dyn Signal,
    strategy: &'a dyn Strategy,
    config: BacktestConfig,
    /// Instruments that must have a price at `t` for a decision to be made.
    inputs: Vec<String>,
}

impl<'a> Engine<'a> {
    /// Validate the configuration against the dataset and extensions before
    /// anything runs.
    pub fn new(
        dataset: &'a Dataset,
        signal: &'a dyn Signal,
        strategy: &'a dyn Strategy,
        config: BacktestConfig,
    ) -> Result<Self, BacktestError> {
        config.validate()?;

        if dataset.is_empty() {
            return Err(BacktestError::configuration("dataset has no bars"));
        }
        if config.lookback_window > dataset.len() {
            return Err(BacktestError::configuration(format!(
                "lookback_window {} exceeds series length {}",
                config.lookback_window,
                dataset.len()
            )));
        }

        let mut inputs = signal.instruments();
        inputs.extend(strategy.instruments());
        inputs.sort();
        inputs.dedup();

        if let Some(missing) = inputs.iter().find(|i| !dataset.contains(i)) {
            return Err(BacktestError::configuration(format!(
                "instrument {missing} is not in the supplied data"
            )));
        }

        Ok(Self {
            dataset,
            signal,
            strategy,
            config,
            inputs,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(&self) -> Result<BacktestResult, RunFailure> {
        let lookback = self.config.lookback_window;
        let mode = self.config.equity_mode;
        let start = lookback - 1;
        let last = self.dataset.len() - 1;

        info!(
            signal = %self.signal.name(),
            strategy = %self.strategy.name(),
            bars = self.dataset.len(),
            lookback,
            mode = %mode,
            "starting backtest"
        );

        let mut state = RunState {
            position: Position::flat(),
            equity: mode.initial_equity(),
            equity_curve: Vec::with_capacity(last - start + 1),
            trades: Vec::new(),
        };
        state.equity_curve.push(EquityPoint {
            index: start,
            date: self.dataset.timeline()[start],
            equity: state.equity,
            position: Position::flat(),
            gains: BTreeMap::new(),
        });

        for t in start..last {
            let date = self.dataset.timeline()[t];
            let mut cost = 0.0;

            if self.inputs_present(t) {
                let history = History::new(self.dataset, t);
                let signal = self
                    .signal
                    .compute(&history, lookback)
                    .map_err(|e| self.abort(e, &self.signal.name(), t, date, &state))?;

                if signal.is_defined() {
                    let target = self
                        .strategy
                        .decide(t, &history, &signal, &state.position)
                        .map_err(|e| self.abort(e, &self.strategy.name(), t, date, &state))?;
                    cost = self
                        .rebalance(t, date, target, &mut state)
                        .map_err(|e| self.abort(e, &self.strategy.name(), t, date, &state))?;
                } else {
                    trace!(index = t, "signal undefined, holding");
                }
            } else {
                trace!(index = t, "missing input price, holding");
            }

            let next = t + 1;
            let gains = self.bar_gains(&state.position, state.equity, t, next);
            let gain: f64 = gains.values().sum();
            state.equity = match mode {
                EquityMode::Additive => state.equity + gain - cost,
                EquityMode::Compounding => (state.equity + gain - cost).max(0.0),
            };
            state.equity_curve.push(EquityPoint {
                index: next,
                date: self.dataset.timeline()[next],
                equity: state.equity,
                position: state.position.clone(),
                gains,
            });
        }

        info!(
            trades = state.trades.len(),
            final_equity = state.equity,
            "backtest finished"
        );

        Ok(Self::snapshot(start, mode, state))
    }

    fn inputs_present(&self, index: usize) -> bool {
        self.inputs
            .iter()
            .all(|i| self.dataset.price(i, index).is_some())
    }

    /// Move to `target`, recording one trade per changed instrument.
    /// Returns the total cost charged. Nothing is committed on error.
    fn rebalance(
        &self,
        index: usize,
        date: NaiveDate,
        target: Position,
        state: &mut RunState,
    ) -> Result<f64, ExtensionError> {
        if let Some((instrument, size)) = target.iter().find(|(_, size)| !size.is_finite()) {
            return Err(ExtensionError::failed(format!(
                "target size {size} for {instrument} is not a finite number"
            )));
        }

        let mut trades = Vec::new();

        for (instrument, delta) in state.position.deltas_to(&target) {
            let price = self
                .dataset
                .last_valid_price(&instrument, index)
                .ok_or_else(|| {
                    ExtensionError::failed(format!(
                        "target position references {instrument}, which has no price at bar {index}"
                    ))
                })?;
            let cost = match self.config.equity_mode {
                EquityMode::Additive => self.config.transaction_cost_per_unit * delta.abs(),
                EquityMode::Compounding => {
                    self.config.transaction_cost_per_unit * delta.abs() * state.equity
                }
            };
            trades.push(Trade {
                index,
                date,
                position_after: target.size(&instrument),
                instrument,
                delta,
                price,
                cost,
            });
        }

        for trade in &trades {
            debug!(
                index,
                %date,
                instrument = %trade.instrument,
                delta = trade.delta,
                price = trade.price,
                cost = trade.cost,
                "trade"
            );
        }

        let total_cost: f64 = trades.iter().map(|t| t.cost).sum();
        state.trades.extend(trades);
        state.position = target;
        Ok(total_cost)
    }

    /// Per-instrument gain of `position` from the last valid price at or
    /// before `from` to the price at `to`, in equity units. Instruments with no
    /// price at `to` sit the bar out.
    fn bar_gains(
        &self,
        position: &Position,
        equity: f64,
        from: usize,
        to: usize,
    ) -> BTreeMap<String, f64> {
        position
            .iter()
            .filter_map(|(instrument, size)| {
                let p1 = self.dataset.price(instrument, to)?;
                let p0 = self.dataset.last_valid_price(instrument, from)?;
                let gain = match self.config.equity_mode {
                    EquityMode::Additive => size * (p1 - p0),
                    EquityMode::Compounding if p0 > 0.0 => size * (p1 / p0 - 1.0) * equity,
                    EquityMode::Compounding => 0.0,
                };
                Some((instrument.to_string(), gain))
            })
            .collect()
    }

    fn abort(
        &self,
        err: ExtensionError,
        component: &str,
        index: usize,
        date: NaiveDate,
        state: &RunState,
    ) -> RunFailure {
        let error = BacktestError::from_extension(err, component, index, date);
        let partial = match error {
            BacktestError::CausalityViolation { .. } => None,
            _ => Some(BacktestResult {
                equity_mode: self.config.equity_mode,
                start_index: self.config.lookback_window - 1,
                equity_curve: state.equity_curve.clone(),
                trades: state.trades.clone(),
                final_position: state.position.clone(),
            }),
        };
        warn!(%error, kept_points = partial.as_ref().map_or(0, |p| p.equity_curve.len()), "backtest aborted");
        RunFailure { error, partial }
    }

    fn snapshot(start_index: usize, equity_mode: EquityMode, state: RunState) -> BacktestResult {
        BacktestResult {
            equity_mode,
            start_index,
            equity_curve: state.equity_curve,
            trades: state.trades,
            final_position: state.position,
        }
    }
}

/// Validate, then run. Configuration errors come back as a `RunFailure`
/// without partial results.
pub fn run_backtest(
    dataset: &Dataset,
    signal: &dyn Signal,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, RunFailure> {
    Engine::new(dataset, signal, strategy, config.clone())?.run()
}
