//! Parameter sweeps over independent runs.
//!
//! Each parameter set gets its own signal, strategy and engine; the only
//! thing shared between worker threads is the read-only dataset.

use rayon::prelude::*;
use tracing::info;

use crate::domain::backtest::{BacktestConfig, RunFailure, run_backtest};
use crate::domain::error::BacktestError;
use crate::domain::price_series::Dataset;
use crate::domain::signal::Signal;
use crate::domain::strategy::Strategy;
use crate::domain::tracker::{PerformanceReport, Tracker};

/// Everything one run needs, built fresh per parameter set.
pub struct RunSpec {
    pub signal: Box<dyn Signal>,
    pub strategy: Box<dyn Strategy>,
    pub config: BacktestConfig,
}

/// One point of a lookback × entry-threshold grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub lookback_window: usize,
    pub entry_threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub lookback_windows: Vec<usize>,
    pub entry_thresholds: Vec<f64>,
}

impl ParamGrid {
    pub fn size(&self) -> usize {
        self.lookback_windows.len() * self.entry_thresholds.len()
    }

    pub fn points(&self) -> Vec<SweepPoint> {
        self.lookback_windows
            .iter()
            .flat_map(|&lookback_window| {
                self.entry_thresholds
                    .iter()
                    .map(move |&entry_threshold| SweepPoint {
                        lookback_window,
                        entry_threshold,
                    })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct SweepRun<P> {
    pub params: P,
    pub outcome: Result<PerformanceReport, RunFailure>,
}

/// Run every parameter set in parallel. Results come back in input order.
pub fn run_sweep<P, F>(dataset: &Dataset, params: &[P], build: F) -> Vec<SweepRun<P>>
where
    P: Clone + Send + Sync,
    F: Fn(&P) -> Result<RunSpec, BacktestError> + Sync,
{
    info!(runs = params.len(), "starting sweep");

    params
        .par_iter()
        .map(|p| {
            let outcome = build(p)
                .map_err(RunFailure::from)
                .and_then(|spec| run_one(dataset, &spec));
            SweepRun {
                params: p.clone(),
                outcome,
            }
        })
        .collect()
}

fn run_one(dataset: &Dataset, spec: &RunSpec) -> Result<PerformanceReport, RunFailure> {
    let result = run_backtest(
        dataset,
        spec.signal.as_ref(),
        spec.strategy.as_ref(),
        &spec.config,
    )?;
    Ok(Tracker::new(spec.config.tracker_config()).report_result(&result))
}

/// Successful runs ordered by Sharpe ratio, best first.
pub fn rank_by_sharpe<P>(runs: &[SweepRun<P>]) -> Vec<(&P, &PerformanceReport)> {
    let mut ranked: Vec<(&P, &PerformanceReport)> = runs
        .iter()
        .filter_map(|r| r.outcome.as_ref().ok().map(|rep| (&r.params, rep)))
        .collect();
    ranked.sort_by(|a, b| b.1.sharpe_ratio.total_cmp(&a.1.sharpe_ratio));
    ranked
}
