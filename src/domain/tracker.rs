//! Performance tracking over a completed run.
//!
//! The tracker is a pure function of the equity curve, the trade log and its
//! configuration. Degenerate inputs (a single point, a flat curve, a NAV that
//! hits zero) produce zero-valued metrics rather than errors.

use super::backtest::{BacktestResult, EquityMode, EquityPoint};
use super::position::Trade;
use super::stats::{mean, population_stddev, simple_returns};
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub equity_mode: EquityMode,
    pub periods_per_year: u32,
    /// Per-period rate, same basis as bar returns.
    pub risk_free_rate: f64,
    /// Added to additive P&L to form a NAV; unused in compounding mode.
    pub capital_base: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            equity_mode: EquityMode::Additive,
            periods_per_year: 252,
            risk_free_rate: 0.0,
            capital_base: 1_000_000.0,
        }
    }
}

/// Trades on one instrument from leaving flat until returning flat or
/// flipping side. P&L is in equity units, net of costs: price units times
/// size in additive mode, a fraction of starting NAV in compounding mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub instrument: String,
    pub entry_index: usize,
    pub entry_date: NaiveDate,
    pub exit_index: usize,
    pub exit_date: NaiveDate,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Largest peak-to-trough decline as a fraction of the peak, <= 0.
    pub max_drawdown: f64,
    /// Longest run of bars spent below a previous peak.
    pub max_drawdown_duration: usize,
    pub trade_count: usize,
    pub trips_won: usize,
    pub trips_lost: usize,
    pub win_rate: f64,
    pub avg_trade_pnl: f64,
    pub profit_factor: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Per-period NAV returns, one per interval of the curve.
    pub returns: Vec<f64>,
    /// Drawdown at each curve point, <= 0.
    pub drawdowns: Vec<f64>,
    /// Closed round trips, in closing order.
    pub round_trips: Vec<RoundTrip>,
}

#[derive(Debug, Clone, Default)]
pub struct Tracker {
    config: TrackerConfig,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn report_result(&self, result: &BacktestResult) -> PerformanceReport {
        self.report(&result.equity_curve, &result.trades)
    }

    pub fn report(&self, equity_curve: &[EquityPoint], trades: &[Trade]) -> PerformanceReport {
        let ppy = self.config.periods_per_year.max(1) as f64;
        let nav = self.nav_series(equity_curve);

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or_else(|| self.config.equity_mode.initial_equity());

        let total_return = match (nav.first(), nav.last()) {
            (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
            _ => 0.0,
        };

        let periods = nav.len().saturating_sub(1);
        let annualized_return = if periods == 0 || !total_return.is_finite() {
            0.0
        } else if 1.0 + total_return <= 0.0 {
            -1.0
        } else {
            (1.0 + total_return).powf(ppy / periods as f64) - 1.0
        };

        let returns = simple_returns(&nav);
        let (annualized_volatility, sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(&returns, self.config.risk_free_rate, ppy);

        let drawdowns = compute_drawdowns(&nav);
        let max_drawdown = drawdowns.iter().copied().fold(0.0_f64, f64::min);
        let max_drawdown_duration = longest_underwater_run(&drawdowns);

        let round_trips = extract_round_trips(trades, equity_curve, self.config.equity_mode);

        let mut trips_won = 0usize;
        let mut trips_lost = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trip in &round_trips {
            if trip.pnl > 0.0 {
                trips_won += 1;
                total_wins += trip.pnl;
                largest_win = largest_win.max(trip.pnl);
            } else if trip.pnl < 0.0 {
                trips_lost += 1;
                total_losses += trip.pnl.abs();
                largest_loss = largest_loss.max(trip.pnl.abs());
            }
        }

        let closed = round_trips.len();
        let win_rate = if closed > 0 {
            trips_won as f64 / closed as f64
        } else {
            0.0
        };
        let avg_trade_pnl = if closed > 0 {
            round_trips.iter().map(|t| t.pnl).sum::<f64>() / closed as f64
        } else {
            0.0
        };
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        PerformanceReport {
            final_equity,
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            trade_count: trades.len(),
            trips_won,
            trips_lost,
            win_rate,
            avg_trade_pnl,
            profit_factor,
            largest_win,
            largest_loss,
            returns,
            drawdowns,
            round_trips,
        }
    }

    fn nav_series(&self, equity_curve: &[EquityPoint]) -> Vec<f64> {
        equity_curve
            .iter()
            .map(|p| match self.config.equity_mode {
                EquityMode::Additive => self.config.capital_base + p.equity,
                EquityMode::Compounding => p.equity,
            })
            .collect()
    }
}

/// Annualised volatility, Sharpe and Sortino of per-period returns.
fn compute_risk_adjusted(returns: &[f64], rf: f64, ppy: f64) -> (f64, f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let stddev = population_stddev(returns);
    let excess_return = mean(returns) - rf;
    let annualizer = ppy.sqrt();

    let sharpe = if stddev > 0.0 {
        excess_return / stddev * annualizer
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < rf)
        .map(|&r| (r - rf).powi(2))
        .sum();
    let downside_stddev = (downside / returns.len() as f64).sqrt();

    let sortino = if downside_stddev > 0.0 {
        excess_return / downside_stddev * annualizer
    } else {
        0.0
    };

    (stddev * annualizer, sharpe, sortino)
}

fn compute_drawdowns(nav: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    nav.iter()
        .map(|&v| {
            peak = peak.max(v);
            if peak > 0.0 { (v / peak - 1.0).min(0.0) } else { 0.0 }
        })
        .collect()
}

fn longest_underwater_run(drawdowns: &[f64]) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for &dd in drawdowns {
        if dd < 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

struct OpenTrip {
    entry_index: usize,
    entry_date: NaiveDate,
    cash: f64,
}

/// Gains `instrument` earned over points `(entry, exit]` of the curve.
fn held_gain(curve: &[EquityPoint], instrument: &str, entry: usize, exit: usize) -> f64 {
    let from = curve.partition_point(|p| p.index <= entry);
    let to = curve.partition_point(|p| p.index <= exit);
    curve[from..to.max(from)]
        .iter()
        .filter_map(|p| p.gains.get(instrument))
        .sum()
}

/// Pair the trade log into round trips per instrument. Trips still open at
/// the end of the log are not reported.
///
/// Additive trips are priced from trade cash flows. Compounding sizes are NAV
/// fractions, so a trip instead collects the per-bar gains recorded on the
/// curve while it was open, less its share of costs.
fn extract_round_trips(
    trades: &[Trade],
    curve: &[EquityPoint],
    mode: EquityMode,
) -> Vec<RoundTrip> {
    let mut held: HashMap<&str, f64> = HashMap::new();
    let mut open: HashMap<&str, OpenTrip> = HashMap::new();
    let mut trips = Vec::new();

    for trade in trades {
        let instrument = trade.instrument.as_str();
        let before = held.get(instrument).copied().unwrap_or(0.0);
        let after = trade.position_after;
        held.insert(instrument, after);

        let flips = before != 0.0 && after != 0.0 && before.signum() != after.signum();
        // Share of the trade (and its cost) that closes the existing position.
        let closing_share = if flips {
            before.abs() / trade.delta.abs()
        } else if after == 0.0 {
            1.0
        } else {
            0.0
        };
        let cashflow = match mode {
            EquityMode::Additive => -trade.delta * trade.price - trade.cost,
            EquityMode::Compounding => -trade.cost,
        };

        if before != 0.0 && closing_share > 0.0 {
            if let Some(trip) = open.remove(instrument) {
                let earned = match mode {
                    EquityMode::Additive => 0.0,
                    EquityMode::Compounding => {
                        held_gain(curve, instrument, trip.entry_index, trade.index)
                    }
                };
                trips.push(RoundTrip {
                    instrument: instrument.to_string(),
                    entry_index: trip.entry_index,
                    entry_date: trip.entry_date,
                    exit_index: trade.index,
                    exit_date: trade.date,
                    pnl: trip.cash + earned + cashflow * closing_share,
                });
            }
        }

        if after != 0.0 {
            let opening_cash = cashflow * (1.0 - closing_share);
            open.entry(instrument)
                .and_modify(|t| t.cash += opening_cash)
                .or_insert(OpenTrip {
                    entry_index: trade.index,
                    entry_date: trade.date,
                    cash: opening_cash,
                });
        }
    }

    trips
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn make_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                index: i,
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
                position: Position::flat(),
                gains: BTreeMap::new(),
            })
            .collect()
    }

    fn make_trade(instrument: &str, index: usize, delta: f64, price: f64, after: f64) -> Trade {
        Trade {
            index,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                + chrono::Duration::days(index as i64),
            instrument: instrument.to_string(),
            delta,
            price,
            cost: 0.0,
            position_after: after,
        }
    }

    fn compounding() -> Tracker {
        Tracker::new(TrackerConfig {
            equity_mode: EquityMode::Compounding,
            ..TrackerConfig::default()
        })
    }

    #[test]
    fn single_point_is_trivial() {
        let report = compounding().report(&make_curve(&[1.0]), &[]);
        assert_eq!(report.total_return, 0.0);
        assert_eq!(report.annualized_return, 0.0);
        assert_eq!(report.annualized_volatility, 0.0);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.max_drawdown, 0.0);
        assert!(report.returns.is_empty());
    }

    #[test]
    fn empty_curve_is_trivial() {
        let report = Tracker::default().report(&[], &[]);
        assert_eq!(report.final_equity, 0.0);
        assert_eq!(report.total_return, 0.0);
        assert_eq!(report.max_drawdown_duration, 0);
    }

    #[test]
    fn total_return_compounding() {
        let report = compounding().report(&make_curve(&[1.0, 1.1, 1.2]), &[]);
        assert_relative_eq!(report.total_return, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn total_return_additive_uses_capital_base() {
        let tracker = Tracker::new(TrackerConfig {
            capital_base: 1_000.0,
            ..TrackerConfig::default()
        });
        let report = tracker.report(&make_curve(&[0.0, 50.0, 100.0]), &[]);
        assert_relative_eq!(report.total_return, 0.1, epsilon = 1e-12);
        assert_eq!(report.final_equity, 100.0);
    }

    #[test]
    fn annualized_return_over_one_year() {
        let mut values = vec![1.0; 253];
        values[252] = 1.1;
        let report = compounding().report(&make_curve(&values), &[]);
        assert_relative_eq!(report.annualized_return, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn flat_curve_has_zero_volatility_and_ratios() {
        let report = compounding().report(&make_curve(&[1.0, 1.0, 1.0, 1.0]), &[]);
        assert_eq!(report.annualized_volatility, 0.0);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.sortino_ratio, 0.0);
    }

    #[test]
    fn sharpe_positive_for_rising_curve() {
        let values: Vec<f64> = (0..50).map(|i| 1.0 + 0.01 * i as f64 + 0.002 * (i % 3) as f64).collect();
        let report = compounding().report(&make_curve(&values), &[]);
        assert!(report.sharpe_ratio > 0.0);
        assert!(report.annualized_volatility > 0.0);
    }

    #[test]
    fn max_drawdown_and_duration() {
        let report = compounding().report(&make_curve(&[1.0, 1.1, 0.9, 0.95, 0.8, 1.0, 1.2]), &[]);
        assert_relative_eq!(report.max_drawdown, 0.8 / 1.1 - 1.0, epsilon = 1e-12);
        assert_eq!(report.max_drawdown_duration, 4);
        assert!(report.drawdowns.iter().all(|&d| d <= 0.0));
    }

    #[test]
    fn round_trip_long() {
        let trades = vec![
            make_trade("ES", 1, 1.0, 100.0, 1.0),
            make_trade("ES", 3, -1.0, 105.0, 0.0),
        ];
        let trips = extract_round_trips(&trades, &[], EquityMode::Additive);
        assert_eq!(trips.len(), 1);
        assert_relative_eq!(trips[0].pnl, 5.0);
        assert_eq!(trips[0].entry_index, 1);
        assert_eq!(trips[0].exit_index, 3);
    }

    #[test]
    fn round_trip_scaling_and_flip() {
        let trades = vec![
            make_trade("ES", 0, 1.0, 100.0, 1.0),
            make_trade("ES", 1, 1.0, 102.0, 2.0),
            // sell 3: close 2 long, open 1 short
            make_trade("ES", 2, -3.0, 101.0, -1.0),
            make_trade("ES", 4, 1.0, 99.0, 0.0),
        ];
        let trips = extract_round_trips(&trades, &[], EquityMode::Additive);
        assert_eq!(trips.len(), 2);
        // long: -100 - 102 + 2 * 101 = 0
        assert_relative_eq!(trips[0].pnl, 0.0, epsilon = 1e-12);
        // short: 101 - 99 = 2
        assert_relative_eq!(trips[1].pnl, 2.0, epsilon = 1e-12);
        assert_eq!(trips[1].entry_index, 2);
    }

    #[test]
    fn round_trip_costs_reduce_pnl() {
        let mut open = make_trade("ES", 0, 2.0, 10.0, 2.0);
        open.cost = 0.2;
        let mut close = make_trade("ES", 1, -2.0, 11.0, 0.0);
        close.cost = 0.2;
        let trips = extract_round_trips(&[open, close], &[], EquityMode::Additive);
        assert_relative_eq!(trips[0].pnl, 2.0 - 0.4, epsilon = 1e-12);
    }

    #[test]
    fn compounding_trip_collects_curve_gains() {
        // long half of NAV for two bars: +0.02 then -0.05 of NAV, 0.003 costs
        let mut curve = make_curve(&[1.0, 1.02, 0.97, 0.97]);
        curve[1].gains.insert("ES".into(), 0.02);
        curve[2].gains.insert("ES".into(), -0.05);
        curve[3].gains.insert("ES".into(), 0.4);
        let mut open = make_trade("ES", 0, 0.5, 100.0, 0.5);
        open.cost = 0.001;
        let mut close = make_trade("ES", 2, -0.5, 94.0, 0.0);
        close.cost = 0.002;

        let trips = extract_round_trips(&[open, close], &curve, EquityMode::Compounding);
        assert_eq!(trips.len(), 1);
        assert_relative_eq!(trips[0].pnl, 0.02 - 0.05 - 0.003, epsilon = 1e-12);
    }

    #[test]
    fn compounding_loss_after_costs_counts_as_loss() {
        // a small price gain that costs more than it earns
        let mut curve = make_curve(&[1.0, 0.9995, 0.9985005]);
        curve[1].gains.insert("ES".into(), 0.0005);
        let mut open = make_trade("ES", 0, 1.0, 100.0, 1.0);
        open.cost = 0.001;
        let mut close = make_trade("ES", 1, -1.0, 100.05, 0.0);
        close.cost = 0.0009995;

        let report = compounding().report(&curve, &[open, close]);
        assert_eq!(report.round_trips.len(), 1);
        assert_relative_eq!(report.round_trips[0].pnl, -0.0014995, epsilon = 1e-12);
        assert_eq!(report.trips_lost, 1);
        assert_eq!(report.win_rate, 0.0);
    }

    #[test]
    fn open_trip_is_not_counted() {
        let trips = extract_round_trips(
            &[make_trade("ES", 0, 1.0, 10.0, 1.0)],
            &[],
            EquityMode::Additive,
        );
        assert!(trips.is_empty());
    }

    #[test]
    fn trade_statistics() {
        let trades = vec![
            make_trade("A", 0, 1.0, 10.0, 1.0),
            make_trade("A", 1, -1.0, 14.0, 0.0),
            make_trade("B", 0, -1.0, 20.0, -1.0),
            make_trade("B", 2, 1.0, 22.0, 0.0),
            make_trade("A", 3, 1.0, 10.0, 1.0),
            make_trade("A", 4, -1.0, 10.0, 0.0),
        ];
        let report = Tracker::default().report(&make_curve(&[0.0, 1.0]), &trades);
        assert_eq!(report.trade_count, 6);
        assert_eq!(report.round_trips.len(), 3);
        assert_eq!(report.trips_won, 1);
        assert_eq!(report.trips_lost, 1);
        assert_relative_eq!(report.win_rate, 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(report.avg_trade_pnl, 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(report.profit_factor, 2.0, epsilon = 1e-12);
        assert_relative_eq!(report.largest_win, 4.0);
        assert_relative_eq!(report.largest_loss, 2.0);
    }

    #[test]
    fn report_is_deterministic() {
        let curve = make_curve(&[1.0, 1.05, 0.97, 1.02]);
        let trades = vec![make_trade("ES", 0, 1.0, 10.0, 1.0)];
        assert_eq!(
            compounding().report(&curve, &trades),
            compounding().report(&curve, &trades)
        );
    }
}
