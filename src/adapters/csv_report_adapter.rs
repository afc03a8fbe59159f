//! CSV report adapter implementing ReportPort.
//!
//! Writes four files into the output directory:
//! `equity.csv`, `trades.csv`, `round_trips.csv` and `summary.csv`.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;
use crate::domain::position::Position;
use crate::domain::tracker::PerformanceReport;
use crate::ports::report_port::ReportPort;

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn format_position(position: &Position) -> String {
    position
        .iter()
        .map(|(instrument, size)| format!("{instrument}:{size}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Metric name/value pairs in display order.
pub fn summary_rows(report: &PerformanceReport) -> Vec<(&'static str, String)> {
    vec![
        ("final_equity", format!("{:.6}", report.final_equity)),
        ("total_return", format!("{:.6}", report.total_return)),
        ("annualized_return", format!("{:.6}", report.annualized_return)),
        (
            "annualized_volatility",
            format!("{:.6}", report.annualized_volatility),
        ),
        ("sharpe_ratio", format!("{:.4}", report.sharpe_ratio)),
        ("sortino_ratio", format!("{:.4}", report.sortino_ratio)),
        ("max_drawdown", format!("{:.6}", report.max_drawdown)),
        (
            "max_drawdown_duration",
            report.max_drawdown_duration.to_string(),
        ),
        ("trade_count", report.trade_count.to_string()),
        ("round_trips", report.round_trips.len().to_string()),
        ("trips_won", report.trips_won.to_string()),
        ("trips_lost", report.trips_lost.to_string()),
        ("win_rate", format!("{:.4}", report.win_rate)),
        ("avg_trade_pnl", format!("{:.6}", report.avg_trade_pnl)),
        ("profit_factor", format!("{:.4}", report.profit_factor)),
        ("largest_win", format!("{:.6}", report.largest_win)),
        ("largest_loss", format!("{:.6}", report.largest_loss)),
    ]
}

/// One row per curve point. `drawdown` is read from the report, which holds
/// one value per point.
fn write_equity(
    result: &BacktestResult,
    report: &PerformanceReport,
    dir: &Path,
) -> Result<(), BacktestError> {
    let mut wtr = csv::Writer::from_path(dir.join("equity.csv"))?;
    wtr.write_record(["index", "date", "equity", "position", "drawdown"])?;
    for (i, point) in result.equity_curve.iter().enumerate() {
        let drawdown = report.drawdowns.get(i).copied().unwrap_or(0.0);
        wtr.write_record([
            point.index.to_string(),
            point.date.to_string(),
            point.equity.to_string(),
            format_position(&point.position),
            drawdown.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_trades(result: &BacktestResult, dir: &Path) -> Result<(), BacktestError> {
    let mut wtr = csv::Writer::from_path(dir.join("trades.csv"))?;
    wtr.write_record([
        "index",
        "date",
        "instrument",
        "side",
        "delta",
        "price",
        "cost",
        "position_after",
    ])?;
    for trade in &result.trades {
        let side = if trade.is_buy() { "BUY" } else { "SELL" };
        wtr.write_record([
            trade.index.to_string(),
            trade.date.to_string(),
            trade.instrument.clone(),
            side.to_string(),
            trade.delta.to_string(),
            trade.price.to_string(),
            trade.cost.to_string(),
            trade.position_after.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_round_trips(report: &PerformanceReport, dir: &Path) -> Result<(), BacktestError> {
    let mut wtr = csv::Writer::from_path(dir.join("round_trips.csv"))?;
    wtr.write_record(["instrument", "entry_date", "exit_date", "bars", "pnl"])?;
    for trip in &report.round_trips {
        wtr.write_record([
            trip.instrument.clone(),
            trip.entry_date.to_string(),
            trip.exit_date.to_string(),
            (trip.exit_index - trip.entry_index).to_string(),
            trip.pnl.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_summary(report: &PerformanceReport, dir: &Path) -> Result<(), BacktestError> {
    let mut wtr = csv::Writer::from_path(dir.join("summary.csv"))?;
    wtr.write_record(["metric", "value"])?;
    for (name, value) in summary_rows(report) {
        wtr.write_record([name, value.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        report: &PerformanceReport,
        output_path: &Path,
    ) -> Result<(), BacktestError> {
        fs::create_dir_all(output_path)?;
        write_equity(result, report, output_path)?;
        write_trades(result, output_path)?;
        write_round_trips(report, output_path)?;
        write_summary(report, output_path)?;
        info!(path = %output_path.display(), "report written");
        Ok(())
    }
}
