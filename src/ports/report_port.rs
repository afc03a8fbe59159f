//! Report output port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;
use crate::domain::tracker::PerformanceReport;
use std::path::Path;

/// Port for writing a finished run somewhere a reporting tool can read it.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        report: &PerformanceReport,
        output_path: &Path,
    ) -> Result<(), BacktestError>;
}
