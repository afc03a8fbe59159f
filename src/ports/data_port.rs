//! Price data access port trait.

use crate::domain::error::BacktestError;
use crate::domain::price_series::PriceSeries;

pub trait DataPort {
    /// Load the full series for `instrument`. Malformed or unsorted input is
    /// an error, never silently repaired.
    fn fetch_series(&self, instrument: &str) -> Result<PriceSeries, BacktestError>;

    /// Instruments this source can load, sorted.
    fn list_instruments(&self) -> Result<Vec<String>, BacktestError>;
}
