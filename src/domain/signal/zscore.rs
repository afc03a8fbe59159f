//! Rolling z-score of a price or spread.
//!
//! Z(n)[t] = (X[t] - mean(X[t-n+1..=t])) / stddev(X[t-n+1..=t])
//! Population stddev. A flat window has no defined z-score.

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use crate::domain::signal::{Signal, SignalValue, Source};
use crate::domain::stats::{mean, population_stddev};

#[derive(Debug, Clone, PartialEq)]
pub struct RollingZScore {
    source: Source,
}

impl RollingZScore {
    pub fn new(source: Source) -> Self {
        Self { source }
    }

    pub fn of_price(instrument: &str) -> Self {
        Self::new(Source::price(instrument))
    }

    pub fn of_spread(long: &str, short: &str, hedge_ratio: f64) -> Self {
        Self::new(Source::spread(long, short, hedge_ratio))
    }
}

impl Signal for RollingZScore {
    fn name(&self) -> String {
        format!("ZSCORE({})", self.source)
    }

    fn instruments(&self) -> Vec<String> {
        self.source.instruments()
    }

    fn compute(
        &self,
        history: &History<'_>,
        lookback: usize,
    ) -> Result<SignalValue, ExtensionError> {
        let Some(window) = self.source.window(history, lookback)? else {
            return Ok(SignalValue::Undefined);
        };
        let sd = population_stddev(&window);
        if sd == 0.0 {
            return Ok(SignalValue::Undefined);
        }
        let current = window[window.len() - 1];
        Ok(SignalValue::Scalar((current - mean(&window)) / sd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price_series::{Dataset, PriceSeries};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn dataset(prices: &[f64]) -> Dataset {
        let obs: Vec<(NaiveDate, f64)> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| (NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(), p))
            .collect();
        Dataset::new(vec![PriceSeries::from_prices("ES", &obs).unwrap()]).unwrap()
    }

    #[test]
    fn zscore_known_value() {
        // mean 5, population stddev 2, last value 9 -> z = 2
        let ds = dataset(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let v = RollingZScore::of_price("ES")
            .compute(&History::new(&ds, 7), 8)
            .unwrap();
        assert_relative_eq!(v.as_scalar().unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn flat_window_is_undefined() {
        let ds = dataset(&[3.0, 3.0, 3.0]);
        let v = RollingZScore::of_price("ES")
            .compute(&History::new(&ds, 2), 3)
            .unwrap();
        assert_eq!(v, SignalValue::Undefined);
    }

    #[test]
    fn warmup_is_undefined() {
        let ds = dataset(&[1.0, 2.0]);
        let v = RollingZScore::of_price("ES")
            .compute(&History::new(&ds, 1), 3)
            .unwrap();
        assert_eq!(v, SignalValue::Undefined);
    }

    #[test]
    fn name_includes_source() {
        assert_eq!(
            RollingZScore::of_spread("GC", "SI", 2.0).name(),
            "ZSCORE(GC-2*SI)"
        );
    }
}
