//! One-bar return breakout against rolling return volatility.
//!
//! R[t] = P[t] / P[t-1] - 1
//! SD(n)[t] = stddev(R[t-n+1..=t])
//! BREAKOUT[t] = +1 if R[t] > rise * SD, -1 if R[t] < -drop * SD, else 0
//! Warmup: n + 1 prices.

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use crate::domain::signal::{Signal, SignalValue};
use crate::domain::stats::{population_stddev, simple_returns};

#[derive(Debug, Clone, PartialEq)]
pub struct StdDevBreakout {
    /// Instrument whose returns are watched.
    pub reference: String,
    pub rise: f64,
    pub drop: f64,
}

impl StdDevBreakout {
    pub fn new(reference: &str, rise: f64, drop: f64) -> Self {
        Self {
            reference: reference.to_string(),
            rise,
            drop,
        }
    }
}

impl Signal for StdDevBreakout {
    fn name(&self) -> String {
        format!("STDDEV_BREAKOUT({},{},{})", self.reference, self.rise, self.drop)
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.reference.clone()]
    }

    fn compute(
        &self,
        history: &History<'_>,
        lookback: usize,
    ) -> Result<SignalValue, ExtensionError> {
        if lookback == 0 {
            return Ok(SignalValue::Undefined);
        }
        let Some(prices) = history.window(&self.reference, lookback + 1)? else {
            return Ok(SignalValue::Undefined);
        };
        let returns = simple_returns(&prices);
        let sd = population_stddev(&returns);
        let latest = returns[returns.len() - 1];

        let mut signal = 0.0;
        if latest > sd * self.rise {
            signal = 1.0;
        }
        if latest < -sd * self.drop {
            signal = -1.0;
        }
        Ok(SignalValue::Scalar(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price_series::{Dataset, PriceSeries};
    use chrono::NaiveDate;

    fn dataset(prices: &[f64]) -> Dataset {
        let obs: Vec<(NaiveDate, f64)> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| (NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(), p))
            .collect();
        Dataset::new(vec![PriceSeries::from_prices("SI", &obs).unwrap()]).unwrap()
    }

    fn value(prices: &[f64], lookback: usize) -> SignalValue {
        let ds = dataset(prices);
        StdDevBreakout::new("SI", 1.0, 1.0)
            .compute(&History::new(&ds, prices.len() - 1), lookback)
            .unwrap()
    }

    #[test]
    fn jump_up_is_long() {
        assert_eq!(value(&[100.0, 100.0, 100.0, 110.0], 3), SignalValue::Scalar(1.0));
    }

    #[test]
    fn drop_is_short() {
        assert_eq!(value(&[100.0, 100.0, 100.0, 90.0], 3), SignalValue::Scalar(-1.0));
    }

    #[test]
    fn quiet_market_is_neutral() {
        assert_eq!(value(&[100.0, 100.0, 100.0, 100.0], 3), SignalValue::Scalar(0.0));
    }

    #[test]
    fn warmup_needs_lookback_plus_one_prices() {
        assert_eq!(value(&[100.0, 101.0, 102.0], 3), SignalValue::Undefined);
    }
}
