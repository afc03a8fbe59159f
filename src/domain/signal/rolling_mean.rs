//! Rolling mean of price and its one-bar change.
//!
//! ROLLING_MEAN(n)[t] = sum(P[t-j] for j in 0..n) / n
//! ROLLING_MEAN_CHANGE(n)[t] = ROLLING_MEAN(n)[t] - ROLLING_MEAN(n)[t-1]
//! Warmup: n bars for the mean, n + 1 for the change.

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use crate::domain::signal::{Signal, SignalValue};
use crate::domain::stats::mean;

#[derive(Debug, Clone, PartialEq)]
pub struct RollingMean {
    pub instrument: String,
}

impl RollingMean {
    pub fn new(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
        }
    }
}

impl Signal for RollingMean {
    fn name(&self) -> String {
        format!("ROLLING_MEAN({})", self.instrument)
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.instrument.clone()]
    }

    fn compute(
        &self,
        history: &History<'_>,
        lookback: usize,
    ) -> Result<SignalValue, ExtensionError> {
        Ok(match history.window(&self.instrument, lookback)? {
            Some(window) => SignalValue::Scalar(mean(&window)),
            None => SignalValue::Undefined,
        })
    }
}

/// Positive while the rolling mean is rising.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingMeanChange {
    pub instrument: String,
}

impl RollingMeanChange {
    pub fn new(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
        }
    }
}

impl Signal for RollingMeanChange {
    fn name(&self) -> String {
        format!("ROLLING_MEAN_CHANGE({})", self.instrument)
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.instrument.clone()]
    }

    fn compute(
        &self,
        history: &History<'_>,
        lookback: usize,
    ) -> Result<SignalValue, ExtensionError> {
        if lookback == 0 {
            return Ok(SignalValue::Undefined);
        }
        let Some(window) = history.window(&self.instrument, lookback + 1)? else {
            return Ok(SignalValue::Undefined);
        };
        let previous = mean(&window[..lookback]);
        let current = mean(&window[1..]);
        Ok(SignalValue::Scalar(current - previous))
    }
}
