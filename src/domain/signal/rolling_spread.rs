//! Deviation of a two-leg spread from its rolling mean.
//!
//! S[t] = A[t] - h * B[t]
//! ROLLING_SPREAD(n)[t] = S[t] - sum(S[t-j] for j in 0..n) / n

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use crate::domain::signal::{Signal, SignalValue, Source};
use crate::domain::stats::mean;

#[derive(Debug, Clone, PartialEq)]
pub struct RollingSpread {
    source: Source,
}

impl RollingSpread {
    pub fn new(long: &str, short: &str, hedge_ratio: f64) -> Self {
        Self {
            source: Source::spread(long, short, hedge_ratio),
        }
    }
}

impl Signal for RollingSpread {
    fn name(&self) -> String {
        format!("ROLLING_SPREAD({})", self.source)
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
        let current = window[window.len() - 1];
        Ok(SignalValue::Scalar(current - mean(&window)))
    }
}
