//! Signal contract and reference implementations.
//!
//! A signal turns the visible price history into a derived value:
//! - `SignalValue`: what a signal produces for one bar
//! - `Source`: the series a windowed signal is computed over
//! - `Signal`: the extension trait
//!
//! Signals are pure. Calling `compute` twice on the same history and lookback
//! returns the same value, and fewer than `lookback` usable bars yields
//! [`SignalValue::Undefined`] instead of an error.

pub mod breakout;
pub mod rolling_mean;
pub mod rolling_spread;
pub mod zscore;

pub use breakout::StdDevBreakout;
pub use rolling_mean::{RollingMean, RollingMeanChange};
pub use rolling_spread::RollingSpread;
pub use zscore::RollingZScore;

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    /// Not enough history; the engine skips the decision for this bar.
    Undefined,
    Scalar(f64),
    Vector(Vec<f64>),
}

impl SignalValue {
    pub fn is_defined(&self) -> bool {
        !matches!(self, SignalValue::Undefined)
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            SignalValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// Signal-generation capability.
pub trait Signal: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> String;

    /// Instruments this signal reads. Each must exist in the dataset.
    fn instruments(&self) -> Vec<String>;

    fn compute(&self, history: &History<'_>, lookback: usize)
    -> Result<SignalValue, ExtensionError>;
}

/// Series a windowed signal is computed over.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Price(String),
    /// `long − hedge_ratio × short`, bar by bar.
    Spread {
        long: String,
        short: String,
        hedge_ratio: f64,
    },
}

impl Source {
    pub fn price(instrument: &str) -> Self {
        Source::Price(instrument.to_string())
    }

    pub fn spread(long: &str, short: &str, hedge_ratio: f64) -> Self {
        Source::Spread {
            long: long.to_string(),
            short: short.to_string(),
            hedge_ratio,
        }
    }

    pub fn instruments(&self) -> Vec<String> {
        match self {
            Source::Price(i) => vec![i.clone()],
            Source::Spread { long, short, .. } => vec![long.clone(), short.clone()],
        }
    }

    /// The last `len` values ending at the current bar, `None` if unavailable.
    pub fn window(
        &self,
        history: &History<'_>,
        len: usize,
    ) -> Result<Option<Vec<f64>>, ExtensionError> {
        match self {
            Source::Price(i) => history.window(i, len),
            Source::Spread {
                long,
                short,
                hedge_ratio,
            } => {
                let (Some(a), Some(b)) = (history.window(long, len)?, history.window(short, len)?)
                else {
                    return Ok(None);
                };
                Ok(Some(
                    a.iter().zip(&b).map(|(x, y)| x - hedge_ratio * y).collect(),
                ))
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Price(i) => write!(f, "{}", i),
            Source::Spread {
                long,
                short,
                hedge_ratio,
            } => write!(f, "{}-{}*{}", long, hedge_ratio, short),
        }
    }
}
