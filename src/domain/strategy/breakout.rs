//! Direction-following strategy for a `+1 / 0 / −1` signal.
//!
//! `+1` holds `long_size`, `−1` holds `−short_size`, anything else closes the
//! position. The traded instrument may differ from the one the signal watches.

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use crate::domain::position::Position;
use crate::domain::signal::SignalValue;
use crate::domain::strategy::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutStrategy {
    pub instrument: String,
    pub long_size: f64,
    pub short_size: f64,
}

impl BreakoutStrategy {
    pub fn new(instrument: &str, long_size: f64, short_size: f64) -> Self {
        Self {
            instrument: instrument.to_string(),
            long_size,
            short_size,
        }
    }
}

impl Strategy for BreakoutStrategy {
    fn name(&self) -> String {
        format!("BREAKOUT({})", self.instrument)
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.instrument.clone()]
    }

    fn decide(
        &self,
        _index: usize,
        _history: &History<'_>,
        signal: &SignalValue,
        current: &Position,
    ) -> Result<Position, ExtensionError> {
        let Some(direction) = signal.as_scalar() else {
            return Ok(current.clone());
        };
        let size = if direction == 1.0 {
            self.long_size
        } else if direction == -1.0 {
            -self.short_size
        } else {
            0.0
        };
        let mut target = current.clone();
        target.set(&self.instrument, size);
        Ok(target)
    }
}
