//! Single-instrument threshold entry/exit.

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use crate::domain::position::Position;
use crate::domain::signal::SignalValue;
use crate::domain::strategy::Strategy;

/// Short-side thresholds; absent for long-only strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortRule {
    pub size: f64,
    /// Go short when the signal falls below this.
    pub entry: f64,
    /// Cover when the signal rises to or above this.
    pub exit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdStrategy {
    pub instrument: String,
    pub long_size: f64,
    /// Go long when the signal is above this.
    pub entry_long: f64,
    /// Exit a long when the signal is at or below this.
    pub exit_long: f64,
    pub short: Option<ShortRule>,
}

impl ThresholdStrategy {
    pub fn long_only(instrument: &str, size: f64, entry: f64, exit: f64) -> Self {
        Self {
            instrument: instrument.to_string(),
            long_size: size,
            entry_long: entry,
            exit_long: exit,
            short: None,
        }
    }

    pub fn with_short(mut self, size: f64, entry: f64, exit: f64) -> Self {
        self.short = Some(ShortRule { size, entry, exit });
        self
    }

    fn target_size(&self, signal: f64, held: f64) -> f64 {
        if signal > self.entry_long {
            return self.long_size;
        }
        if let Some(short) = &self.short {
            if signal < short.entry {
                return -short.size;
            }
            if held < 0.0 && signal >= short.exit {
                return 0.0;
            }
        }
        if held > 0.0 && signal <= self.exit_long {
            return 0.0;
        }
        held
    }
}

impl Strategy for ThresholdStrategy {
    fn name(&self) -> String {
        format!("THRESHOLD({})", self.instrument)
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
        let Some(value) = signal.as_scalar() else {
            return Ok(current.clone());
        };
        let held = current.size(&self.instrument);
        let mut target = current.clone();
        target.set(&self.instrument, self.target_size(value, held));
        Ok(target)
    }
}
