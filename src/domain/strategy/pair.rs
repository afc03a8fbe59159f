//! Mean-reversion pair trade on a spread signal.
//!
//! Trades the spread `long_leg − hedge_ratio × short_leg`: sells it when the
//! signal is stretched above `entry`, buys it below `−entry`, and closes both
//! legs once the signal is back inside `±exit`.

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use crate::domain::position::Position;
use crate::domain::signal::SignalValue;
use crate::domain::strategy::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct PairStrategy {
    pub long_leg: String,
    pub short_leg: String,
    pub hedge_ratio: f64,
    /// Units of `long_leg` per spread unit.
    pub size: f64,
    pub entry: f64,
    pub exit: f64,
}

impl PairStrategy {
    fn spread_position(&self, units: f64) -> Position {
        Position::flat()
            .with(&self.long_leg, units * self.size)
            .with(&self.short_leg, -units * self.size * self.hedge_ratio)
    }
}

impl Strategy for PairStrategy {
    fn name(&self) -> String {
        format!("PAIR({}/{})", self.long_leg, self.short_leg)
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.long_leg.clone(), self.short_leg.clone()]
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

        let target = if value > self.entry {
            self.spread_position(-1.0)
        } else if value < -self.entry {
            self.spread_position(1.0)
        } else if value.abs() < self.exit {
            Position::flat()
        } else {
            return Ok(current.clone());
        };
        Ok(target)
    }
}
