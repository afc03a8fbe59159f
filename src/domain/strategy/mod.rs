//! Strategy contract and reference implementations.
//!
//! A strategy maps the signal value for bar `t`, the history through `t` and
//! the position held entering `t` to the position it wants held over
//! `[t, t+1]`. It must always answer; holding is returning `current`
//! unchanged. All position bookkeeping stays in the engine.

pub mod breakout;
pub mod pair;
pub mod threshold;

pub use breakout::BreakoutStrategy;
pub use pair::PairStrategy;
pub use threshold::ThresholdStrategy;

use crate::domain::error::ExtensionError;
use crate::domain::history::History;
use crate::domain::position::Position;
use crate::domain::signal::SignalValue;

pub trait Strategy: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> String;

    /// Instruments this strategy reads or trades. Each must exist in the dataset.
    fn instruments(&self) -> Vec<String>;

    fn decide(
        &self,
        index: usize,
        history: &History<'_>,
        signal: &SignalValue,
        current: &Position,
    ) -> Result<Position, ExtensionError>;
}
