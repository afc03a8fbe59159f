//! Positions held between bars and the trades that change them.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Signed size per instrument. Flat instruments are not stored, so two
/// positions compare equal whenever they hold the same non-zero sizes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    sizes: BTreeMap<String, f64>,
}

impl Position {
    pub fn flat() -> Self {
        Self::default()
    }

    /// Position holding `size` of a single instrument.
    pub fn single(instrument: &str, size: f64) -> Self {
        Self::flat().with(instrument, size)
    }

    pub fn with(mut self, instrument: &str, size: f64) -> Self {
        self.set(instrument, size);
        self
    }

    pub fn set(&mut self, instrument: &str, size: f64) {
        if size == 0.0 {
            self.sizes.remove(instrument);
        } else {
            self.sizes.insert(instrument.to_string(), size);
        }
    }

    pub fn size(&self, instrument: &str) -> f64 {
        self.sizes.get(instrument).copied().unwrap_or(0.0)
    }

    pub fn is_flat(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.sizes.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Per-instrument size changes needed to go from `self` to `target`,
    /// ordered by instrument name. Unchanged instruments are omitted.
    pub fn deltas_to(&self, target: &Position) -> Vec<(String, f64)> {
        let mut names: Vec<&String> = self.sizes.keys().chain(target.sizes.keys()).collect();
        names.sort();
        names.dedup();

        names
            .into_iter()
            .filter_map(|name| {
                let delta = target.size(name) - self.size(name);
                (delta != 0.0).then(|| (name.clone(), delta))
            })
            .collect()
    }
}

/// A position change on one instrument at a given bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub index: usize,
    pub date: NaiveDate,
    pub instrument: String,
    /// Signed size change.
    pub delta: f64,
    /// Execution price (the instrument's price at `index`).
    pub price: f64,
    /// Transaction cost charged, in equity units.
    pub cost: f64,
    /// Size held on this instrument after the trade.
    pub position_after: f64,
}

impl Trade {
    pub fn is_buy(&self) -> bool {
        self.delta > 0.0
    }

    pub fn position_before(&self) -> f64 {
        self.position_after - self.delta
    }
}
