//! Causal view of a [`Dataset`] ending at the bar being evaluated.
//!
//! Signals and strategies only ever see a `History`. Slices it hands out stop
//! at the current bar, and indexed access past it fails with
//! [`ExtensionError::LookAhead`], which the engine reports as a causality
//! violation.

use crate::domain::error::ExtensionError;
use crate::domain::price_series::Dataset;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy)]
pub struct History<'a> {
    dataset: &'a Dataset,
    current: usize,
}

impl<'a> History<'a> {
    /// View of `dataset` through bar `current` inclusive.
    ///
    /// Panics if `current` is outside the dataset; the engine never builds one
    /// that way.
    pub fn new(dataset: &'a Dataset, current: usize) -> Self {
        assert!(current < dataset.len(), "history index out of range");
        Self { dataset, current }
    }

    /// Index of the bar being evaluated.
    pub fn index(&self) -> usize {
        self.current
    }

    pub fn date(&self) -> NaiveDate {
        self.dataset.timeline()[self.current]
    }

    /// Number of bars visible, i.e. `index() + 1`.
    pub fn len(&self) -> usize {
        self.current + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.dataset.contains(instrument)
    }

    /// Visible timestamps, oldest first.
    pub fn dates(&self) -> &'a [NaiveDate] {
        &self.dataset.timeline()[..=self.current]
    }

    /// Visible prices of `instrument`, oldest first.
    pub fn prices(&self, instrument: &str) -> Result<&'a [Option<f64>], ExtensionError> {
        let column = self
            .dataset
            .column(instrument)
            .ok_or_else(|| ExtensionError::failed(format!("unknown instrument {instrument}")))?;
        Ok(&column[..=self.current])
    }

    /// Price of `instrument` at `index`, refusing any bar after the current one.
    pub fn price_at(&self, instrument: &str, index: usize) -> Result<Option<f64>, ExtensionError> {
        if index > self.current {
            return Err(ExtensionError::LookAhead {
                requested: index,
                current: self.current,
            });
        }
        Ok(self.prices(instrument)?[index])
    }

    /// Price of `instrument` at the current bar.
    pub fn latest(&self, instrument: &str) -> Result<Option<f64>, ExtensionError> {
        self.price_at(instrument, self.current)
    }

    /// The last `len` prices ending at the current bar, or `None` when fewer
    /// than `len` bars are visible or the window contains a gap.
    pub fn window(&self, instrument: &str, len: usize) -> Result<Option<Vec<f64>>, ExtensionError> {
        let visible = self.prices(instrument)?;
        if len == 0 || visible.len() < len {
            return Ok(None);
        }
        Ok(visible[visible.len() - len..].iter().copied().collect())
    }
}
