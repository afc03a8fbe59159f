//! Price series and the aligned multi-instrument dataset.

use crate::domain::error::BacktestError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// One observation of an instrument. `price` is `None` for a gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Option<f64>,
}

/// Ordered observations for a single instrument.
///
/// Timestamps are strictly increasing and every present price is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    instrument: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, rejecting unsorted or duplicate dates and non-finite prices.
    pub fn new(
        instrument: impl Into<String>,
        points: Vec<PricePoint>,
    ) -> Result<Self, BacktestError> {
        let instrument = instrument.into();

        for pair in points.windows(2) {
            if pair[1].date == pair[0].date {
                return Err(BacktestError::InvalidSeries {
                    instrument,
                    reason: format!("duplicate timestamp {}", pair[1].date),
                });
            }
            if pair[1].date < pair[0].date {
                return Err(BacktestError::InvalidSeries {
                    instrument,
                    reason: format!("timestamp {} follows {}", pair[1].date, pair[0].date),
                });
            }
        }

        if let Some(bad) = points
            .iter()
            .find(|p| p.price.is_some_and(|v| !v.is_finite()))
        {
            return Err(BacktestError::InvalidSeries {
                instrument,
                reason: format!("non-finite price on {}", bad.date),
            });
        }

        Ok(Self { instrument, points })
    }

    /// Convenience constructor for a series without gaps.
    pub fn from_prices(
        instrument: impl Into<String>,
        observations: &[(NaiveDate, f64)],
    ) -> Result<Self, BacktestError> {
        let points = observations
            .iter()
            .map(|&(date, price)| PricePoint {
                date,
                price: Some(price),
            })
            .collect();
        Self::new(instrument, points)
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Several series aligned on the union of their dates.
///
/// An instrument that has no observation on a timeline date holds `None`
/// there, exactly like an explicit gap in its own series.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    timeline: Vec<NaiveDate>,
    prices: BTreeMap<String, Vec<Option<f64>>>,
}

impl Dataset {
    pub fn new(series: Vec<PriceSeries>) -> Result<Self, BacktestError> {
        let mut seen = BTreeSet::new();
        for s in &series {
            if !seen.insert(s.instrument().to_string()) {
                return Err(BacktestError::configuration(format!(
                    "instrument {} supplied more than once",
                    s.instrument()
                )));
            }
        }

        let timeline: Vec<NaiveDate> = series
            .iter()
            .flat_map(|s| s.points().iter().map(|p| p.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let position: BTreeMap<NaiveDate, usize> = timeline
            .iter()
            .enumerate()
            .map(|(i, &d)| (d, i))
            .collect();

        let mut prices = BTreeMap::new();
        for s in series {
            let mut column = vec![None; timeline.len()];
            for p in s.points() {
                column[position[&p.date]] = p.price;
            }
            prices.insert(s.instrument, column);
        }

        Ok(Self { timeline, prices })
    }

    /// Number of bars on the unified timeline.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    pub fn timeline(&self) -> &[NaiveDate] {
        &self.timeline
    }

    pub fn date(&self, index: usize) -> Option<NaiveDate> {
        self.timeline.get(index).copied()
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.prices.contains_key(instrument)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }

    /// Full price column of an instrument, gaps included.
    pub fn column(&self, instrument: &str) -> Option<&[Option<f64>]> {
        self.prices.get(instrument).map(Vec::as_slice)
    }

    pub fn price(&self, instrument: &str, index: usize) -> Option<f64> {
        self.prices
            .get(instrument)
            .and_then(|c| c.get(index).copied().flatten())
    }

    /// Most recent present price at or before `index`.
    pub fn last_valid_price(&self, instrument: &str, index: usize) -> Option<f64> {
        let column = self.prices.get(instrument)?;
        let end = index.min(column.len().checked_sub(1)?);
        column[..=end].iter().rev().find_map(|p| *p)
    }
}
