#![allow(dead_code)]

use barlag::domain::error::{BacktestError, ExtensionError};
use barlag::domain::history::History;
use barlag::domain::position::Position;
use barlag::domain::price_series::{Dataset, PricePoint, PriceSeries};
use barlag::domain::signal::{Signal, SignalValue};
use barlag::domain::strategy::Strategy;
use barlag::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashMap;

pub fn date(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
}

pub fn series(instrument: &str, prices: &[Option<f64>]) -> PriceSeries {
    let points = prices
        .iter()
        .enumerate()
        .map(|(i, &price)| PricePoint {
            date: date(i),
            price,
        })
        .collect();
    PriceSeries::new(instrument, points).unwrap()
}

pub fn dense(instrument: &str, prices: &[f64]) -> PriceSeries {
    let prices: Vec<Option<f64>> = prices.iter().copied().map(Some).collect();
    series(instrument, &prices)
}

pub fn make_dataset(instrument: &str, prices: &[f64]) -> Dataset {
    Dataset::new(vec![dense(instrument, prices)]).unwrap()
}

pub struct MockDataPort {
    pub data: HashMap<String, PriceSeries>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.data.insert(series.instrument().to_string(), series);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors
            .insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(&self, instrument: &str) -> Result<PriceSeries, BacktestError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(BacktestError::Csv {
                reason: reason.clone(),
            });
        }
        self.data
            .get(instrument)
            .cloned()
            .ok_or_else(|| BacktestError::Csv {
                reason: format!("no data for {instrument}"),
            })
    }

    fn list_instruments(&self) -> Result<Vec<String>, BacktestError> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Returns the latest price, but fails once it reaches `fail_at`.
pub struct FailingSignal {
    pub instrument: String,
    pub fail_at: usize,
}

impl Signal for FailingSignal {
    fn name(&self) -> String {
        "FAILING".into()
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.instrument.clone()]
    }

    fn compute(&self, history: &History<'_>, _lookback: usize) -> Result<SignalValue, ExtensionError> {
        if history.index() >= self.fail_at {
            return Err(ExtensionError::failed("model diverged"));
        }
        Ok(history
            .latest(&self.instrument)?
            .map_or(SignalValue::Undefined, SignalValue::Scalar))
    }
}

/// Reads the next bar once it reaches `peek_at`.
pub struct PeekingSignal {
    pub instrument: String,
    pub peek_at: usize,
}

impl Signal for PeekingSignal {
    fn name(&self) -> String {
        "PEEKING".into()
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.instrument.clone()]
    }

    fn compute(&self, history: &History<'_>, _lookback: usize) -> Result<SignalValue, ExtensionError> {
        let index = if history.index() >= self.peek_at {
            history.index() + 1
        } else {
            history.index()
        };
        Ok(history
            .price_at(&self.instrument, index)?
            .map_or(SignalValue::Undefined, SignalValue::Scalar))
    }
}

/// Emits a constant value.
pub struct ConstantSignal(pub f64);

impl Signal for ConstantSignal {
    fn name(&self) -> String {
        format!("CONST({})", self.0)
    }

    fn instruments(&self) -> Vec<String> {
        Vec::new()
    }

    fn compute(&self, _history: &History<'_>, _lookback: usize) -> Result<SignalValue, ExtensionError> {
        Ok(SignalValue::Scalar(self.0))
    }
}

/// Never leaves flat.
pub struct FlatStrategy;

impl Strategy for FlatStrategy {
    fn name(&self) -> String {
        "FLAT".into()
    }

    fn instruments(&self) -> Vec<String> {
        Vec::new()
    }

    fn decide(
        &self,
        _index: usize,
        _history: &History<'_>,
        _signal: &SignalValue,
        _current: &Position,
    ) -> Result<Position, ExtensionError> {
        Ok(Position::flat())
    }
}

/// Holds a fixed position on one instrument from the first decision on.
pub struct FixedStrategy {
    pub instrument: String,
    pub size: f64,
}

impl Strategy for FixedStrategy {
    fn name(&self) -> String {
        format!("FIXED({}, {})", self.instrument, self.size)
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.instrument.clone()]
    }

    fn decide(
        &self,
        _index: usize,
        _history: &History<'_>,
        _signal: &SignalValue,
        _current: &Position,
    ) -> Result<Position, ExtensionError> {
        Ok(Position::single(&self.instrument, self.size))
    }
}

/// Follows a per-bar schedule of sizes on one instrument; flat past its end.
pub struct ScheduledStrategy {
    pub instrument: String,
    pub sizes: Vec<f64>,
}

impl Strategy for ScheduledStrategy {
    fn name(&self) -> String {
        format!("SCHEDULED({})", self.instrument)
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.instrument.clone()]
    }

    fn decide(
        &self,
        index: usize,
        _history: &History<'_>,
        _signal: &SignalValue,
        _current: &Position,
    ) -> Result<Position, ExtensionError> {
        let size = self.sizes.get(index).copied().unwrap_or(0.0);
        Ok(Position::single(&self.instrument, size))
    }
}
