//! CSV file data adapter.
//!
//! One file per instrument, `<base>/<instrument>.csv`, with a header row. The
//! first column is the date; the price column is the first header named
//! `Price`, `Close` or `Last` (case-insensitive), falling back to the second
//! column. Empty, `NaN` and `null` cells are gaps.

use crate::domain::error::BacktestError;
use crate::domain::price_series::{PricePoint, PriceSeries};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];
const PRICE_HEADERS: &[&str] = &["price", "close", "last"];
const GAP_MARKERS: &[&str] = &["", "nan", "null", "na"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{instrument}.csv"))
    }
}

fn invalid(instrument: &str, reason: String) -> BacktestError {
    BacktestError::InvalidSeries {
        instrument: instrument.to_string(),
        reason,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
}

fn parse_price(instrument: &str, raw: &str, line: usize) -> Result<Option<f64>, BacktestError> {
    let trimmed = raw.trim();
    if GAP_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
        return Ok(None);
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|e| invalid(instrument, format!("line {line}: invalid price '{trimmed}': {e}")))?;
    Ok(Some(value))
}

impl DataPort for CsvAdapter {
    fn fetch_series(&self, instrument: &str) -> Result<PriceSeries, BacktestError> {
        let path = self.csv_path(instrument);
        let content = fs::read_to_string(&path).map_err(|e| BacktestError::Csv {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = rdr.headers()?.clone();
        if headers.len() < 2 {
            return Err(invalid(
                instrument,
                "expected a date column and a price column".into(),
            ));
        }
        let price_col = headers
            .iter()
            .position(|h| PRICE_HEADERS.contains(&h.to_lowercase().as_str()))
            .unwrap_or(1);

        let mut points = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            // header is line 1
            let line = i + 2;
            let record = result?;

            let date_str = record
                .get(0)
                .ok_or_else(|| invalid(instrument, format!("line {line}: missing date")))?;
            let date = parse_date(date_str).ok_or_else(|| {
                invalid(instrument, format!("line {line}: invalid date '{date_str}'"))
            })?;

            let price = parse_price(instrument, record.get(price_col).unwrap_or(""), line)?;
            points.push(PricePoint { date, price });
        }

        debug!(
            instrument,
            path = %path.display(),
            rows = points.len(),
            "loaded price series"
        );
        PriceSeries::new(instrument, points)
    }

    fn list_instruments(&self) -> Result<Vec<String>, BacktestError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| BacktestError::Csv {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut instruments = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == "csv") {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                instruments.push(stem.to_string_lossy().into_owned());
            }
        }

        instruments.sort();
        Ok(instruments)
    }
}
