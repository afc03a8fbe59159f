//! Core domain types and logic.

pub mod price_series;
pub mod history;
pub mod position;
pub mod stats;
pub mod signal;
pub mod strategy;
pub mod backtest;
pub mod tracker;
pub mod sweep;
pub mod config_validation;
pub mod error;
