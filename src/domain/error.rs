//! Domain error types.

use chrono::NaiveDate;

/// Error raised by a user-supplied [`Signal`](crate::domain::signal::Signal) or
/// [`Strategy`](crate::domain::strategy::Strategy).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtensionError {
    /// The extension asked a [`History`](crate::domain::history::History) for a
    /// bar after the one being evaluated.
    #[error("requested bar {requested} while evaluating bar {current}")]
    LookAhead { requested: usize, current: usize },

    #[error("{0}")]
    Failed(String),
}

impl ExtensionError {
    pub fn failed(reason: impl Into<String>) -> Self {
        ExtensionError::Failed(reason.into())
    }
}

/// Top-level error type for barlag.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid price series {instrument}: {reason}")]
    InvalidSeries { instrument: String, reason: String },

    #[error("causality violation in {component} at bar {index}: requested bar {requested}")]
    CausalityViolation {
        component: String,
        index: usize,
        requested: usize,
    },

    #[error("{component} failed at bar {index} ({date}): {reason}")]
    RuntimeExtension {
        component: String,
        index: usize,
        date: NaiveDate,
        reason: String,
    },

    #[error("csv error: {reason}")]
    Csv { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BacktestError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        BacktestError::Configuration {
            reason: reason.into(),
        }
    }

    /// Wrap an extension failure at `index`, naming the component that raised it.
    pub fn from_extension(
        err: ExtensionError,
        component: &str,
        index: usize,
        date: NaiveDate,
    ) -> Self {
        match err {
            ExtensionError::LookAhead { requested, .. } => BacktestError::CausalityViolation {
                component: component.to_string(),
                index,
                requested,
            },
            ExtensionError::Failed(reason) => BacktestError::RuntimeExtension {
                component: component.to_string(),
                index,
                date,
                reason,
            },
        }
    }
}

impl From<csv::Error> for BacktestError {
    fn from(err: csv::Error) -> Self {
        BacktestError::Csv {
            reason: err.to_string(),
        }
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        let code: u8 = match err {
            BacktestError::Io(_) | BacktestError::Csv { .. } => 1,
            BacktestError::Configuration { .. }
            | BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::ConfigInvalid { .. } => 2,
            BacktestError::InvalidSeries { .. } => 3,
            BacktestError::CausalityViolation { .. } | BacktestError::RuntimeExtension { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
