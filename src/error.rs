use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Failures at the refresh boundary; the computation core itself does not fail
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{what} did not resolve within {after:?}")]
    Timeout { what: &'static str, after: Duration },

    #[error("invalid period: {start} is not before {end}")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("provider error: {0}")]
    Provider(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration load failed: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("configuration invalid: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("unknown time zone: {0}")]
    TimeZone(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
