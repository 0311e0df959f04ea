//! Environment variables read by [`options_from_env`] and, with the
//! `tracing` feature, `LayerConfig::from_env`.
//!
//! These are purely helpers; handlers themselves never read the
//! environment.

use crate::handler::HandlerOptions;
use crate::level::{Level, ParseLevelError};

/// Minimum level, by name (`debug`, `info`, `notice`, `warning`, ...) or number.
pub const GCP_LOG_LEVEL_ENV: &str = "GCP_LOG_LEVEL";

/// Whether to write `logging.googleapis.com/sourceLocation` (`true`/`false`/`1`/`0`).
pub const GCP_LOG_ADD_SOURCE_ENV: &str = "GCP_LOG_ADD_SOURCE";

/// Whether tracing spans open a group named after the span.
pub const GCP_LOG_SPAN_GROUPS_ENV: &str = "GCP_LOG_SPAN_GROUPS";

/// Error returned when an environment variable holds an unusable value.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid {var}: {source}")]
    InvalidLevel {
        var: &'static str,
        #[source]
        source: ParseLevelError,
    },

    #[error("invalid {var}: expected true/false/1/0, got {value:?}")]
    InvalidBool { var: &'static str, value: String },
}

/// Build [`HandlerOptions`] from the process environment. Unset variables
/// keep their defaults; the replacement hook is never set.
pub fn options_from_env() -> Result<HandlerOptions, ConfigError> {
    options_from_lookup(|key| std::env::var(key).ok())
}

/// Like [`options_from_env`], reading variables through `lookup`.
pub fn options_from_lookup<F>(lookup: F) -> Result<HandlerOptions, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut opts = HandlerOptions::default();
    if let Some(level) = lookup(GCP_LOG_LEVEL_ENV) {
        opts.level = level
            .parse::<Level>()
            .map_err(|source| ConfigError::InvalidLevel { var: GCP_LOG_LEVEL_ENV, source })?;
    }
    if let Some(add_source) = bool_var(&lookup, GCP_LOG_ADD_SOURCE_ENV)? {
        opts.add_source = add_source;
    }
    Ok(opts)
}

pub(crate) fn bool_var<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(Some(true)),
        "false" | "0" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}
