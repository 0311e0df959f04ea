use crate::env::{bool_var, options_from_lookup, ConfigError, GCP_LOG_SPAN_GROUPS_ENV};
use crate::handler::{GcpHandler, HandlerOptions};
use crate::layer::GcpLayer;
use std::io::Write;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the tracing integration.
///
/// **Fields**
/// - `options`: [`HandlerOptions`] of the root handler (minimum level,
///   source location, replacement hook).
/// - `span_groups`: if `true`, every span opens a group named after it,
///   so span fields and event attributes are nested under the span name.
#[derive(Clone, Debug, Default)]
pub struct LayerConfig {
    pub options: HandlerOptions,
    pub span_groups: bool,
}

impl LayerConfig {
    /// Read the configuration from `GCP_LOG_LEVEL`, `GCP_LOG_ADD_SOURCE`
    /// and `GCP_LOG_SPAN_GROUPS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let options = options_from_lookup(&lookup)?;
        let span_groups = bool_var(&lookup, GCP_LOG_SPAN_GROUPS_ENV)?.unwrap_or(false);
        Ok(LayerConfig { options, span_groups })
    }

    /// Build the layer writing to `writer`.
    pub fn layer<W>(self, writer: W) -> GcpLayer
    where
        W: Write + Send + 'static,
    {
        GcpLayer::new(GcpHandler::new(writer, self.options)).with_span_groups(self.span_groups)
    }
}

/// Install a global `tracing` subscriber that writes Cloud Logging JSON
/// lines to `writer`, configured by `config`.
///
/// **Returns**
/// - `Err(..)` if a global default subscriber was already set.
pub fn init_tracing_with_config<W>(writer: W, config: LayerConfig) -> Result<(), SetGlobalDefaultError>
where
    W: Write + Send + 'static,
{
    let subscriber = Registry::default().with(config.layer(writer));
    tracing::subscriber::set_global_default(subscriber)
}

/// Install a global subscriber with [`LayerConfig::default`], e.g.
/// `init_tracing(std::io::stdout())` on Cloud Run.
pub fn init_tracing<W>(writer: W) -> Result<(), SetGlobalDefaultError>
where
    W: Write + Send + 'static,
{
    init_tracing_with_config(writer, LayerConfig::default())
}
