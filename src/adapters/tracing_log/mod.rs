// Tracing log adapter - Structured logging using tracing crate

use tracing_subscriber::EnvFilter;

use crate::adapters::toml_config::LoggingSettings;
use crate::error::{VidpressError, VidpressResult};

/// Installs the global tracing subscriber
pub struct TracingLogAdapter;

impl TracingLogAdapter {
    /// Build the filter: `RUST_LOG` wins, else the configured level for this
    /// crate with everything else at `warn`.
    pub fn filter(settings: &LoggingSettings) -> VidpressResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directive = format!("warn,vidpress_cli={level},vidpress={level}", level = settings.level.to_lowercase());
        EnvFilter::try_new(&directive)
            .map_err(|err| VidpressError::invalid_config(format!("log filter '{}': {}", directive, err)))
    }

    /// Initialize the subscriber. Logs go to stderr so stdout stays free for
    /// command output. A second call is a no-op.
    pub fn init(settings: &LoggingSettings) -> VidpressResult<()> {
        let filter = Self::filter(settings)?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false);

        // try_init fails only when a subscriber is already installed
        let _ = if settings.json {
            builder.json().with_current_span(false).try_init()
        } else {
            builder.compact().try_init()
        };
        Ok(())
    }
}
