use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ServiceConfig;
use crate::error::GleanerError;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `service.log_level`. Returns an error if a
/// global subscriber is already set, so repeated calls from tests are harmless.
pub fn init_tracing(config: &ServiceConfig) -> Result<(), GleanerError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            GleanerError::Tracing(format!("invalid log level {:?}: {}", config.log_level, e))
        })?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| GleanerError::Tracing(e.to_string()))
}
