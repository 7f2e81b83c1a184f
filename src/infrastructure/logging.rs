use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::{CacheConfig, LogFormat};

/// Initialize structured logging for the cache.
///
/// The cache is a library, so this stays host-friendly: `RUST_LOG` wins
/// when set, otherwise the configured level is applied to this crate's
/// events only, and an already-installed global subscriber is left in
/// place (the cache then logs through whatever the host set up). Use
/// [`observability::init_tracing`](super::observability::init_tracing)
/// instead when span export is wanted.
pub fn init_logging(config: &CacheConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), config.log_level))
    });

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    match tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => tracing::info!(
            level = %config.log_level,
            "Cache logging initialized"
        ),
        Err(_) => tracing::debug!(
            "A global subscriber is already installed, reusing host logging"
        ),
    }
}
