//! Logging and tracing initialization.
//!
//! The level is controlled through `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=keygate_core=debug,tower_http=debug,sqlx=warn keygate serve
//! ```
//!
//! The output format comes from [`LogFormat`] (`LOG_FORMAT` in the
//! environment): compact lines for local use, pretty multi-line output while
//! debugging, JSON for log aggregation.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Initialize the global tracing subscriber.
///
/// Call once at process start. A second call is ignored instead of panicking
/// so CLI subcommands can share the entry point.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialised");
    }
}
