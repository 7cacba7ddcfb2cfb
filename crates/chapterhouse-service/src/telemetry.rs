//! Tracing setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,chapterhouse=debug";

/// Install the global tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Calling it again
/// after a subscriber is installed does nothing, so tests may call it freely.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if installed.is_ok() {
        tracing::debug!("Tracing initialized");
    }
}
