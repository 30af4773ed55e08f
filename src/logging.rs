//! Process-wide tracing setup. Only the binary calls [`init`] — library code
//! (everything under `crate::task`, `crate::report`, etc.) only ever emits
//! `tracing` events and never installs a subscriber itself. Grounded in
//! masterror's `axum-rest-api` example (`registry().with(EnvFilter).with(
//! layer()).init()`), generalized from a fixed `"info"` fallback to one
//! configurable by the caller.

use tracing_subscriber::{fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a `tracing_subscriber` registry reading `RUST_LOG`, falling back
/// to `default_filter` (e.g. `"info"`) when it is unset or unparsable.
/// Panics if a subscriber has already been installed in this process —
/// calling this twice is a programmer error, not a runtime condition.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
    tracing_subscriber::registry()
        .with(filter)
        .with(layer())
        .try_init()
        .expect("tracing subscriber already installed");
}
