//! Tracing setup for hosts that do not install their own subscriber

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to
/// `change_governance=info`. Does nothing if a global subscriber exists.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "change_governance=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
