use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber. `RUST_LOG` wins over the given default.
pub fn init_tracing(default_filter: &str) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
