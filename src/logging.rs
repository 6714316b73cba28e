use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Sets up the tracing subscriber for applications embedding this client.
///
/// Honors `RUST_LOG` when set; otherwise defaults to `info` for this crate.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("opentsdb_client=info"));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();
}
