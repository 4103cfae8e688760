use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging.
///
/// - `tracing-subscriber::fmt` writes compact lines to stderr so command
///   output on stdout stays clean.
/// - `EnvFilter` honours `RUST_LOG`, defaulting to `info,esce_session=debug`
///   when `verbose` is set and `warn` otherwise.
pub fn init(verbose: bool) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .compact();

    let default_filter = if verbose {
        "info,esce_session=debug"
    } else {
        "warn"
    };
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
