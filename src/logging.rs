use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info` overall, raised to `debug` for
/// this crate when `verbose` is on. Logs go to stderr so stdout stays free
/// for status rendering.
pub fn init(verbose: bool) {
    let default = if verbose { "info,sitepack=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}
