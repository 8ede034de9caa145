use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Installs the global subscriber. Defaults to `info` when RUST_LOG is not set.
pub fn init(log_json: bool, log_perf: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    let builder = if log_perf {
        builder.with_span_events(FmtSpan::CLOSE)
    } else {
        builder
    };

    if log_json {
        builder.json().init();
    } else {
        builder.init();
    };
}
