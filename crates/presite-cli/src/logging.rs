use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const FILTER_ENV: &str = "PRESITE_LOG";
const FORMAT_ENV: &str = "PRESITE_LOG_FORMAT";
const DEFAULT_FILTER: &str = "presite=info";

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// the command output. A second call is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);

    let _ = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };
}
