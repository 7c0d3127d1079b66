//! Tracing setup.
//!
//! All tracing output goes to stderr: stdout is the channel once stdio is
//! redirected. The default level is `warn` so that the handshake's own
//! diagnostic lines are what an operator sees on stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const ENV_LOG: &str = "DUPLEX_LOG";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Filter directive for a `DUPLEX_LOG` value when `RUST_LOG` is unset.
pub fn filter_directive(level: Option<&str>) -> String {
    let level = match level {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("error") => "error",
        _ => "warn",
    };
    format!("duplex={level}")
}

/// Initialize tracing with DUPLEX_LOG, RUST_LOG and LOG_FORMAT support.
///
/// Call once, before the process splits, so both roles share the subscriber.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directive(std::env::var(ENV_LOG).ok().as_deref()))
    };

    let use_json = std::env::var(ENV_LOG_FORMAT).as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}
