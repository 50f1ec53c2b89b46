use super::config::LogLevel;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("Failed to install global subscriber: {0}")]
    InitFailed(#[from] tracing_subscriber::util::TryInitError),
}

// HTTP stack crates are noisy at debug level
const PINNED_DIRECTIVES: &[&str] = &["hyper=warn", "reqwest=warn", "h2=warn", "rustls=warn"];

/// Filter directives for `level`, with the HTTP stack kept at warn.
pub fn build_filter_string(level: LogLevel) -> String {
    let mut parts = Vec::with_capacity(PINNED_DIRECTIVES.len() + 1);
    parts.push(level.as_str());
    parts.extend_from_slice(PINNED_DIRECTIVES);
    parts.join(",")
}

/// Install the global tracing subscriber. `RUST_LOG`, when set, wins over
/// `level`.
pub fn init_logging(level: LogLevel, json: bool) -> Result<(), LoggingError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => directives,
        _ => build_filter_string(level),
    };
    let env_filter = EnvFilter::try_new(&filter).map_err(|source| LoggingError::InvalidFilter {
        filter: filter.clone(),
        source,
    })?;

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
    });
    let compact_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(compact_layer)
        .try_init()?;

    Ok(())
}
