use tracing_subscriber::{fmt, EnvFilter};

/// Output shape of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    #[default]
    Human,
    Json,
}

impl LogStyle {
    /// `"json"` selects JSON lines; anything else is human-readable.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            LogStyle::Json
        } else {
            LogStyle::Human
        }
    }
}

/// Install a subscriber in the requested style.
///
/// `RUST_LOG` wins over `default_level` (e.g. "debug", "am_session=trace,info").
/// Safe to call multiple times; later calls are no-ops.
pub fn init(service_name: &str, default_level: &str, style: LogStyle) {
    match style {
        LogStyle::Human => init_logging(service_name, default_level),
        LogStyle::Json => init_logging_json(service_name, default_level),
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging with human-readable output format.
pub fn init_logging(service_name: &str, default_level: &str) {
    fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (human-readable)");
}

/// Initialize logging with JSON output (one object per line).
pub fn init_logging_json(service_name: &str, default_level: &str) {
    fmt()
        .json()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_current_span(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (json)");
}
