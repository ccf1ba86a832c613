use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

type Sink = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the process-wide subscriber: one output sink behind the level filter.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = mk_filter(&cfg.level)?;
    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInitialized);
    }
    let sink = sink(cfg)?;
    tracing_subscriber::registry()
        .with(sink.with_filter(filter))
        .try_init()
        .map_err(|e| LoggerError::InitializationFailed(e.to_string()))
}

pub(crate) fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn sink(cfg: &LoggerConfig) -> Result<Sink, LoggerError> {
    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        Rfc3339,
    );
    Ok(match cfg.format {
        LoggerFormat::Text => fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(timer)
            .boxed(),
        // Component and run ids live on the command spans, so JSON lines carry the span stack.
        LoggerFormat::Json => fmt::layer()
            .json()
            .with_target(cfg.with_targets)
            .with_current_span(true)
            .with_span_list(true)
            .with_timer(timer)
            .boxed(),
        LoggerFormat::Journald => journald()?,
    })
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald() -> Result<Sink, LoggerError> {
    tracing_journald::layer()
        .map(|layer| layer.with_syslog_identifier("astra".to_string()).boxed())
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald() -> Result<Sink, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}
