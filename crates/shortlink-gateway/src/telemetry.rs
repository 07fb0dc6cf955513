use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing::Subscriber;
use tracing_log::log_tracer::SetLoggerError;
use tracing_log::LogTracer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LogFormat;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to set global logger: {0}")]
    SetLogger(#[from] SetLoggerError),
    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] SetGlobalDefaultError),
}

pub fn build_json_subscriber<Sink>(
    env_filter: impl AsRef<str>,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let formatting_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(sink);

    layered_subscriber_with_env_filter(env_filter).with(formatting_layer)
}

pub fn build_plain_subscriber<Sink>(
    env_filter: impl AsRef<str>,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(sink);

    layered_subscriber_with_env_filter(env_filter).with(formatting_layer)
}

/// Installs `subscriber` globally and routes `log` records into it.
pub fn try_init_subscriber(
    subscriber: impl Subscriber + Send + Sync + 'static,
) -> Result<(), TelemetryError> {
    LogTracer::init()?;
    set_global_default(subscriber)?;
    Ok(())
}

/// Installs the subscriber matching `format`, writing to stdout.
pub fn init(format: LogFormat) -> Result<(), TelemetryError> {
    match format {
        LogFormat::Json => try_init_subscriber(build_json_subscriber(DEFAULT_FILTER, std::io::stdout)),
        LogFormat::Plain => {
            try_init_subscriber(build_plain_subscriber(DEFAULT_FILTER, std::io::stdout))
        }
    }
}

fn layered_subscriber_with_env_filter(env_filter: impl AsRef<str>) -> Layered<EnvFilter, Registry> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));
    Registry::default().with(env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn json_subscriber_emits_json_lines() {
        let buffer = Buffer::default();
        let subscriber = build_json_subscriber("info", buffer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(code = "KJYUS", "stored record");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(line["fields"]["code"], "KJYUS");
        assert_eq!(line["fields"]["message"], "stored record");
    }
}
