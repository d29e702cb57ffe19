use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, Settings};

/// Install the global subscriber.
///
/// Filtering follows `RUST_LOG` (default `info`). When `log_dir` is set a daily
/// rotated file receives the same events; keep the returned guard alive until
/// shutdown so buffered lines get flushed.
pub fn init(settings: &Settings) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let stdout = match settings.log_format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let (file, guard) = match settings.log_dir.as_deref() {
        Some(dir) => {
            let (layer, guard) = file_layer(dir);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .try_init()?;

    Ok(guard)
}

fn file_layer<S>(dir: &Path) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(dir, "harp_environment.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer().json().with_writer(writer).with_ansi(false).boxed();
    (layer, guard)
}
