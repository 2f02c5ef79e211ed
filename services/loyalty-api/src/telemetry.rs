use crate::config::LogConfig;
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, registry::LookupSpan, EnvFilter, Layer};

/// Open the activity log for appending, creating it if missing
pub fn open_activity_log(path: &str) -> std::io::Result<Mutex<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Mutex::new(file))
}

/// JSON layer writing every event to the activity log file
pub fn activity_layer<S>(path: &str) -> std::io::Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    Ok(fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_writer(open_activity_log(path)?))
}

/// Install stdout JSON logging, plus the activity log file when configured
pub fn init_tracing(config: &LogConfig) -> std::io::Result<()> {
    let activity = match &config.activity_file {
        Some(path) => Some(activity_layer(path)?),
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)))
        .with(fmt::layer().json().with_target(true))
        .with(activity)
        .init();

    Ok(())
}
