//! Tracing subscriber setup for the binary.

use std::error::Error;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "TOOLBRIDGE_LOG";
pub const DEFAULT_DIRECTIVES: &str = "warn";

/// Installs the global subscriber. Logs go to `log_file` when given (appended,
/// no ANSI colours), otherwise to stderr so they never mix with answers.
pub fn init(log_file: Option<&str>) -> Result<(), Box<dyn Error>> {
    let filter = env_filter(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| -> Box<dyn Error> { e })?;
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| -> Box<dyn Error> { e })?,
    }
    Ok(())
}

/// Picks the first non-blank directive set; invalid directives fall back to
/// the default level.
pub fn env_filter(primary: Option<String>, fallback: Option<String>) -> EnvFilter {
    let directives = primary
        .into_iter()
        .chain(fallback)
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}
