//! Tracing subscriber setup
//!
//! Two sinks: a rolling file under `log_dir` (non-blocking) and stdout.
//! With `use_json` both sinks emit JSON lines; otherwise the file gets plain
//! text and stdout gets ANSI colored text.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Crates that are too chatty at the application level
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "hyper=warn", "reqwest=warn"];

fn rotation(name: &str) -> Rotation {
    match name {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// `RUST_LOG` wins over the configured level
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = std::iter::once(level)
            .chain(QUIET_TARGETS.iter().copied())
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::new(directives)
    })
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> Result<WorkerGuard, TryInitError> {
    let appender = RollingFileAppender::new(
        rotation(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let registry = tracing_subscriber::registry().with(log_filter(&config.log_level));

    if config.use_json {
        registry
            .with(fmt::layer().json().with_writer(file_writer))
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(file_writer),
            )
            .with(fmt::layer().with_target(false).with_ansi(true))
            .try_init()?;
    }

    tracing::debug!(
        log_dir = %config.log_dir,
        log_file = %config.log_file,
        json = config.use_json,
        "logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("hourly"), Rotation::HOURLY);
        assert_eq!(rotation("daily"), Rotation::DAILY);
        assert_eq!(rotation("minutely"), Rotation::MINUTELY);
        assert_eq!(rotation("weekly"), Rotation::NEVER);
    }

    #[test]
    fn test_log_filter_quiets_dependencies() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = log_filter("debug").to_string();
        assert!(filter.contains("debug"));
        for target in QUIET_TARGETS {
            assert!(filter.contains(target), "{} missing from {}", target, filter);
        }
    }
}
