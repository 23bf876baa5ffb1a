use anyhow::anyhow;
use tracing_subscriber::filter::LevelFilter;

use crate::configs::{LogFormat, LoggingSettings};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global subscriber. Output goes to stderr so stdout stays free
/// for the tools' own output.
pub fn init(
    settings: &LoggingSettings,
    cli_level_override: Option<&str>,
    cli_format_override: Option<LogFormat>,
) -> anyhow::Result<()> {
    let log_level = resolve_log_level(settings, cli_level_override)?;

    match resolve_log_format(settings, cli_format_override) {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .pretty()
            .try_init(),
    }
    .map_err(|err| anyhow!("initialize logging subscriber: {err}"))?;

    Ok(())
}

fn resolve_log_level(
    settings: &LoggingSettings,
    cli_level_override: Option<&str>,
) -> anyhow::Result<LevelFilter> {
    let raw_level = cli_level_override
        .or(settings.level.as_deref())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    let normalized = raw_level.trim().to_ascii_lowercase();

    normalized.parse::<LevelFilter>().map_err(|_| {
        anyhow!(
            "invalid log level `{raw_level}`; expected one of trace, debug, info, warn, error, off"
        )
    })
}

fn resolve_log_format(settings: &LoggingSettings, cli_format_override: Option<LogFormat>) -> LogFormat {
    cli_format_override
        .or(settings.format)
        .unwrap_or(LogFormat::Pretty)
}
