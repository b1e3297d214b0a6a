use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use walletforge_kernel::{LoadedSettings, Settings};

const LOCAL_ENV: &str = "config/local.env";
const LOG_FILE_PREFIX: &str = "walletforge.log";

/// Copy `KEY=value` pairs from `config/local.env` into the environment.
/// Variables that are already set win.
pub fn load_local_env_overrides() -> Option<PathBuf> {
    let path = Path::new(LOCAL_ENV);
    if !path.exists() {
        return None;
    }

    match stdfs::read_to_string(path) {
        Ok(contents) => {
            for (idx, raw_line) in contents.lines().enumerate() {
                let line = raw_line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let Some((key, value)) = line.split_once('=') else {
                    eprintln!("{}:{}: invalid entry, skipping", path.display(), idx + 1);
                    continue;
                };
                let key = key.trim();
                if key.is_empty() || env::var(key).is_ok() {
                    continue;
                }
                env::set_var(key, unescape_value(value.trim()));
            }
            Some(path.to_path_buf())
        }
        Err(err) => {
            eprintln!("failed to read {}: {err}", path.display());
            None
        }
    }
}

/// Human layer on stderr plus, when `log_dir` is given, a daily rolling JSON
/// file. The returned guard must live until the process exits.
pub fn init_logging(
    level: &str,
    debug: bool,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            stdfs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

pub fn load_settings(config_path: Option<&Path>) -> Result<LoadedSettings> {
    let loaded = Settings::load(config_path).context("Failed to load settings")?;
    loaded
        .settings
        .validate()
        .context("Invalid settings")?;
    Ok(loaded)
}

pub fn log_settings_source(loaded: &LoadedSettings, local_env: Option<&Path>) {
    if let Some(path) = local_env {
        info!(path = %path.display(), "Loaded environment overrides from local.env");
    }
    match &loaded.source {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => warn!("No config file found, using defaults and environment"),
    }
}

fn unescape_value(value: &str) -> String {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        let inner = &value[1..value.len() - 1];
        inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\t", "\t")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_values_are_unescaped() {
        assert_eq!(unescape_value("\"a\\tb\""), "a\tb");
        assert_eq!(unescape_value("plain"), "plain");
        assert_eq!(unescape_value("\""), "\"");
    }
}
