//! Layered run settings: defaults, then YAML file, then `WALLETFORGE__*` environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use action_flow::{DelayRange, Pacing, RetryPolicy};
use config::{Config as ConfigLoader, Environment, File, FileFormat};
use device_adapter::SessionConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "WALLETFORGE";
pub const LOCAL_CONFIG: &str = "config/walletforge.yaml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Upper bound for every configured timeout and delay.
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

fn invalid(key: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSettings,
    pub app: AppSettings,
    pub timing: TimingSettings,
    pub retry: RetrySettings,
    pub ledger: LedgerSettings,
    pub run: RunSettings,
    pub claim: ClaimSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub endpoint: String,
    pub udid: Option<String>,
    pub platform_name: String,
    pub automation_name: String,
    pub new_command_timeout_secs: u64,
    pub request_timeout_ms: u64,
    /// Explicit adb binary; `PATH` is searched when unset.
    pub adb_path: Option<PathBuf>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:4723".to_string(),
            udid: None,
            platform_name: "Android".to_string(),
            automation_name: "UiAutomator2".to_string(),
            new_command_timeout_secs: 300,
            request_timeout_ms: 60_000,
            adb_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub package: String,
    pub activity: Option<String>,
    /// YAML file with locator lists that override the built-in catalog.
    pub locators_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub element_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub completion_timeout_ms: u64,
    pub surface_timeout_ms: u64,
    pub min_action_delay_ms: u64,
    pub max_action_delay_ms: u64,
    pub min_unit_delay_ms: u64,
    pub max_unit_delay_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            element_timeout_ms: 10_000,
            poll_interval_ms: 500,
            completion_timeout_ms: 60_000,
            surface_timeout_ms: 30_000,
            min_action_delay_ms: 800,
            max_action_delay_ms: 2_000,
            min_unit_delay_ms: 3_000,
            max_unit_delay_ms: 8_000,
        }
    }
}

impl TimingSettings {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    pub fn surface_timeout(&self) -> Duration {
        Duration::from_millis(self.surface_timeout_ms)
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::new(
            DelayRange::new(self.min_action_delay_ms, self.max_action_delay_ms),
            DelayRange::new(self.min_unit_delay_ms, self.max_unit_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub dir: PathBuf,
    pub units_table: String,
    pub links_table: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./walletforge-data"),
            units_table: "units".to_string(),
            links_table: "links".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeKind {
    #[default]
    Create,
    Claim,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub mode: ModeKind,
    /// Total number of wallets the create mode works towards.
    pub target_total: u32,
    pub relaunch_between_units: bool,
    pub output_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: ModeKind::Create,
            target_total: 10,
            relaunch_between_units: true,
            output_dir: PathBuf::from("./walletforge-output"),
        }
    }
}

/// What a claim unit gets when there are fewer links than units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkFallback {
    /// Mark the unit skipped.
    #[default]
    Skip,
    /// Reuse the first link for every unit without one.
    ReuseFirst,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimSettings {
    pub link_fallback: LinkFallback,
    pub include_failed: bool,
}

/// Settings plus the file they were read from, if any.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub source: Option<PathBuf>,
}

impl Settings {
    /// Resolve the config file (`explicit`, then `./config/walletforge.yaml`,
    /// then the user config dir) and layer environment overrides on top.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedSettings, SettingsError> {
        let source = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => return Err(SettingsError::MissingFile(path.to_path_buf())),
            None => default_config_path(),
        };

        let mut builder =
            ConfigLoader::builder().add_source(ConfigLoader::try_from(&Settings::default())?);
        if let Some(path) = &source {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Yaml));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        match &source {
            Some(path) => info!(path = %path.display(), "Loaded settings"),
            None => debug!("No config file found, using defaults and environment"),
        }
        Ok(LoadedSettings { settings, source })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let t = &self.timing;
        for (key, value) in [
            ("timing.element_timeout_ms", t.element_timeout_ms),
            ("timing.poll_interval_ms", t.poll_interval_ms),
            ("timing.completion_timeout_ms", t.completion_timeout_ms),
            ("timing.surface_timeout_ms", t.surface_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        for (key, value) in [
            ("timing.element_timeout_ms", t.element_timeout_ms),
            ("timing.poll_interval_ms", t.poll_interval_ms),
            ("timing.completion_timeout_ms", t.completion_timeout_ms),
            ("timing.surface_timeout_ms", t.surface_timeout_ms),
            ("timing.max_action_delay_ms", t.max_action_delay_ms),
            ("timing.max_unit_delay_ms", t.max_unit_delay_ms),
            ("retry.max_delay_ms", self.retry.max_delay_ms),
            ("device.request_timeout_ms", self.device.request_timeout_ms),
        ] {
            if value > MAX_DURATION_MS {
                return Err(invalid(key, format!("must not exceed {MAX_DURATION_MS} (24h)")));
            }
        }
        if t.min_action_delay_ms > t.max_action_delay_ms {
            return Err(invalid(
                "timing.min_action_delay_ms",
                "must not exceed timing.max_action_delay_ms",
            ));
        }
        if t.min_unit_delay_ms > t.max_unit_delay_ms {
            return Err(invalid(
                "timing.min_unit_delay_ms",
                "must not exceed timing.max_unit_delay_ms",
            ));
        }
        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(invalid("retry.backoff_multiplier", "must be at least 1.0"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.ledger.units_table.trim().is_empty() || self.ledger.links_table.trim().is_empty() {
            return Err(invalid("ledger", "table names must not be empty"));
        }
        if self.ledger.units_table == self.ledger.links_table {
            return Err(invalid("ledger", "units and links tables must differ"));
        }
        let endpoint = &self.device.endpoint;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(invalid("device.endpoint", "must be an http(s) URL"));
        }
        Ok(())
    }

    /// Session parameters; fails when no app package is configured.
    pub fn session_config(&self) -> Result<SessionConfig, SettingsError> {
        if self.app.package.trim().is_empty() {
            return Err(invalid("app.package", "required to open a session"));
        }
        Ok(SessionConfig {
            endpoint: self.device.endpoint.clone(),
            platform_name: self.device.platform_name.clone(),
            automation_name: self.device.automation_name.clone(),
            udid: self.device.udid.clone(),
            app_package: self.app.package.clone(),
            app_activity: self.app.activity.clone(),
            no_reset: true,
            new_command_timeout_secs: self.device.new_command_timeout_secs,
            request_timeout_ms: self.device.request_timeout_ms,
            ..Default::default()
        })
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.run.output_dir.join("diagnostics")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.run.output_dir.join("logs")
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("walletforge").join("config.yaml");
    user.exists().then_some(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    #[serial]
    fn yaml_then_env_layering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("walletforge.yaml");
        fs::write(
            &path,
            "app:\n  package: com.example.wallet\ntiming:\n  element_timeout_ms: 2500\nclaim:\n  link_fallback: reuse-first\n",
        )
        .unwrap();

        env::set_var("WALLETFORGE__TIMING__POLL_INTERVAL_MS", "125");
        let loaded = Settings::load(Some(&path));
        env::remove_var("WALLETFORGE__TIMING__POLL_INTERVAL_MS");
        let loaded = loaded.unwrap();

        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
        let settings = loaded.settings;
        assert_eq!(settings.app.package, "com.example.wallet");
        assert_eq!(settings.timing.element_timeout_ms, 2500);
        assert_eq!(settings.timing.poll_interval_ms, 125);
        assert_eq!(settings.timing.completion_timeout_ms, 60_000);
        assert_eq!(settings.claim.link_fallback, LinkFallback::ReuseFirst);
    }

    #[test]
    #[serial]
    fn explicit_missing_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/walletforge.yaml"))).unwrap_err();
        assert!(matches!(err, SettingsError::MissingFile(_)));
    }

    #[test]
    fn rejects_inverted_delays_and_small_multiplier() {
        let mut settings = Settings::default();
        settings.timing.min_unit_delay_ms = 10_000;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retry.backoff_multiplier = 0.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.timing.element_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_timeouts_beyond_a_day() {
        let mut settings = Settings::default();
        settings.timing.completion_timeout_ms = u64::MAX;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid {
                key: "timing.completion_timeout_ms",
                ..
            })
        ));

        let mut settings = Settings::default();
        settings.timing.surface_timeout_ms = MAX_DURATION_MS;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn session_config_requires_package() {
        let mut settings = Settings::default();
        assert!(settings.session_config().is_err());
        settings.app.package = "com.example.wallet".into();
        settings.device.udid = Some("emulator-5554".into());
        let session = settings.session_config().unwrap();
        assert_eq!(session.udid.as_deref(), Some("emulator-5554"));
        assert_eq!(session.app_package, "com.example.wallet");
    }
}
