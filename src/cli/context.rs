use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use device_adapter::{AdbShell, DeviceSession, DeviceShell};
use tracing::info;
use walletforge_kernel::{LocatorCatalog, Settings};
use walletforge_ledger::Ledger;

use super::output::OutputFormat;

pub struct CliContext {
    settings: Arc<Settings>,
    config_path: Option<PathBuf>,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(settings: Settings, config_path: Option<PathBuf>, output: OutputFormat) -> Self {
        Self {
            settings: Arc::new(settings),
            config_path,
            output,
        }
    }

    pub fn settings(&self) -> &Settings {
        self.settings.as_ref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    pub fn open_ledger(&self) -> Result<Ledger> {
        let ledger = &self.settings.ledger;
        Ledger::open_dir(&ledger.dir, &ledger.units_table, &ledger.links_table)
            .with_context(|| format!("Failed to open ledger in {}", ledger.dir.display()))
    }

    pub fn adb(&self) -> Result<AdbShell> {
        let device = &self.settings.device;
        AdbShell::locate(device.adb_path.as_deref(), device.udid.clone())
            .context("adb is required; install platform-tools or set device.adb_path")
    }

    pub fn shell(&self) -> Result<Arc<dyn DeviceShell>> {
        Ok(Arc::new(self.adb()?))
    }

    /// Built-in locators, with `app.locators_file` overrides when configured.
    pub fn locator_catalog(&self) -> Result<LocatorCatalog> {
        match &self.settings.app.locators_file {
            Some(path) => LocatorCatalog::load(path)
                .with_context(|| format!("Failed to load locators from {}", path.display())),
            None => Ok(LocatorCatalog::default()),
        }
    }

    pub async fn open_session(&self) -> Result<DeviceSession> {
        let config = self.settings.session_config()?;
        info!(
            endpoint = %config.endpoint,
            package = %config.app_package,
            "Opening automation session"
        );
        DeviceSession::open(&config)
            .await
            .with_context(|| format!("Failed to open session at {}", config.endpoint))
    }
}
