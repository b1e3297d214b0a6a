use anyhow::Result;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_local_env_overrides, load_settings, log_settings_source};

pub async fn run(cli: CliArgs) -> Result<()> {
    let local_env = load_local_env_overrides();
    let loaded = load_settings(cli.config.as_deref())?;
    let _log_guard = init_logging(&cli.log_level, cli.debug, Some(&loaded.settings.logs_dir()))?;

    info!("Starting WalletForge v{}", env!("CARGO_PKG_VERSION"));
    log_settings_source(&loaded, local_env.as_deref());

    let cli_context = CliContext::new(loaded.settings, loaded.source, cli.output);

    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
