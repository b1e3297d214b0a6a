use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use device_adapter::DeviceShell;
use tracing::warn;
use walletforge_kernel::DiagnosticsCapture;

use crate::cli::context::CliContext;
use crate::cli::output::print_structured;

#[derive(Args, Clone, Debug)]
pub struct ScanArgs {
    /// Directory to write the capture under (defaults to <output_dir>/diagnostics)
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

pub async fn cmd_scan(args: ScanArgs, ctx: &CliContext) -> Result<()> {
    let root = args.out.unwrap_or_else(|| ctx.settings().diagnostics_dir());
    let shell = match ctx.adb() {
        Ok(shell) => Some(shell),
        Err(err) => {
            warn!(error = %err, "Scanning without the adb UI dump");
            None
        }
    };

    let session = ctx.open_session().await?;
    let result = DiagnosticsCapture::new(&root)
        .scan(&session, shell.as_ref().map(|s| s as &dyn DeviceShell))
        .await;
    session.close().await;
    let bundle = result.with_context(|| format!("Failed to write scan under {}", root.display()))?;

    if !ctx.output().is_human() {
        return print_structured(ctx.output(), &bundle);
    }
    println!("Scan written to {}", bundle.dir.display());
    println!("Surfaces:");
    for surface in &bundle.surfaces {
        println!("- {}", surface);
    }
    println!("Files:");
    for file in &bundle.files {
        let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        println!("- {}", name);
    }
    Ok(())
}
