use anyhow::{Context, Result};
use device_adapter::DeviceShell;
use serde::Serialize;

use crate::cli::context::CliContext;
use crate::cli::output::print_structured;

#[derive(Serialize)]
struct SmokeReport {
    version: &'static str,
    build_date: &'static str,
    git_hash: &'static str,
    adb: String,
    devices: Vec<String>,
    endpoint: String,
    surfaces: Vec<String>,
}

/// Connectivity check: adb sees a device, a session opens and reports its surfaces.
pub async fn cmd_test(ctx: &CliContext) -> Result<()> {
    let settings = ctx.settings();
    let adb = ctx.adb()?;
    let devices = adb
        .list_connected_devices()
        .context("Failed to list devices")?;
    if devices.is_empty() {
        anyhow::bail!("adb reports no connected devices");
    }
    if let Some(udid) = &settings.device.udid {
        if !devices.contains(udid) {
            anyhow::bail!(
                "configured device {} is not connected (found: {})",
                udid,
                devices.join(", ")
            );
        }
    }

    let session = ctx.open_session().await?;
    let surfaces = session.list_surfaces().await;
    session.close().await;
    let surfaces = surfaces.context("Session opened but listing surfaces failed")?;

    let report = SmokeReport {
        version: env!("CARGO_PKG_VERSION"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        adb: adb.binary().display().to_string(),
        devices,
        endpoint: settings.device.endpoint.clone(),
        surfaces: surfaces.iter().map(ToString::to_string).collect(),
    };
    if !ctx.output().is_human() {
        return print_structured(ctx.output(), &report);
    }

    println!("WalletForge Connectivity Check");
    println!("==============================");
    println!("Version: {}", report.version);
    println!("Build Date: {}", report.build_date);
    println!("Git Commit: {}", report.git_hash);
    println!();
    println!("adb: {}", report.adb);
    for device in &report.devices {
        println!("- device {} ✓", device);
    }
    println!("Session: {} ✓", report.endpoint);
    for surface in &report.surfaces {
        println!("- surface {}", surface);
    }
    Ok(())
}
