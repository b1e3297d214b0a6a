use std::fs;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use walletforge_kernel::SUMMARY_FILE;
use walletforge_ledger::LedgerSummary;

use crate::cli::context::CliContext;
use crate::cli::output::print_structured;

#[derive(Serialize)]
struct StatusReport {
    ledger_dir: String,
    #[serde(flatten)]
    summary: LedgerSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<Value>,
}

pub async fn cmd_status(ctx: &CliContext) -> Result<()> {
    let settings = ctx.settings();
    let ledger = ctx.open_ledger()?;
    let summary = ledger.summary().context("Failed to read ledger")?;

    let summary_path = settings.ledger.dir.join(SUMMARY_FILE);
    let last_run = match fs::read_to_string(&summary_path) {
        Ok(raw) => Some(
            serde_json::from_str::<Value>(&raw)
                .with_context(|| format!("Corrupt run summary {}", summary_path.display()))?,
        ),
        Err(_) => None,
    };

    let report = StatusReport {
        ledger_dir: settings.ledger.dir.display().to_string(),
        summary,
        last_run,
    };
    if !ctx.output().is_human() {
        return print_structured(ctx.output(), &report);
    }

    let s = &report.summary;
    println!("WalletForge Ledger");
    println!("==================");
    println!(
        "Config: {}",
        ctx.config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string())
    );
    println!("Directory: {}", report.ledger_dir);
    println!("Units: {}", s.total);
    println!("- pending: {}", s.pending);
    println!("- success: {}", s.success);
    println!("- failed: {}", s.failed);
    println!("- skipped: {}", s.skipped);
    println!("Next resume id: {}", s.next_id);
    println!("Links: {}", s.links);
    if let Some(run) = &report.last_run {
        let field = |key: &str| run.get(key).and_then(Value::as_str).unwrap_or("n/a").to_string();
        println!();
        println!(
            "Last run: {} mode={} status={} finished={} elapsed={}",
            field("run_id"),
            field("mode"),
            field("status"),
            field("finished_at"),
            field("elapsed")
        );
        if let Some(reason) = run.get("abort_reason").and_then(Value::as_str) {
            println!("- abort reason: {}", reason);
        }
    }
    Ok(())
}
