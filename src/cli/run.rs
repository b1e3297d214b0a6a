use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use device_adapter::DeviceSession;
use tracing::info;
use walletforge_kernel::settings::LinkFallback;
use walletforge_kernel::{ModeKind, Orchestrator, RunMode, RunStatus, RunSummary};

use crate::cli::context::CliContext;
use crate::cli::output::print_structured;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    Create,
    Claim,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LinkFallbackArg {
    Skip,
    ReuseFirst,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Run mode (defaults to run.mode from settings)
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Total number of wallets to work towards in create mode
    #[arg(short = 'n', long, value_name = "N")]
    pub count: Option<u32>,

    /// Also retry units that failed in an earlier claim run
    #[arg(long)]
    pub include_failed: bool,

    /// What a claim unit gets when there are fewer links than units
    #[arg(long, value_enum)]
    pub link_fallback: Option<LinkFallbackArg>,
}

pub async fn cmd_create_or_claim(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let mut settings = ctx.settings().clone();
    if let Some(fallback) = args.link_fallback {
        settings.claim.link_fallback = match fallback {
            LinkFallbackArg::Skip => LinkFallback::Skip,
            LinkFallbackArg::ReuseFirst => LinkFallback::ReuseFirst,
        };
    }
    let mode_kind = match args.mode {
        Some(ModeArg::Create) => ModeKind::Create,
        Some(ModeArg::Claim) => ModeKind::Claim,
        None => settings.run.mode,
    };
    let mode = match mode_kind {
        ModeKind::Create => RunMode::Create {
            target_total: args.count.unwrap_or(settings.run.target_total),
        },
        ModeKind::Claim => RunMode::Claim {
            include_failed: args.include_failed || settings.claim.include_failed,
        },
    };

    let session_config = settings.session_config()?;
    let ledger = ctx.open_ledger()?;
    let shell = ctx.shell()?;
    let catalog = ctx.locator_catalog()?;
    info!(mode = mode.as_str(), ledger = %settings.ledger.dir.display(), "Starting run");

    let orchestrator = Orchestrator::new(&settings, mode, ledger, shell, catalog);
    let summary = orchestrator
        .run(DeviceSession::open(&session_config))
        .await
        .with_context(|| {
            format!(
                "Run aborted; summary written to {}",
                orchestrator.summary_path().display()
            )
        })?;

    if ctx.output().is_human() {
        print_summary(&summary);
    } else {
        print_structured(ctx.output(), &summary)?;
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let status = match summary.status {
        RunStatus::Completed => "completed",
        RunStatus::Interrupted => "interrupted (rerun to resume)",
        RunStatus::Aborted => "aborted",
    };
    println!("Run {} ({})", summary.run_id, summary.mode);
    println!("- Status: {}", status);
    println!("- Elapsed: {}", summary.elapsed);
    println!(
        "- Units: planned={} processed={} succeeded={} failed={} skipped={}",
        summary.planned, summary.processed, summary.succeeded, summary.failed, summary.skipped
    );
    if let Some(ledger) = &summary.ledger {
        println!(
            "- Ledger: total={} pending={} success={} failed={} skipped={}",
            ledger.total, ledger.pending, ledger.success, ledger.failed, ledger.skipped
        );
    }
}
