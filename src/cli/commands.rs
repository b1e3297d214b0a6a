use clap::Subcommand;

use super::reset::ResetArgs;
use super::run::RunArgs;
use super::scan::ScanArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Create wallets or claim with existing ones, resuming from the ledger
    CreateOrClaim(RunArgs),

    /// Capture the current screen: screenshot, UI dumps and embedded surfaces
    Scan(ScanArgs),

    /// Show ledger counts, the next resume id and the last run
    Status,

    /// Reset the ledger, clear or import links, seed pending rows
    Reset(ResetArgs),

    /// Connectivity smoke test: adb devices, session, surfaces
    Test,
}
