use super::env::CliArgs;
use super::reset::cmd_reset;
use super::run::cmd_create_or_claim;
use super::scan::cmd_scan;
use super::smoke::cmd_test;
use super::status::cmd_status;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::CreateOrClaim(args) => cmd_create_or_claim(args, ctx).await,
        Commands::Scan(args) => cmd_scan(args, ctx).await,
        Commands::Status => cmd_status(ctx).await,
        Commands::Reset(args) => cmd_reset(args, ctx).await,
        Commands::Test => cmd_test(ctx).await,
    }
}
