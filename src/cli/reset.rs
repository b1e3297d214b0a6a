use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::print_structured;

#[derive(Args, Clone, Debug)]
pub struct ResetArgs {
    /// Return every unit to pending instead of removing the rows
    #[arg(long)]
    pub keep_rows: bool,

    /// Also clear the links table
    #[arg(long)]
    pub links: bool,

    /// Seed N pending units once the table is empty
    #[arg(long, value_name = "N")]
    pub init: Option<u32>,

    /// Replace the links table with the lines of FILE (blank lines and # comments ignored)
    #[arg(long, value_name = "FILE")]
    pub import_links: Option<PathBuf>,
}

#[derive(Serialize, Default)]
struct ResetReport {
    units_reset: usize,
    kept_rows: bool,
    links_cleared: bool,
    links_imported: Option<usize>,
    units_seeded: Option<usize>,
}

pub async fn cmd_reset(args: ResetArgs, ctx: &CliContext) -> Result<()> {
    let ledger = ctx.open_ledger()?;
    let mut report = ResetReport {
        kept_rows: args.keep_rows,
        ..Default::default()
    };

    report.units_reset = ledger
        .reset(args.keep_rows)
        .context("Failed to reset units")?;

    if args.links {
        ledger.clear_links().context("Failed to clear links")?;
        report.links_cleared = true;
    }

    if let Some(path) = &args.import_links {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read links from {}", path.display()))?;
        let values = parse_links(&raw);
        let written = ledger.write_links(&values).context("Failed to write links")?;
        info!(path = %path.display(), count = written.len(), "Links imported");
        report.links_imported = Some(written.len());
    }

    if let Some(count) = args.init {
        let seeded = ledger.initialize(count).context("Failed to seed units")?;
        report.units_seeded = Some(seeded);
    }

    if !ctx.output().is_human() {
        return print_structured(ctx.output(), &report);
    }
    if report.kept_rows {
        println!("{} unit(s) returned to pending", report.units_reset);
    } else {
        println!("{} unit(s) removed", report.units_reset);
    }
    if report.links_cleared {
        println!("Links cleared");
    }
    if let Some(count) = report.links_imported {
        println!("{} link(s) imported", count);
    }
    if let Some(count) = report.units_seeded {
        println!("{} pending unit(s) seeded", count);
    }
    Ok(())
}

fn parse_links(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_links;

    #[test]
    fn link_files_skip_blanks_and_comments() {
        let raw = "# drop links\nhttps://a/1\n\n  https://a/2  \n#https://old\n";
        assert_eq!(parse_links(raw), vec!["https://a/1", "https://a/2"]);
    }
}
