//! Run command: execute code once on the quick or long tier.
//! Usage: tunnelrun run [--long | --tier TIER] [--timeout-secs N] [--checkpoint NAME]
//!        (CODE | --file PATH)

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use crate::commands::common::{indented, print_json, read_source, CommandContext};
use crate::dispatch::{Outcome, RunReport};
use crate::models::Tier;

/// Arguments of the run command.
pub struct RunArgs {
    pub code: Option<String>,
    pub file: Option<PathBuf>,
    pub long: bool,
    pub tier: Option<String>,
    pub timeout_secs: Option<u64>,
    pub checkpoint: Option<String>,
}

pub fn execute(ctx: &CommandContext, args: RunArgs) -> Result<()> {
    let tier = resolve_tier(&args)?;
    let code = read_source(args.code, args.file.as_deref())?;
    let bridge = ctx.bridge()?;

    let report = match tier {
        Tier::Long => bridge.run_long(
            &code,
            args.timeout_secs.map(Duration::from_secs),
            args.checkpoint.as_deref(),
        )?,
        _ => bridge.run_quick(&code)?,
    };

    if ctx.json {
        print_json(&report)?;
    } else {
        display(&report);
    }

    if !report.outcome.is_success() {
        bail!("Execution did not succeed");
    }
    Ok(())
}

/// Pick the tier from the flags. A timeout override or checkpoint name
/// implies the long tier.
fn resolve_tier(args: &RunArgs) -> Result<Tier> {
    let wants_long = args.long || args.timeout_secs.is_some() || args.checkpoint.is_some();
    let tier = match args.tier.as_deref() {
        Some(name) => name.parse::<Tier>()?,
        None if wants_long => Tier::Long,
        None => Tier::Quick,
    };
    match tier {
        Tier::Chunked => bail!("the chunked tier runs through `tunnelrun chunked`"),
        Tier::Quick if wants_long => {
            bail!("--long, --timeout-secs and --checkpoint need the long tier")
        }
        tier => Ok(tier),
    }
}

fn display(report: &RunReport) {
    let elapsed = report.result.elapsed.as_secs_f64();
    match &report.outcome {
        Outcome::Succeeded => println!(
            "{} {} run finished in {elapsed:.2}s",
            "✓".green().bold(),
            report.tier
        ),
        Outcome::TimedOut { after_secs } => println!(
            "{} {} run timed out after {after_secs:.0}s",
            "✗".red().bold(),
            report.tier
        ),
        Outcome::Failed { reason } => println!(
            "{} {} run failed: {reason}",
            "✗".red().bold(),
            report.tier
        ),
    }

    if !report.result.stdout.is_empty() {
        println!("\n{}", "Output".bold());
        println!("{}", indented(report.result.stdout.trim_end(), 2));
    }
    if let Some(state) = &report.result.remote_state {
        println!("\n{} {}", "Remote state:".dimmed(), state.dimmed());
    }
    if let Some(path) = &report.checkpoint_saved {
        println!("\n{} {}", "Checkpoint saved:".dimmed(), path.display());
    }
    if let Some(guidance) = &report.guidance {
        println!("\n{} {guidance}", "Hint:".yellow().bold());
    }
}
