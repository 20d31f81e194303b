//! Connectivity and environment commands.
//! Usage: tunnelrun health | tunnelrun probe

use anyhow::{bail, Result};
use colored::Colorize;

use crate::commands::common::{print_json, CommandContext};
use crate::models::ProbeReport;

/// Check that the remote runtime answers.
pub fn check(ctx: &CommandContext) -> Result<()> {
    let status = ctx.bridge()?.check_connection();

    if ctx.json {
        print_json(&status)?;
    } else if status.connected {
        println!("{} Connected to {}", "✓".green().bold(), status.base_url);
        if let Some(uptime) = status.uptime_minutes {
            println!("  Uptime:           {uptime:.1} min");
        }
        if let Some(available) = status.memory_available_gb {
            println!("  Memory available: {available:.2} GB");
        }
        if let Some(used) = status.memory_used_pct {
            println!("  Memory used:      {used:.1}%");
        }
    } else {
        println!("{} Cannot reach {}", "✗".red().bold(), status.base_url);
        if let Some(error) = &status.error {
            println!("  {error}");
        }
        if let Some(suggestion) = &status.suggestion {
            println!("{} {suggestion}", "Hint:".yellow().bold());
        }
    }

    if !status.connected {
        bail!("Remote runtime is not reachable");
    }
    Ok(())
}

/// Probe the remote environment and print a recommendation.
pub fn probe(ctx: &CommandContext) -> Result<()> {
    let report = ctx.bridge()?.probe_environment()?;
    if ctx.json {
        print_json(&report)
    } else {
        display_probe(&report);
        Ok(())
    }
}

fn display_probe(report: &ProbeReport) {
    let snap = &report.snapshot;
    println!("{}", "Remote environment".bold().blue());
    println!(
        "  Memory: {:.2} GB available of {:.2} GB",
        snap.memory_available_gb, snap.memory_total_gb
    );
    match (&snap.gpu_name, snap.gpu_present) {
        (Some(name), true) => println!("  GPU:    {name} ({:.1} GB)", snap.gpu_memory_gb),
        (None, true) => println!("  GPU:    present ({:.1} GB)", snap.gpu_memory_gb),
        (_, false) => println!("  GPU:    none"),
    }
    if let Some(minutes) = snap.session_minutes_remaining {
        println!("  Session: ~{minutes:.0} min left");
    }
    println!("  Packages: {}", snap.installed_packages.len());

    let rec = &report.recommendation;
    println!("\n{}", "Recommendation".bold());
    println!("  Tier:       {}", rec.tier.to_string().green());
    println!("  Batch size: {}", rec.batch_size.to_string().green());
    for note in &rec.notes {
        println!("  {} {note}", "•".yellow());
    }
}
