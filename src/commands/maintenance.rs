//! Remote housekeeping commands.
//! Usage: tunnelrun cleanup | tunnelrun variables

use anyhow::Result;
use colored::Colorize;

use crate::commands::common::{print_json, CommandContext};

/// Free remote memory. Every remote variable is lost.
pub fn cleanup(ctx: &CommandContext) -> Result<()> {
    let report = ctx.bridge()?.cleanup()?;

    if ctx.json {
        return print_json(&report);
    }
    println!(
        "{} Freed {:.1} MB on the remote",
        "✓".green().bold(),
        report.remote.freed_mb
    );
    if let Some(cleared) = report.remote.variables_cleared {
        println!("  Variables cleared: {cleared}");
    }
    if !report.stale_checkpoints.is_empty() {
        println!(
            "\n{} these unfinished tasks relied on remote state that is now gone:",
            "Warning:".yellow().bold()
        );
        for summary in &report.stale_checkpoints {
            println!(
                "  {} ({}, batch {}/{})",
                summary.task_id, summary.status, summary.next_batch_index, summary.batch_count
            );
        }
    }
    Ok(())
}

pub fn variables(ctx: &CommandContext) -> Result<()> {
    let vars = ctx.bridge()?.list_variables()?;
    if ctx.json {
        return print_json(&vars);
    }
    match vars.as_object() {
        Some(map) if map.is_empty() => println!("(no variables)"),
        Some(map) => {
            for (name, value) in map {
                let shown = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                println!("  {}  {}", name.bold(), shown);
            }
        }
        None => print_json(&vars)?,
    }
    Ok(())
}
