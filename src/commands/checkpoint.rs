//! Checkpoint inspection commands
//!
//! Usage: tunnelrun checkpoint show <name> | list | clear <name>

use anyhow::{bail, Result};
use colored::Colorize;

use crate::commands::common::{indented, print_json, CommandContext};
use crate::fs::CheckpointStore;
use crate::models::{CheckpointRecord, CheckpointStatus, RunCheckpoint, StoredCheckpoint};

/// Checkpoints are local; these commands need no remote URL.
fn store(ctx: &CommandContext) -> Result<CheckpointStore> {
    Ok(CheckpointStore::open(&ctx.config.checkpoint_dir)?)
}

pub fn show(ctx: &CommandContext, task_id: String) -> Result<()> {
    let Some(stored) = store(ctx)?.load_any(&task_id)? else {
        bail!("No checkpoint for task '{task_id}'");
    };

    if ctx.json {
        return print_json(&stored);
    }
    match &stored {
        StoredCheckpoint::Chunked(record) => display_record(record),
        StoredCheckpoint::Run(run) => display_run(run),
    }
    Ok(())
}

pub fn list(ctx: &CommandContext) -> Result<()> {
    let summaries = store(ctx)?.list()?;

    if ctx.json {
        return print_json(&summaries);
    }
    if summaries.is_empty() {
        println!("(no checkpoints)");
        return Ok(());
    }
    println!("Checkpoints:");
    println!("─────────────────────────────────────────────────────────");
    for s in &summaries {
        println!(
            "  {:<32} {:<12} {}/{} batches  {}",
            s.task_id,
            colored_status(s.status),
            s.next_batch_index,
            s.batch_count,
            s.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
    Ok(())
}

pub fn clear(ctx: &CommandContext, task_id: String) -> Result<()> {
    let removed = store(ctx)?.delete(&task_id)?;
    if ctx.json {
        return print_json(&serde_json::json!({ "task_id": task_id, "removed": removed }));
    }
    if removed {
        println!("{} Cleared checkpoint for '{task_id}'", "✓".green().bold());
    } else {
        println!("No checkpoint for task '{task_id}'");
    }
    Ok(())
}

fn colored_status(status: CheckpointStatus) -> String {
    let text = status.to_string();
    match status {
        CheckpointStatus::Completed => text.green().to_string(),
        CheckpointStatus::InProgress => text.yellow().to_string(),
        CheckpointStatus::Failed => text.red().to_string(),
    }
}

fn display_run(run: &RunCheckpoint) {
    println!("{} {}", "Run".bold(), run.name.bold());
    println!("  Completed: {}", run.completed_at.to_rfc3339());
    println!("  Took:      {:.2}s", run.execution_time_secs);
    println!("\n{}", "Code".bold());
    println!("{}", indented(run.code.trim_end(), 2));
    if !run.stdout.is_empty() {
        println!("\n{}", "Output".bold());
        println!("{}", indented(run.stdout.trim_end(), 2));
    }
}

fn display_record(record: &CheckpointRecord) {
    println!("{} {}", "Task".bold(), record.task_id.bold());
    println!("  Status:   {}", colored_status(record.status));
    println!(
        "  Progress: {}/{} batches ({} items, batch size {})",
        record.next_batch_index,
        record.batch_count(),
        record.total_items,
        record.batch_size
    );
    println!("  Created:  {}", record.created_at.to_rfc3339());
    println!("  Updated:  {}", record.updated_at.to_rfc3339());

    if record.completed_batches.is_empty() {
        return;
    }
    println!("\n{}", "Batches".bold());
    for batch in &record.completed_batches {
        let mark = if batch.success {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {mark} #{:<4} items {}..{}  {:.2}s",
            batch.index, batch.start, batch.end, batch.elapsed_secs
        );
        if let Some(error) = &batch.error {
            println!("      {}", error.to_string().red());
        }
    }
}
