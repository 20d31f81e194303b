//! Chunked command: run or resume a batched workload.
//! Usage: tunnelrun chunked [--task-id ID] (--template T | --template-file PATH)
//!        --total N --batch-size N [--setup S] [--loop-var V]

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::PathBuf;

use crate::chunked::template::BatchTemplate;
use crate::chunked::ChunkedReport;
use crate::commands::common::{indented, print_json, read_source, CommandContext};

/// Arguments of the chunked command.
pub struct ChunkedArgs {
    pub task_id: Option<String>,
    pub template: Option<String>,
    pub template_file: Option<PathBuf>,
    pub total: u64,
    pub batch_size: u64,
    pub setup: Option<String>,
    pub loop_var: Option<String>,
}

pub fn execute(ctx: &CommandContext, args: ChunkedArgs) -> Result<()> {
    let body = read_source(args.template, args.template_file.as_deref())?;
    let mut template = BatchTemplate::new(body);
    if let Some(loop_var) = args.loop_var {
        template = template.with_loop_var(loop_var);
    }
    if let Some(setup) = args.setup {
        template = template.with_setup(setup);
    }

    let bridge = ctx.bridge()?;
    let report = bridge.run_chunked(args.task_id, template, args.total, args.batch_size)?;

    if ctx.json {
        print_json(&report)?;
    } else {
        display(&report);
    }

    if !report.is_completed() {
        bail!("Task '{}' stopped before completion", report.task_id);
    }
    Ok(())
}

fn display(report: &ChunkedReport) {
    let progress = format!("{}/{}", report.batches_succeeded, report.batch_count);
    if report.is_completed() {
        let how = if report.replayed {
            "replayed from checkpoint".to_string()
        } else {
            format!("{} batch(es) executed", report.batches_executed)
        };
        println!(
            "{} Task {} completed ({progress} batches, {how})",
            "✓".green().bold(),
            report.task_id.bold()
        );
    } else {
        println!(
            "{} Task {} stopped at {progress} batches",
            "✗".red().bold(),
            report.task_id.bold()
        );
    }
    println!(
        "  {} items in batches of {}, {:.2}s remote time",
        report.total_items, report.batch_size, report.aggregate.total_elapsed_secs
    );

    if !report.aggregate.output.is_empty() {
        println!("\n{}", "Output".bold());
        println!("{}", indented(report.aggregate.output.trim_end(), 2));
    }
    if let Some(failure) = &report.failed_batch {
        println!(
            "\n{} batch {} (items {}..{}): {}",
            "Failed".red().bold(),
            failure.index,
            failure.start,
            failure.end,
            failure.error
        );
    }
    if let Some(guidance) = &report.guidance {
        println!("{} {guidance}", "Hint:".yellow().bold());
    }
}
