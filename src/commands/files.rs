//! Remote file commands.
//! Usage: tunnelrun files [PATH] | tunnelrun download REMOTE_PATH [--name NAME]

use anyhow::Result;
use colored::Colorize;

use crate::commands::common::{print_json, CommandContext};

pub fn list(ctx: &CommandContext, path: Option<String>) -> Result<()> {
    let files = ctx.bridge()?.list_files(path.as_deref())?;

    if ctx.json {
        return print_json(&files);
    }
    if files.is_empty() {
        println!("(no files)");
        return Ok(());
    }
    let width = files.iter().map(|f| f.name.len()).max().unwrap_or(0);
    for file in &files {
        println!("  {:<width$}  {}", file.name, human_size(file.size).dimmed());
    }
    Ok(())
}

pub fn download(ctx: &CommandContext, remote_path: String, name: Option<String>) -> Result<()> {
    let saved = ctx.bridge()?.download(&remote_path, name.as_deref())?;

    if ctx.json {
        return print_json(&saved);
    }
    println!(
        "{} Saved {} ({})",
        "✓".green().bold(),
        saved.local_path.display(),
        human_size(saved.size_bytes)
    );
    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}
