//! Helpers shared by the command implementations.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::bridge::Bridge;
use crate::config::BridgeConfig;

/// Global options every command receives.
pub struct CommandContext {
    pub config: BridgeConfig,
    pub json: bool,
}

impl CommandContext {
    pub fn bridge(&self) -> Result<Bridge> {
        Bridge::new(self.config.clone()).context("Failed to set up the remote bridge")
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

/// Take code from the positional argument or from a file.
pub fn read_source(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    match (inline, file) {
        (Some(code), None) => Ok(code),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (Some(_), Some(_)) => anyhow::bail!("Pass code inline or with --file, not both"),
        (None, None) => anyhow::bail!("No code given (pass it inline or with --file)"),
    }
}

/// Indent every line of a multi-line block for display under a heading.
pub fn indented(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
