//! Input validation for values that end up in local file paths.
//!
//! Task ids name checkpoint files and download names land in the save
//! directory, so both are checked before touching the filesystem.

use anyhow::{bail, Result};

/// Maximum allowed length for task ids.
pub const MAX_TASK_ID_LENGTH: usize = 128;

/// Reserved names that cannot be used as ids (case-insensitive).
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validates that a task id is safe to use as a checkpoint file name.
///
/// ```
/// use tunnelrun::validation::validate_task_id;
///
/// assert!(validate_task_id("embed-images_2024").is_ok());
/// assert!(validate_task_id("").is_err());
/// assert!(validate_task_id("../etc/passwd").is_err());
/// ```
pub fn validate_task_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("Task id cannot be empty");
    }

    if id.len() > MAX_TASK_ID_LENGTH {
        bail!(
            "Task id too long: {} characters (max {})",
            id.len(),
            MAX_TASK_ID_LENGTH
        );
    }

    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_chars {
        bail!("Task id '{id}' contains invalid characters. Use only alphanumeric characters, dashes (-), and underscores (_)");
    }

    if RESERVED_NAMES.contains(&id.to_lowercase().as_str()) {
        bail!("Task id '{id}' uses a reserved name");
    }

    Ok(())
}

/// Validates a local file name for a download: a single path component.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("File name cannot be empty");
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        bail!("File name '{name}' must not contain path separators");
    }
    if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        bail!("File name '{name}' uses a reserved name");
    }
    Ok(())
}

/// Clap value parser for task id arguments.
pub fn clap_task_id_validator(s: &str) -> Result<String, String> {
    validate_task_id(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}
