/// Truncate a string safely by character count, not byte count.
/// This ensures we don't break UTF-8 encoding by cutting mid-character.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Whole seconds for the remote's timeout field, rounded up and never zero.
pub fn ceil_secs(duration: std::time::Duration) -> u64 {
    let secs = duration.as_secs();
    let rounded = if duration.subsec_nanos() > 0 { secs + 1 } else { secs };
    rounded.max(1)
}
