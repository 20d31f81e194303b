//! Per-batch code synthesis.
//!
//! A template either addresses its item range explicitly through the
//! `{start}`, `{end}` and `{batch_index}` placeholders, or is a plain loop body
//! that gets wrapped in a generated `for` loop over the batch's range.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::Range;

use crate::error::BridgeError;

pub const DEFAULT_LOOP_VAR: &str = "i";

const PLACEHOLDERS: [&str; 3] = ["{start}", "{end}", "{batch_index}"];
const INDENT: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTemplate {
    pub body: String,
    pub loop_var: String,
    /// Runs once, ahead of the first batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
}

impl BatchTemplate {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            loop_var: DEFAULT_LOOP_VAR.to_string(),
            setup: None,
        }
    }

    pub fn with_loop_var(mut self, loop_var: impl Into<String>) -> Self {
        self.loop_var = loop_var.into();
        self
    }

    pub fn with_setup(mut self, setup: impl Into<String>) -> Self {
        let setup = setup.into();
        self.setup = (!setup.trim().is_empty()).then_some(setup);
        self
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.body.trim().is_empty() {
            return Err(BridgeError::invalid("loop body template must not be empty"));
        }
        let mut chars = self.loop_var.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(BridgeError::invalid(format!(
                "loop variable '{}' is not a valid identifier",
                self.loop_var
            )));
        }
        Ok(())
    }

    /// True when the body addresses its range itself.
    pub fn uses_placeholders(&self) -> bool {
        PLACEHOLDERS.iter().any(|p| self.body.contains(p))
    }

    /// Code for one batch. `include_setup` is set only for batch 0.
    pub fn render(&self, batch_index: u64, range: &Range<u64>, include_setup: bool) -> String {
        let mut code = String::new();

        if include_setup {
            if let Some(setup) = &self.setup {
                code.push_str(setup.trim_end());
                code.push_str("\n\n");
            }
        }

        if self.uses_placeholders() {
            let body = self
                .body
                .replace("{start}", &range.start.to_string())
                .replace("{end}", &range.end.to_string())
                .replace("{batch_index}", &batch_index.to_string());
            code.push_str(&body);
        } else {
            code.push_str(&format!(
                "# batch {batch_index}: items {} to {}\n",
                range.start, range.end
            ));
            code.push_str(&format!(
                "for {} in range({}, {}):\n",
                self.loop_var, range.start, range.end
            ));
            for line in self.body.lines() {
                if line.trim().is_empty() {
                    code.push('\n');
                } else {
                    code.push_str(INDENT);
                    code.push_str(line);
                    code.push('\n');
                }
            }
        }

        code
    }

    /// Fingerprint of everything that shapes the generated code.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.body.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.loop_var.as_bytes());
        hasher.update([0u8]);
        if let Some(setup) = &self.setup {
            hasher.update(setup.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Stable task id for callers that do not name their task.
    pub fn derive_task_id(&self, total_items: u64, batch_size: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.digest().as_bytes());
        hasher.update(total_items.to_le_bytes());
        hasher.update(batch_size.to_le_bytes());
        let hash = hex::encode(hasher.finalize());
        format!("task-{}", &hash[..12])
    }
}
