//! Terminal registration data served by the backend.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Identity of a registered terminal.
///
/// Served by `GET /api/terminal/config` once the terminal has completed
/// registration. Before that the endpoint answers 404.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    pub merchant_id: CompactString,
    pub terminal_id: CompactString,
    #[serde(default)]
    pub cash_register_id: Option<CompactString>,
}

impl TerminalConfig {
    /// Human-readable label shown on card receipts.
    pub fn checkout_title(&self, merchant_label: &str) -> String {
        format!("{} - {}", merchant_label, self.terminal_id)
    }
}
