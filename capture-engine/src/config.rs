//! Engine tuning knobs.
//!
//! The heuristic constants here come from observing the live providers
//! rather than from first principles, so they stay configurable instead
//! of being baked into the code that uses them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Characters of extracted output text used as the dedupe signature.
    #[serde(default = "default_signature_prefix")]
    pub signature_prefix_chars: usize,

    /// Polling cadence for providers watched by interval, milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Largest payload that gets inlined as a data URL, bytes. The bound
    /// is inclusive.
    #[serde(default = "default_inline_ceiling")]
    pub inline_ceiling_bytes: usize,

    /// File extensions treated as downloadable attachments.
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signature_prefix_chars: default_signature_prefix(),
            poll_interval_ms: default_poll_interval_ms(),
            inline_ceiling_bytes: default_inline_ceiling(),
            file_extensions: default_file_extensions(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_signature_prefix() -> usize {
    200
}

fn default_poll_interval_ms() -> u64 {
    1200
}

fn default_inline_ceiling() -> usize {
    2_000_000
}

fn default_file_extensions() -> Vec<String> {
    ["pdf", "txt", "md", "zip"].iter().map(|s| s.to_string()).collect()
}
