use std::collections::BTreeMap;
use std::path::PathBuf;

/// Parsed outcome of one model call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    /// New full content per file; empty when nothing usable was produced
    pub files_changed: BTreeMap<PathBuf, String>,
    /// Unmodified model output, kept for the ledger and retry prompts
    pub raw_response: String,
    /// Model that produced the response
    pub model: String,
}

impl GenerationResult {
    pub fn is_empty(&self) -> bool {
        self.files_changed.is_empty()
    }
}
