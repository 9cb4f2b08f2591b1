//! Parsers for model responses: edit blocks, unified diffs and fenced files.

mod diff;
mod edit;
mod extract;

pub use diff::*;
pub use edit::*;
pub use extract::*;

use std::path::PathBuf;

/// A whole file lifted out of a fenced block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: PathBuf,
    pub content: String,
}

impl ExtractedFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// One hunk line of a unified diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

/// A `@@ -a,b +c,d @@` hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based first line of the hunk in the old file (0 for an empty file)
    pub old_start: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Lines the hunk expects to find in the old file
    pub fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    /// Lines the hunk leaves in the new file
    pub fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }
}

/// All hunks of a unified diff that touch one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub file_path: PathBuf,
    /// `--- /dev/null`: the patch creates the file
    pub creates: bool,
    pub hunks: Vec<Hunk>,
}
