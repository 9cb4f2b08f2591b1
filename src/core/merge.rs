//! Three-way merge of a proposed file against content that moved on disk.

use similar::{DiffTag, TextDiff};
use std::path::Path;

use crate::error::EditLoopError;

/// Base line range where the two sides of a merge disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConflict {
    pub start: usize,
    pub end: usize,
}

impl MergeConflict {
    pub fn into_error(self, path: &Path, base: &str, current: &str, proposed: &str) -> EditLoopError {
        EditLoopError::MergeConflict {
            path: path.to_path_buf(),
            start: self.start,
            end: self.end,
            base: base.to_string(),
            current: current.to_string(),
            proposed: proposed.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Current,
    Proposed,
}

/// Replacement of base lines `start..end`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Change<'a> {
    side: Side,
    start: usize,
    end: usize,
    lines: Vec<&'a str>,
}

impl Change<'_> {
    fn same_edit(&self, other: &Change<'_>) -> bool {
        self.start == other.start && self.end == other.end && self.lines == other.lines
    }

    /// Overlapping ranges, or two edits anchored at the same base line
    fn collides(&self, other: &Change<'_>) -> bool {
        let overlap = self.start < other.end && other.start < self.end;
        overlap || self.start == other.start
    }
}

fn changes<'a>(side: Side, base: &str, other: &'a str) -> Vec<Change<'a>> {
    let other_lines: Vec<&str> = other.split_inclusive('\n').collect();
    let mut out: Vec<Change<'a>> = Vec::new();
    for op in TextDiff::from_lines(base, other).ops() {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        // A delete followed by an insert is one replacement
        match out.last_mut() {
            Some(last) if last.end == old.start => {
                last.end = old.end;
                last.lines.extend_from_slice(&other_lines[new]);
            }
            _ => out.push(Change {
                side,
                start: old.start,
                end: old.end,
                lines: other_lines[new].to_vec(),
            }),
        }
    }
    out
}

/// Merge `proposed` (computed from `base`) into `current` (what is on disk now).
///
/// Returns `proposed` when the file has not moved and `current` when the
/// change is already there. Otherwise both sides' edits against `base` are
/// combined; edits touching the same base lines differently are a conflict.
pub fn merge(base: &str, current: &str, proposed: &str) -> Result<String, MergeConflict> {
    if base == current {
        return Ok(proposed.to_string());
    }
    if proposed == current {
        return Ok(current.to_string());
    }

    let mut all = changes(Side::Current, base, current);
    all.extend(changes(Side::Proposed, base, proposed));
    all.sort_by_key(|c| (c.start, c.end));

    let mut accepted: Vec<Change> = Vec::new();
    for change in all {
        if accepted.iter().any(|a| a.side != change.side && a.same_edit(&change)) {
            continue;
        }
        if let Some(other) = accepted
            .iter()
            .find(|a| a.side != change.side && a.collides(&change))
        {
            return Err(MergeConflict {
                start: other.start.min(change.start),
                end: other.end.max(change.end),
            });
        }
        accepted.push(change);
    }

    let base_lines: Vec<&str> = base.split_inclusive('\n').collect();
    let mut merged = String::with_capacity(current.len().max(proposed.len()));
    let mut pos = 0;
    for change in &accepted {
        for line in base_lines[pos..change.start].iter().chain(&change.lines) {
            push_line(&mut merged, line);
        }
        pos = change.end;
    }
    for line in &base_lines[pos.min(base_lines.len())..] {
        push_line(&mut merged, line);
    }
    Ok(merged)
}

/// Append a line, terminating the previous one if a side left it open
fn push_line(merged: &mut String, line: &str) {
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }
    merged.push_str(line);
}

/// Unified diff of `old` to `new` with three lines of context; empty when equal
pub fn render_diff(path: &Path, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let name = path.display().to_string();
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{}", name), &format!("b/{}", name))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_base_returns_proposed() {
        assert_eq!(merge("x\n", "x\n", "y\n").unwrap(), "y\n");
        assert_eq!(merge("", "", "new file\n").unwrap(), "new file\n");
    }

    #[test]
    fn test_already_applied_returns_current() {
        assert_eq!(merge("a\n", "b\n", "b\n").unwrap(), "b\n");
    }

    #[test]
    fn test_external_append_merges_with_edit() {
        assert_eq!(merge("A\nB\n", "A\nB\nC\n", "A2\nB\n").unwrap(), "A2\nB\nC\n");
    }

    #[test]
    fn test_proposed_without_final_newline_keeps_lines_apart() {
        assert_eq!(merge("A\nB\n", "A\nB\nC\n", "A2\nB").unwrap(), "A2\nB\nC\n");
    }

    #[test]
    fn test_disjoint_edits_both_apply() {
        let base = "one\ntwo\nthree\nfour\nfive\n";
        let current = "ONE\ntwo\nthree\nfour\nfive\n";
        let proposed = "one\ntwo\nthree\nfour\nFIVE\n";
        assert_eq!(merge(base, current, proposed).unwrap(), "ONE\ntwo\nthree\nfour\nFIVE\n");
    }

    #[test]
    fn test_same_line_changed_differently_conflicts() {
        let conflict = merge("a\nb\nc\n", "a\nX\nc\n", "a\nY\nc\n").unwrap_err();
        assert_eq!(conflict, MergeConflict { start: 1, end: 2 });
    }

    #[test]
    fn test_identical_edit_on_both_sides_applies_once() {
        let merged = merge("a\nb\nc\n", "a\nB\nc\nd\n", "a\nB\nc\n").unwrap();
        assert_eq!(merged, "a\nB\nc\nd\n");
    }

    #[test]
    fn test_insertions_at_same_point_conflict() {
        assert!(merge("a\nb\n", "a\nx\nb\n", "a\ny\nb\n").is_err());
    }

    #[test]
    fn test_conflict_error_carries_contents() {
        let conflict = MergeConflict { start: 0, end: 1 };
        match conflict.into_error(Path::new("f.txt"), "b", "c", "p") {
            EditLoopError::MergeConflict { path, base, current, proposed, .. } => {
                assert_eq!(path, Path::new("f.txt"));
                assert_eq!((base.as_str(), current.as_str(), proposed.as_str()), ("b", "c", "p"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_render_diff() {
        let diff = render_diff(Path::new("README.md"), "helo\n", "hello\n");
        assert!(diff.contains("--- a/README.md"));
        assert!(diff.contains("-helo"));
        assert!(diff.contains("+hello"));
        assert!(render_diff(Path::new("x"), "same", "same").is_empty());
    }
}
