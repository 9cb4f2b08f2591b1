use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

use super::{FilePatch, Hunk, HunkLine};

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
});

/// Parse every `---`/`+++`/`@@` file patch in a response.
///
/// Hunk line counts are not trusted; a hunk runs until the next hunk header,
/// file header or closing fence. Deletions of whole files are skipped.
pub fn parse_unified_diff(response: &str) -> Vec<FilePatch> {
    let lines: Vec<&str> = response.lines().collect();
    let mut patches: Vec<FilePatch> = Vec::new();
    let mut current: Option<FilePatch> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_file_header(&lines, i) {
            if let Some(done) = current.take() {
                push_patch(&mut patches, done);
            }
            let old = header_path(&lines[i][4..]);
            let new = header_path(&lines[i + 1][4..]);
            current = new.map(|file_path| FilePatch {
                file_path,
                creates: old.is_none(),
                hunks: Vec::new(),
            });
            i += 2;
            continue;
        }

        if let Some(caps) = HUNK_HEADER_RE.captures(line) {
            if let Some(patch) = current.as_mut() {
                let old_start = caps[1].parse().unwrap_or(0);
                patch.hunks.push(Hunk { old_start, lines: Vec::new() });
            }
            i += 1;
            continue;
        }

        let in_hunk = current.as_ref().is_some_and(|p| !p.hunks.is_empty());
        if in_hunk && !line.starts_with('\\') && !line.starts_with("diff ") && !line.starts_with("index ") {
            let hunk_line = if line.trim_start().starts_with("```") {
                None
            } else if let Some(rest) = line.strip_prefix('+') {
                Some(HunkLine::Add(rest.to_string()))
            } else if let Some(rest) = line.strip_prefix('-') {
                Some(HunkLine::Remove(rest.to_string()))
            } else if let Some(rest) = line.strip_prefix(' ') {
                Some(HunkLine::Context(rest.to_string()))
            } else if line.is_empty() {
                Some(HunkLine::Context(String::new()))
            } else {
                // Prose after the diff
                None
            };

            match hunk_line {
                Some(l) => {
                    if let Some(hunk) = current.as_mut().and_then(|p| p.hunks.last_mut()) {
                        hunk.lines.push(l);
                    }
                }
                None => {
                    if let Some(done) = current.take() {
                        push_patch(&mut patches, done);
                    }
                }
            }
        }
        i += 1;
    }

    if let Some(done) = current.take() {
        push_patch(&mut patches, done);
    }
    patches
}

fn is_file_header(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("--- ") && lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "))
}

/// Path from a `---`/`+++` header; `None` for `/dev/null`
fn header_path(raw: &str) -> Option<PathBuf> {
    let path = raw.split('\t').next().unwrap_or("").trim();
    if path.is_empty() || path == "/dev/null" {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(PathBuf::from(path))
}

fn push_patch(patches: &mut Vec<FilePatch>, mut patch: FilePatch) {
    // Blank lines between the last hunk and following prose are not context
    for hunk in &mut patch.hunks {
        while matches!(hunk.lines.last(), Some(HunkLine::Context(s)) if s.is_empty()) {
            hunk.lines.pop();
        }
    }
    patch.hunks.retain(|h| !h.lines.is_empty());
    if !patch.hunks.is_empty() {
        patches.push(patch);
    }
}

/// Apply a parsed patch to `content`.
///
/// Each hunk is matched at the position closest to its header that comes
/// after the previous hunk, exact first and then ignoring whitespace.
pub fn apply_patch(content: &str, patch: &FilePatch) -> Result<String, String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let trailing_newline = content.is_empty() || content.ends_with('\n');
    let mut cursor = 0usize;

    for (n, hunk) in patch.hunks.iter().enumerate() {
        let old = hunk.old_lines();
        let new: Vec<String> = hunk.new_lines().into_iter().map(str::to_string).collect();
        let hint = hunk.old_start.saturating_sub(1);

        let at = if old.is_empty() {
            // Pure insertion: "-5,0" inserts after line 5
            hunk.old_start.min(lines.len()).max(cursor)
        } else {
            locate(&lines, &old, cursor, hint).ok_or_else(|| {
                format!(
                    "hunk {} of {} does not match the file near line {}",
                    n + 1,
                    patch.file_path.display(),
                    hunk.old_start
                )
            })?
        };

        let inserted = new.len();
        lines.splice(at..at + old.len(), new);
        cursor = at + inserted;
    }

    let mut result = lines.join("\n");
    if trailing_newline && !result.is_empty() {
        result.push('\n');
    }
    Ok(result)
}

fn locate(lines: &[String], wanted: &[&str], from: usize, hint: usize) -> Option<usize> {
    if wanted.len() > lines.len() {
        return None;
    }
    let last = lines.len() - wanted.len();
    let closest = |eq: &dyn Fn(&str, &str) -> bool| {
        (from..=last)
            .filter(|&p| wanted.iter().enumerate().all(|(i, w)| eq(lines[p + i].as_str(), *w)))
            .min_by_key(|&p| p.abs_diff(hint))
    };
    closest(&|a, b| a == b).or_else(|| closest(&|a, b| a.split_whitespace().eq(b.split_whitespace())))
}
