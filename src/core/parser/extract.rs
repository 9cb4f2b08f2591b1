//! Fenced-block extraction for whole-file and section responses.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::ExtractedFile;

static FENCE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[>|]*```(\S*)").expect("valid fence regex"));

static PATH_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:#{1,6}\s+)?(?:\*\*)?(?:[Ff]ile:\s*)?`?([A-Za-z0-9_./-]+\.[A-Za-z0-9]+)`?(?:\*\*)?:?\s*$")
        .expect("valid path heading regex")
});

/// Explicit end marker that closes any block, markdown included
const HARD_END: &str = "```END";

/// Phrases that mark an abbreviated, not-really-complete code block
const PARTIAL_INDICATORS: &[&str] = &[
    "unchanged",
    "rest of file",
    "existing code",
    "content unchanged",
    "other methods",
    "other functions",
    "remaining code",
    "previous code",
    "same as before",
    "no changes",
    "keep existing",
    "rest unchanged",
    "other imports",
    "existing imports",
    "previous imports",
];

fn is_hard_end(line: &str) -> bool {
    line.trim() == HARD_END
}

/// Language of a fence opening line, lowercased
fn fence_start(line: &str) -> Option<String> {
    if is_hard_end(line) {
        return None;
    }
    FENCE_START_RE
        .captures(line)
        .map(|caps| caps[1].split('#').next().unwrap_or("").to_lowercase())
}

fn is_markdown(lang: &str) -> bool {
    matches!(lang, "markdown" | "md")
}

fn is_fence_end(line: &str, lang: &str) -> bool {
    is_hard_end(line) || (line.trim() == "```" && !is_markdown(lang))
}

/// First token after the last `#` on a line
fn filename_after_hash(line: &str) -> Option<&str> {
    let (_, tail) = line.rsplit_once('#')?;
    tail.split_whitespace().next()
}

/// A usable path needs a stem and an extension
fn is_valid_filename(name: &str) -> bool {
    let parts: Vec<&str> = name.trim_matches('.').split('.').collect();
    parts.len() > 1 && !parts[0].is_empty() && !parts[parts.len() - 1].is_empty()
}

/// True for lines such as `// ... existing code ...` or `# rest of file unchanged`
pub fn is_partial_content_marker(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    let commented = lower.starts_with("//") || lower.starts_with('#') || lower.starts_with("/*");
    (lower.contains("...") || commented) && PARTIAL_INDICATORS.iter().any(|p| lower.contains(p))
}

/// True when any line of `code` is a placeholder for omitted content
pub fn is_partial_content(code: &str) -> bool {
    code.lines().any(is_partial_content_marker)
}

/// Collect the lines of the block whose opening fence is at `open`.
///
/// Returns the block content and the index of its closing line, or `None`
/// when the block never closes.
fn block_body(lines: &[&str], open: usize, lang: &str) -> Option<(String, usize)> {
    let mut last_plain_fence = None;
    for (i, line) in lines.iter().enumerate().skip(open + 1) {
        if is_fence_end(line, lang) {
            return Some((join_lines(&lines[open + 1..i]), i));
        }
        if line.trim() == "```" {
            last_plain_fence = Some(i);
        }
    }
    // A markdown block closed by a plain fence and never hard-ended
    last_plain_fence.map(|end| (join_lines(&lines[open + 1..end]), end))
}

/// Block lines as file content, each ending in a newline
fn join_lines(lines: &[&str]) -> String {
    lines.iter().flat_map(|l| [*l, "\n"]).collect()
}

/// Full-file pass: every fenced block that names its file.
///
/// The name comes from the fence line (`` ```rust # src/lib.rs ``), the first
/// line inside the block (`# src/lib.rs`), or a path heading directly above
/// the fence. Unnamed blocks are skipped.
pub fn extract_code_files(response: &str) -> Vec<ExtractedFile> {
    let lines: Vec<&str> = response.lines().collect();
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(lang) = fence_start(lines[i]) else {
            i += 1;
            continue;
        };

        let mut body_start = i;
        let mut name = filename_after_hash(lines[i])
            .filter(|n| is_valid_filename(n))
            .map(str::to_string);

        if name.is_none() {
            if let Some(next) = lines.get(i + 1).filter(|l| l.trim_start().starts_with('#')) {
                if let Some(n) = filename_after_hash(next).filter(|n| is_valid_filename(n)) {
                    name = Some(n.to_string());
                    body_start = i + 1;
                }
            }
        }

        if name.is_none() && i > 0 {
            name = PATH_HEADING_RE
                .captures(lines[i - 1])
                .map(|caps| caps[1].to_string())
                .filter(|n| is_valid_filename(n));
        }

        match block_body(&lines, body_start, &lang) {
            Some((content, end)) => {
                if let Some(path) = name {
                    debug!("Extracted {} ({} lines)", path, content.lines().count());
                    files.push(ExtractedFile::new(path, content));
                }
                i = end + 1;
            }
            None => break,
        }
    }

    files
}

/// Body of the first fenced block whose language is `expected_lang` or unset.
///
/// An empty `expected_lang` accepts any block. Used for the bare pass and for
/// section replies.
pub fn extract_snippet(response: &str, expected_lang: &str) -> Option<String> {
    let lines: Vec<&str> = response.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let Some(lang) = fence_start(lines[i]) else {
            i += 1;
            continue;
        };
        let (body, end) = block_body(&lines, i, &lang)?;
        let accepted = expected_lang.is_empty() || lang.is_empty() || lang == expected_lang;
        if accepted && !body.trim().is_empty() {
            return Some(body);
        }
        i = end + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_filename_on_fence_line() {
        let response = "Updated:\n```rust # src/lib.rs\npub fn a() {}\n```\n";
        let files = extract_code_files(response);
        assert_eq!(files, vec![ExtractedFile::new("src/lib.rs", "pub fn a() {}\n")]);
    }

    #[test]
    fn test_filename_on_next_line() {
        let response = "```go\n# cmd/main.go\npackage main\n```\n";
        let files = extract_code_files(response);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("cmd/main.go"));
        assert_eq!(files[0].content, "package main\n");
    }

    #[test]
    fn test_path_heading_above_fence() {
        let response = "### `src/util.py`\n```python\ndef f():\n    return 1\n```\n\nsrc/other.py\n```\nx = 1\n```\n";
        let files = extract_code_files(response);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, PathBuf::from("src/util.py"));
        assert_eq!(files[1].path, PathBuf::from("src/other.py"));
        assert_eq!(files[1].content, "x = 1\n");
    }

    #[test]
    fn test_unnamed_and_extensionless_blocks_are_skipped() {
        assert!(extract_code_files("```\nplain\n```\n").is_empty());
        assert!(extract_code_files("```sh # Makefile\nall:\n```\n").is_empty());
    }

    #[test]
    fn test_markdown_keeps_nested_fences_until_hard_end() {
        let response = "```markdown # README.md\n# Title\n\n```bash\nmake\n```\n\nDone.\n```END\n";
        let files = extract_code_files(response);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "# Title\n\n```bash\nmake\n```\n\nDone.\n");
    }

    #[test]
    fn test_markdown_without_hard_end_uses_last_plain_fence() {
        let response = "```md # notes.md\nhello\n```\n";
        let files = extract_code_files(response);
        assert_eq!(files[0].content, "hello\n");
    }

    #[test]
    fn test_hard_end_closes_code_block() {
        let response = "```rust # a.rs\nfn a() {}\n```END\n```rust # b.rs\nfn b() {}\n```\n";
        let files = extract_code_files(response);
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].content, "fn b() {}\n");
    }

    #[test]
    fn test_no_fences_yields_nothing() {
        assert!(extract_code_files("I cannot help with that.").is_empty());
        assert_eq!(extract_snippet("I cannot help with that.", ""), None);
    }

    #[test]
    fn test_extract_snippet_language_filter() {
        let response = "```json\n{}\n```\n```python\nx = 2\n```\n";
        assert_eq!(extract_snippet(response, "python"), Some("x = 2\n".to_string()));
        assert_eq!(extract_snippet(response, ""), Some("{}\n".to_string()));
    }

    #[test]
    fn test_partial_markers() {
        assert!(is_partial_content_marker("    // ... existing code ..."));
        assert!(is_partial_content_marker("# rest of file unchanged"));
        assert!(is_partial_content_marker("/* other methods */"));
        assert!(!is_partial_content_marker("let unchanged = true;"));
        assert!(!is_partial_content_marker("// compute the total"));
        assert!(is_partial_content("fn a() {}\n// ... rest unchanged\n"));
    }
}
