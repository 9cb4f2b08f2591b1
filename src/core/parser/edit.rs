use std::path::{Path, PathBuf};
use tracing::info;

/// A `FILE:`/`FIND:`/`REPLACE:`/`END` edit block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditInstruction {
    pub file_path: PathBuf,
    /// Text to find; empty only when creating a file
    pub find: String,
    pub replace: String,
}

/// Edit blocks grouped in response order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEdits {
    pub edits: Vec<EditInstruction>,
    pub affected_files: Vec<PathBuf>,
}

impl ParsedEdits {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits_for_file(&self, path: &Path) -> Vec<&EditInstruction> {
        self.edits.iter().filter(|e| e.file_path == path).collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    Outside,
    Find,
    Replace,
}

/// Parse edit blocks from a model response.
///
/// ```text
/// FILE: path/to/file.rs
/// FIND:
/// <exact text to find>
/// REPLACE:
/// <replacement text>
/// END
/// ```
///
/// Several FIND/REPLACE/END groups may follow one FILE line. Markers are
/// case-insensitive.
pub fn parse_edit_instructions(response: &str) -> ParsedEdits {
    let mut parsed = ParsedEdits::default();
    let mut file: Option<PathBuf> = None;
    let mut block = Block::Outside;
    let mut find: Vec<&str> = Vec::new();
    let mut replace: Vec<&str> = Vec::new();

    for line in response.lines() {
        let trimmed = line.trim();
        let marker = trimmed.to_lowercase();

        if block == Block::Outside && trimmed.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("file:")) {
            let path = trimmed[5..].trim();
            file = (!path.is_empty()).then(|| PathBuf::from(path));
            continue;
        }

        match marker.as_str() {
            "find:" => {
                block = Block::Find;
                find.clear();
                replace.clear();
            }
            "replace:" if block == Block::Find => block = Block::Replace,
            "end" if block != Block::Outside => {
                if let Some(path) = &file {
                    parsed.edits.push(EditInstruction {
                        file_path: path.clone(),
                        find: block_text(&find),
                        replace: block_text(&replace),
                    });
                    if !parsed.affected_files.contains(path) {
                        parsed.affected_files.push(path.clone());
                    }
                }
                block = Block::Outside;
            }
            _ => match block {
                Block::Find => find.push(line),
                Block::Replace => replace.push(line),
                Block::Outside => {}
            },
        }
    }

    parsed
}

/// Join block lines, dropping blank edge lines but keeping indentation
fn block_text(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end]
            .iter()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Replace the first occurrence of `needle` that begins a line
fn replace_at_line_start(content: &str, needle: &str, replacement: &str) -> Option<String> {
    let (at, _) = content
        .match_indices(needle)
        .find(|(at, _)| *at == 0 || content[..*at].ends_with('\n'))?;
    Some(format!("{}{}{}", &content[..at], replacement, &content[at + needle.len()..]))
}

/// Trim each line and collapse runs of whitespace, keeping line breaks
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Locate `find_text` in `content` ignoring whitespace differences.
///
/// Returns the matched text exactly as it appears in `content`.
pub fn find_fuzzy_match(content: &str, find_text: &str) -> Option<String> {
    let normalized = normalize_whitespace(find_text);
    let wanted: Vec<&str> = normalized.lines().collect();
    if wanted.is_empty() {
        return None;
    }

    let lines: Vec<&str> = content.lines().collect();
    (0..lines.len())
        .take_while(|start| start + wanted.len() <= lines.len())
        .find(|&start| {
            wanted
                .iter()
                .enumerate()
                .all(|(i, w)| normalize_whitespace(lines[start + i]) == *w)
        })
        .map(|start| lines[start..start + wanted.len()].join("\n"))
}

/// Apply one edit: exact match first, then whitespace-insensitive match.
///
/// Exact matches anchored at a line start win over mid-line ones.
///
/// An empty FIND is only valid against empty content (file creation).
pub fn apply_edit(content: &str, edit: &EditInstruction) -> Result<String, String> {
    if edit.find.is_empty() {
        return if content.trim().is_empty() {
            Ok(with_trailing_newline(&edit.replace))
        } else {
            Err(format!("Empty FIND for existing file {}", edit.file_path.display()))
        };
    }

    if let Some(updated) = replace_at_line_start(content, &edit.find, &edit.replace) {
        return Ok(updated);
    }

    // Fragments shorter than a line are matched anywhere
    if !edit.find.contains('\n') && !edit.find.starts_with(char::is_whitespace) && content.contains(&edit.find) {
        return Ok(content.replacen(&edit.find, &edit.replace, 1));
    }

    if let Some(matched) = find_fuzzy_match(content, &edit.find) {
        info!("Whitespace-insensitive match applied for {}", edit.file_path.display());
        if let Some(updated) = replace_at_line_start(content, &matched, &edit.replace) {
            return Ok(updated);
        }
    }

    let preview: String = edit.find.chars().take(100).collect();
    let hint = edit
        .find
        .lines()
        .map(str::trim)
        .find(|l| l.len() > 5)
        .and_then(|first| {
            let first = normalize_whitespace(first).to_lowercase();
            content
                .lines()
                .enumerate()
                .find(|(_, l)| normalize_whitespace(l).to_lowercase().contains(&first))
        })
        .map(|(n, l)| format!("\nClosest line {}: {:?}", n + 1, l.chars().take(80).collect::<String>()))
        .unwrap_or_default();

    Err(format!(
        "FIND text not found in {}: {:?}{}",
        edit.file_path.display(),
        preview,
        hint
    ))
}

/// Apply edits in order; the first failure aborts
pub fn apply_edits(content: &str, edits: &[&EditInstruction]) -> Result<String, String> {
    edits
        .iter()
        .try_fold(content.to_string(), |acc, edit| apply_edit(&acc, edit))
}

fn with_trailing_newline(text: &str) -> String {
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}\n", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(find: &str, replace: &str) -> EditInstruction {
        EditInstruction {
            file_path: PathBuf::from("src/lib.rs"),
            find: find.to_string(),
            replace: replace.to_string(),
        }
    }

    #[test]
    fn test_parse_single_block() {
        let response = "Here you go:\nFILE: src/main.rs\nFIND:\nfn old() {}\nREPLACE:\nfn new() {}\nEND\n";
        let parsed = parse_edit_instructions(response);
        assert_eq!(parsed.edits.len(), 1);
        assert_eq!(parsed.edits[0].file_path, PathBuf::from("src/main.rs"));
        assert_eq!(parsed.edits[0].find, "fn old() {}");
        assert_eq!(parsed.edits[0].replace, "fn new() {}");
    }

    #[test]
    fn test_parse_several_files_and_blocks() {
        let response = r#"
FILE: src/main.rs
FIND:
a
REPLACE:
b
END
FIND:
c
REPLACE:
d
END

file: src/lib.rs
find:
x
replace:
y
end
"#;
        let parsed = parse_edit_instructions(response);
        assert_eq!(parsed.edits.len(), 3);
        assert_eq!(parsed.affected_files.len(), 2);
        assert_eq!(parsed.edits_for_file(Path::new("src/main.rs")).len(), 2);
    }

    #[test]
    fn test_block_without_file_is_dropped() {
        let parsed = parse_edit_instructions("FIND:\na\nREPLACE:\nb\nEND\n");
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_apply_exact_and_deletion() {
        assert_eq!(apply_edit("let x = 1;\n", &edit("x = 1", "x = 2")).unwrap(), "let x = 2;\n");
        assert_eq!(apply_edit("a\nb\nc\n", &edit("b\n", "")).unwrap(), "a\nc\n");
    }

    #[test]
    fn test_parse_keeps_indentation() {
        let response = "FILE: src/lib.rs\nFIND:\n\n    1\nREPLACE:\n    2\n\nEND\n";
        let parsed = parse_edit_instructions(response);
        assert_eq!(parsed.edits[0].find, "    1");
        assert_eq!(parsed.edits[0].replace, "    2");
    }

    #[test]
    fn test_indented_find_skips_earlier_mid_line_match() {
        let content = "let total = 10;\nfn f() -> i32 {\n    1\n}\n";
        let parsed = parse_edit_instructions("FILE: src/lib.rs\nFIND:\n    1\nREPLACE:\n    2\nEND\n");
        let result = apply_edit(content, &parsed.edits[0]).unwrap();
        assert_eq!(result, "let total = 10;\nfn f() -> i32 {\n    2\n}\n");
    }

    #[test]
    fn test_line_start_match_preferred() {
        let content = "total_x = 1;\nx = 1;\n";
        assert_eq!(apply_edit(content, &edit("x = 1;", "x = 2;")).unwrap(), "total_x = 1;\nx = 2;\n");
        assert_eq!(apply_edit("a = b + c;\n", &edit("b + c", "c + b")).unwrap(), "a = c + b;\n");
    }

    #[test]
    fn test_fuzzy_match_indentation() {
        let content = "fn f() {\n        let a = 1;\n}\n";
        let result = apply_edit(content, &edit("let   a = 1;", "    let a = 2;")).unwrap();
        assert!(result.contains("let a = 2;"));
        assert!(!result.contains("let a = 1;"));
    }

    #[test]
    fn test_fuzzy_match_multiline_returns_original_text() {
        let content = "if x {\n\ty();\n}\n";
        assert_eq!(find_fuzzy_match(content, "if x {\n    y();"), Some("if x {\n\ty();".to_string()));
    }

    #[test]
    fn test_not_found_reports_closest_line() {
        let err = apply_edit("fn compute_total() {}\n", &edit("FN COMPUTE_TOTAL() {\nmissing", "x")).unwrap_err();
        assert!(err.contains("FIND text not found"));
        assert!(err.contains("Closest line 1"));
    }

    #[test]
    fn test_empty_find_creates_file() {
        assert_eq!(apply_edit("", &edit("", "hello")).unwrap(), "hello\n");
        assert!(apply_edit("existing", &edit("", "hello")).is_err());
    }

    #[test]
    fn test_apply_edits_in_order() {
        let a = edit("one", "two");
        let b = edit("two", "three");
        assert_eq!(apply_edits("one", &[&a, &b]).unwrap(), "three");
    }
}
