use regex::Regex;
use std::sync::LazyLock;

use super::{best_keyword_line, keyword_window, mentions, SectionAnalyzer};

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid def regex")
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)class\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid class regex")
});

/// Indentation-scoped blocks (Python)
pub struct IndentAnalyzer;

impl IndentAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IndentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionAnalyzer for IndentAnalyzer {
    fn name(&self) -> &'static str {
        "indent"
    }

    fn locate(&self, lines: &[&str], instruction: &str) -> Option<(usize, usize)> {
        // Functions before classes so a method wins over its class
        for re in [&*DEF_RE, &*CLASS_RE] {
            for (i, line) in lines.iter().enumerate() {
                let Some(caps) = re.captures(line) else { continue };
                if mentions(instruction, &caps[2]) {
                    let start = include_decorators(lines, i);
                    return Some((start, block_end(lines, i)));
                }
            }
        }

        best_keyword_line(lines, instruction).map(|best| keyword_window(lines.len(), best))
    }
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn include_decorators(lines: &[&str], header: usize) -> usize {
    let mut start = header;
    while start > 0 && lines[start - 1].trim_start().starts_with('@') {
        start -= 1;
    }
    start
}

/// Last line of the block whose header sits at `header`.
///
/// Blank lines never end a block; trailing blanks are not included.
fn block_end(lines: &[&str], header: usize) -> usize {
    let base = indent_width(lines[header]);
    let mut end = header;
    for (i, line) in lines.iter().enumerate().skip(header + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_width(line) <= base {
            break;
        }
        end = i;
    }
    end
}
