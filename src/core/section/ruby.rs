use regex::Regex;
use std::sync::LazyLock;

use super::{best_keyword_line, keyword_window, mentions, SectionAnalyzer};

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:def\s+(?:self\.)?([A-Za-z_][A-Za-z0-9_]*[?!=]?)|(?:class|module)\s+([A-Z][A-Za-z0-9_:]*))")
        .expect("valid ruby header regex")
});
static OPENER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:def|class|module|if|unless|while|until|case|begin|for)\b").expect("valid opener regex")
});
static DO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdo(?:\s*\|[^|]*\|)?\s*$").expect("valid do regex"));
static END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*end\b").expect("valid end regex"));

/// `def`/`class`/`module` blocks closed by a matching `end`
pub struct RubyAnalyzer;

impl RubyAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RubyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionAnalyzer for RubyAnalyzer {
    fn name(&self) -> &'static str {
        "ruby"
    }

    fn locate(&self, lines: &[&str], instruction: &str) -> Option<(usize, usize)> {
        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = HEADER_RE.captures(line) else { continue };
            let Some(name) = caps.get(1).or_else(|| caps.get(2)) else { continue };
            if mentions(instruction, name.as_str()) {
                return Some((i, block_end(lines, i)));
            }
        }

        let best = best_keyword_line(lines, instruction)?;
        if let Some(header) = (0..=best).rev().find(|&i| HEADER_RE.is_match(lines[i])) {
            let end = block_end(lines, header);
            if end >= best {
                return Some((header, end));
            }
        }
        Some(keyword_window(lines.len(), best))
    }
}

/// Line of the `end` closing the block opened at `start`.
///
/// Falls back to `start + 20` when the block never closes.
fn block_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0usize;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let code = line.split('#').next().unwrap_or("");
        if OPENER_RE.is_match(code) || DO_RE.is_match(code) {
            depth += 1;
        }
        if END_RE.is_match(code) {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return i;
            }
        }
    }
    (start + 20).min(lines.len().saturating_sub(1))
}
