use regex::Regex;

use super::{best_keyword_line, keyword_window, match_braces_end, mentions, SectionAnalyzer};

/// Brace-delimited languages: C family, JavaScript/TypeScript, PHP.
///
/// Each pattern captures the construct name in its `name` group.
pub struct BraceAnalyzer {
    name: &'static str,
    patterns: Vec<Regex>,
}

impl BraceAnalyzer {
    fn build(name: &'static str, sources: &[&str]) -> Self {
        let patterns = sources.iter().filter_map(|s| Regex::new(s).ok()).collect();
        Self { name, patterns }
    }

    pub fn c_like() -> Self {
        Self::build("c-like", &[
            r"^\s*(?:class|struct|interface|enum)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)[^;]*$",
            r"^\s*[A-Za-z_][A-Za-z0-9_\*\s<>:,\[\]]*\s+\**(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\([^;]*$",
            r"^\s*func\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        ])
    }

    pub fn javascript() -> Self {
        Self::build("javascript", &[
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\*?\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*\(",
            r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][A-Za-z0-9_$]*)\s*=>",
            r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)",
            r"^\s*(?:export\s+)?interface\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)",
            r"^\s*(?:public\s+|private\s+|protected\s+|static\s+|async\s+)*(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*\([^)]*\)\s*(?::\s*[^{]+)?\{\s*$",
        ])
    }

    pub fn php() -> Self {
        Self::build("php", &[
            r"^\s*(?:(?:public|private|protected|static|abstract|final)\s+)*function\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\(",
            r"^\s*(?:abstract\s+|final\s+)?(?:class|interface|trait)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        ])
    }

    fn named_construct(&self, lines: &[&str], instruction: &str) -> Option<usize> {
        lines.iter().position(|line| {
            self.patterns.iter().any(|re| {
                re.captures(line)
                    .and_then(|caps| caps.name("name"))
                    .map(|m| !is_keyword(m.as_str()) && mentions(instruction, m.as_str()))
                    .unwrap_or(false)
            })
        })
    }
}

impl SectionAnalyzer for BraceAnalyzer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn locate(&self, lines: &[&str], instruction: &str) -> Option<(usize, usize)> {
        if let Some(start) = self.named_construct(lines, instruction) {
            return Some((start, match_braces_end(lines, start)));
        }

        // Widen a keyword hit to the brace block that encloses it
        let best = best_keyword_line(lines, instruction)?;
        if let Some(open) = (0..=best).rev().find(|&i| lines[i].contains('{')) {
            let end = match_braces_end(lines, open);
            if end >= best {
                return Some((open, end));
            }
        }
        Some(keyword_window(lines.len(), best))
    }
}

/// Control-flow words that look like calls to the function pattern
fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "for" | "while" | "switch" | "catch" | "return" | "else" | "do" | "try" | "function" | "new"
    )
}
