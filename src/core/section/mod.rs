//! Section extraction: find the smallest line range an instruction is about.
//!
//! Analyzers are looked up by file extension in a [`SectionRegistry`]. Each one
//! tries a top-of-file request first, then a named construct whose identifier
//! appears in the instruction. When neither applies the registry falls back to
//! a keyword window around the best-scoring line.

mod braces;
mod generic;
mod indent;
mod markdown;
mod ruby;
mod tree;

pub use braces::BraceAnalyzer;
pub use generic::{best_keyword_line, keyword_window, GenericAnalyzer};
pub use indent::IndentAnalyzer;
pub use markdown::MarkdownAnalyzer;
pub use ruby::RubyAnalyzer;
pub use tree::{Grammar, TreeSitterAnalyzer};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::models::Section;

/// Phrases that ask for an edit at the head of the file
const TOP_OF_FILE_PHRASES: &[&str] = &["top of", "beginning of", "start of"];

/// Language-specific locator of the construct an instruction refers to
pub trait SectionAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lines returned for a "top of file" request
    fn top_of_file_lines(&self) -> usize {
        15
    }

    /// Inclusive line span of the construct named by `instruction` (lowercased).
    ///
    /// `None` hands over to the keyword window fallback.
    fn locate(&self, lines: &[&str], instruction: &str) -> Option<(usize, usize)>;
}

/// Maps file extensions to analyzers, with a generic fallback entry
pub struct SectionRegistry {
    analyzers: HashMap<String, Arc<dyn SectionAnalyzer>>,
    fallback: Arc<dyn SectionAnalyzer>,
}

impl Default for SectionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SectionRegistry {
    /// Registry with only the generic fallback
    pub fn empty() -> Self {
        Self {
            analyzers: HashMap::new(),
            fallback: Arc::new(GenericAnalyzer),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(&["rs"], Arc::new(TreeSitterAnalyzer::new(Grammar::Rust)));
        registry.register(&["go"], Arc::new(TreeSitterAnalyzer::new(Grammar::Go)));
        registry.register(&["py"], Arc::new(IndentAnalyzer::new()));
        registry.register(&["js", "jsx", "ts", "tsx"], Arc::new(BraceAnalyzer::javascript()));
        registry.register(
            &["java", "c", "cpp", "cc", "h", "hpp", "cs", "swift"],
            Arc::new(BraceAnalyzer::c_like()),
        );
        registry.register(&["php"], Arc::new(BraceAnalyzer::php()));
        registry.register(&["rb"], Arc::new(RubyAnalyzer::new()));
        registry.register(&["md", "markdown", "txt"], Arc::new(MarkdownAnalyzer));
        registry
    }

    pub fn register(&mut self, extensions: &[&str], analyzer: Arc<dyn SectionAnalyzer>) {
        for ext in extensions {
            self.analyzers.insert(ext.to_lowercase(), analyzer.clone());
        }
    }

    pub fn analyzer_for(&self, path: &Path) -> &Arc<dyn SectionAnalyzer> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.analyzers.get(&ext.to_lowercase()))
            .unwrap_or(&self.fallback)
    }

    /// Find the section of `content` relevant to `instruction`.
    ///
    /// `None` means the file is empty or shares no keywords with the instruction;
    /// callers then edit the whole file.
    pub fn extract(&self, content: &str, instruction: &str, path: &Path) -> Option<Section> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return None;
        }

        let lower = instruction.to_lowercase();
        let analyzer = self.analyzer_for(path);

        let span = if is_top_of_file_request(&lower) {
            Some((0, analyzer.top_of_file_lines().saturating_sub(1)))
        } else {
            analyzer
                .locate(&lines, &lower)
                .or_else(|| best_keyword_line(&lines, &lower).map(|best| keyword_window(lines.len(), best)))
        };

        let (start, end) = span?;
        let section = Section::from_lines(path.to_path_buf(), &lines, start, end)?;
        debug!(
            "{} analyzer picked lines {}-{} of {}",
            analyzer.name(),
            section.start_line + 1,
            section.end_line + 1,
            path.display()
        );
        Some(section)
    }
}

fn is_top_of_file_request(lower: &str) -> bool {
    TOP_OF_FILE_PHRASES.iter().any(|p| lower.contains(p))
}

/// True when a construct name is mentioned in the lowercased instruction
pub(crate) fn mentions(instruction: &str, name: &str) -> bool {
    let name = name.trim().to_lowercase();
    name.len() >= 2 && instruction.contains(&name)
}

/// Inclusive end line of the brace block opened at or after `start`.
///
/// Falls back to `start + 20` when the braces never balance.
pub(crate) fn match_braces_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => {
                    depth -= 1;
                    if opened && depth == 0 {
                        return i;
                    }
                }
                _ => {}
            }
        }
    }
    (start + 20).min(lines.len().saturating_sub(1))
}
