use super::SectionAnalyzer;

const WINDOW_BEFORE: usize = 5;
const WINDOW_AFTER: usize = 15;

/// Keyword window around the best-scoring line
pub struct GenericAnalyzer;

impl SectionAnalyzer for GenericAnalyzer {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn locate(&self, lines: &[&str], instruction: &str) -> Option<(usize, usize)> {
        best_keyword_line(lines, instruction).map(|best| keyword_window(lines.len(), best))
    }
}

/// Index of the line containing the most instruction words longer than 3 chars.
///
/// Ties keep the earliest line. `None` when no line contains any such word.
pub fn best_keyword_line(lines: &[&str], instruction: &str) -> Option<usize> {
    let words: Vec<&str> = instruction
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .collect();
    if words.is_empty() {
        return None;
    }

    let mut best: Option<(usize, usize)> = None;
    for (i, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        let score = words.iter().filter(|w| lower.contains(*w)).count();
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

/// Five lines before and fifteen after `best`, clipped to the file
pub fn keyword_window(line_count: usize, best: usize) -> (usize, usize) {
    let start = best.saturating_sub(WINDOW_BEFORE);
    let end = (best + WINDOW_AFTER).min(line_count.saturating_sub(1));
    (start, end)
}
