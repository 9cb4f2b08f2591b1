use super::SectionAnalyzer;

/// Markdown and plain text: the heading that best matches the instruction
pub struct MarkdownAnalyzer;

impl SectionAnalyzer for MarkdownAnalyzer {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn locate(&self, lines: &[&str], instruction: &str) -> Option<(usize, usize)> {
        let words: Vec<&str> = instruction
            .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
            .filter(|w| w.chars().count() >= 3)
            .collect();

        let mut best: Option<(usize, usize)> = None;
        for (i, line) in lines.iter().enumerate() {
            let Some(level) = heading_level(line) else { continue };
            let title = line[level..].to_lowercase();
            let score = words.iter().filter(|w| title.contains(*w)).count();
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let (start, _) = best?;
        let level = heading_level(lines[start]).unwrap_or(1);
        let end = lines
            .iter()
            .enumerate()
            .skip(start + 1)
            .find(|(_, l)| heading_level(l).is_some_and(|lv| lv <= level))
            .map(|(i, _)| i - 1)
            .unwrap_or(lines.len() - 1);
        Some((start, end))
    }
}

/// Number of leading `#` for an ATX heading
fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    match line[hashes..].chars().next() {
        Some(' ') | Some('\t') | None => Some(hashes),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Project\n\nIntro text.\n\n## Install\n\nRun make.\n\n### From source\n\nClone it.\n\n## Usage\n\nCall run.\n";

    fn lines() -> Vec<&'static str> {
        DOC.lines().collect()
    }

    #[test]
    fn test_heading_section_includes_subsections() {
        assert_eq!(MarkdownAnalyzer.locate(&lines(), "document install prerequisites"), Some((4, 11)));
    }

    #[test]
    fn test_last_section_runs_to_end() {
        assert_eq!(MarkdownAnalyzer.locate(&lines(), "expand the usage notes"), Some((12, 14)));
    }

    #[test]
    fn test_best_heading_wins() {
        assert_eq!(MarkdownAnalyzer.locate(&lines(), "explain building from source"), Some((8, 11)));
    }

    #[test]
    fn test_no_heading_match() {
        assert_eq!(MarkdownAnalyzer.locate(&lines(), "zz"), None);
        assert_eq!(heading_level("#hashtag"), None);
        assert_eq!(heading_level("### Title"), Some(3));
    }
}
