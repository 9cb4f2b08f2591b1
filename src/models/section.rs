use std::path::PathBuf;

/// A contiguous line range of a file picked as the region an instruction is about.
///
/// Line indexes are 0-based and `end_line` is inclusive, so a valid section of a
/// file with `n` lines satisfies `start_line <= end_line < n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub file_path: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

impl Section {
    /// Build a section from the file's lines, clipping the range to the file bounds.
    ///
    /// Returns `None` for an empty file.
    pub fn from_lines(file_path: PathBuf, lines: &[&str], start: usize, end: usize) -> Option<Self> {
        if lines.is_empty() {
            return None;
        }
        let last = lines.len() - 1;
        let end_line = end.min(last);
        let start_line = start.min(end_line);
        Some(Self {
            file_path,
            start_line,
            end_line,
            text: lines[start_line..=end_line].join("\n"),
        })
    }

    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// True when the section begins at the first line of the file
    pub fn is_top_of_file(&self) -> bool {
        self.start_line == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lines_clips_end() {
        let lines = vec!["a", "b", "c"];
        let section = Section::from_lines(PathBuf::from("x.txt"), &lines, 1, 40).unwrap();
        assert_eq!(section.start_line, 1);
        assert_eq!(section.end_line, 2);
        assert_eq!(section.text, "b\nc");
        assert_eq!(section.line_count(), 2);
    }

    #[test]
    fn test_from_lines_start_past_end() {
        let lines = vec!["a", "b"];
        let section = Section::from_lines(PathBuf::from("x.txt"), &lines, 9, 12).unwrap();
        assert_eq!(section.start_line, 1);
        assert_eq!(section.end_line, 1);
    }

    #[test]
    fn test_from_lines_empty() {
        assert!(Section::from_lines(PathBuf::from("x.txt"), &[], 0, 0).is_none());
    }
}
