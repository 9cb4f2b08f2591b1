//! Standing prompts and prompt assembly for every model call the engine makes.

use std::path::Path;

use crate::models::Section;

/// System prompt for whole-file edits
pub const SYSTEM_PROMPT_EDIT: &str = r#"You are a precise code editor. Apply the requested change to the files shown.

Respond in ONE of these shapes:
1. Edit blocks, for small changes:
FILE: path/to/file.ext
FIND:
<exact text from the file>
REPLACE:
<replacement text>
END

2. A unified diff with ---/+++ headers and @@ hunks.

3. The complete updated file in a fenced block whose fence line names the file:
```rust # src/lib.rs
<entire file>
```

Never abbreviate with placeholder comments such as "// ... existing code ..." or "rest of file unchanged"."#;

/// System prompt for section edits
pub const SYSTEM_PROMPT_SECTION: &str = r#"You are a precise code editor working on one section of a larger file.
Return ONLY the updated section in a single fenced code block. Do not return the rest of the file.
Never use placeholder comments or truncation markers."#;

/// System prompt for the review judge
pub const SYSTEM_PROMPT_REVIEW: &str = r#"You review code changes against the request that produced them.

Reply with a JSON object and nothing else:
{"status": "approved" | "needs_revision" | "rejected", "feedback": "<why>", "new_prompt": "<improved instruction for the next attempt, or empty>"}

Use needs_revision when the change is on the right track but incomplete.
Use rejected when the change is wrong, harmful, or edits the wrong place."#;

/// System prompt used to turn a failure into a search query
pub const SYSTEM_PROMPT_SEARCH_QUERY: &str = r#"You write web search queries. Reply with a single concise search query (2-15 words) wrapped in double quotes, nothing else."#;

const PLACEHOLDER_RULES: &str = r#"- Do NOT include the entire file, only this section with your changes
- Do NOT use placeholder comments like "// unchanged", "// existing code", or "// rest of file"
- Do NOT add truncation markers like "..." or "(content continues)"
- Keep indentation and formatting consistent with the surrounding code"#;

/// Language tag for fences based on the file extension
pub fn fence_language(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "rs" => "rust",
        "go" => "go",
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "rb" => "ruby",
        "php" => "php",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "sh" => "bash",
        "md" | "markdown" => "markdown",
        "toml" => "toml",
        "json" => "json",
        _ => "",
    }
}

/// Context block listing whole files for a generation call
pub fn assemble_file_context(files: &[(&Path, &str)]) -> String {
    let mut context = String::from(SYSTEM_PROMPT_EDIT);
    for (path, content) in files {
        context.push_str(&format!(
            "\n\n## File: {}\n```{}\n{}\n```",
            path.display(),
            fence_language(path),
            content
        ));
    }
    context
}

/// Prompt asking for an updated version of one section.
///
/// A section starting at the first line gets its own wording so the model
/// keeps package and import lines intact.
pub fn assemble_section_prompt(instruction: &str, section: &Section) -> String {
    let lang = fence_language(&section.file_path);
    let path = section.file_path.display();
    let (first, last) = (section.start_line + 1, section.end_line + 1);

    if section.is_top_of_file() {
        return format!(
            r#"You are editing the top of {path} (lines {first}-{last}), including any package declaration and imports.

ORIGINAL TASK: {instruction}

CURRENT TOP SECTION:
```{lang}
{text}
```

INSTRUCTIONS:
- Add or change content at the top of the file as requested
- Keep existing package declarations and imports unless the task says otherwise
{rules}

Format your response as:
```{lang}
[updated top section here]
```"#,
            text = section.text,
            rules = PLACEHOLDER_RULES,
        );
    }

    format!(
        r#"You are editing a specific section of {path} (lines {first}-{last}).

ORIGINAL TASK: {instruction}

CURRENT SECTION TO EDIT:
```{lang}
{text}
```

INSTRUCTIONS:
- Make the requested change to this section only
- Return the complete modified section, ready to be inserted in place
- If you add functions, include them completely
{rules}

Format your response as:
```{lang}
[complete updated section here]
```"#,
        text = section.text,
        rules = PLACEHOLDER_RULES,
    )
}

/// Prompt handed to the review judge
pub fn assemble_review_prompt(original_intent: &str, processed_instruction: &str, diff: &str) -> String {
    format!(
        "## Original request\n{}\n\n## Instruction sent to the editor\n{}\n\n## Resulting diff\n```diff\n{}\n```\n\nReview the diff against the original request.",
        original_intent,
        processed_instruction,
        if diff.trim().is_empty() { "(no changes)" } else { diff }
    )
}

/// Instruction for a retry after a failed orchestration attempt
pub fn assemble_retry_instruction(
    base_instruction: &str,
    failure_context: &str,
    last_response: Option<&str>,
) -> String {
    let mut prompt = format!(
        "{}\n\n## Previous attempt failed\n```\n{}\n```\n",
        base_instruction,
        failure_context.trim()
    );
    if let Some(response) = last_response {
        prompt.push_str(&format!(
            "\n## Your previous response\n{}\n\nIdentify what went wrong in that response and produce a corrected version.\n",
            response.trim()
        ));
    } else {
        prompt.push_str("\nFix the cause of this failure.\n");
    }
    prompt
}

/// Prompt asking the model for a search query describing a failure
pub fn assemble_search_query_prompt(instruction: &str, failure_context: &str) -> String {
    let excerpt: String = failure_context.chars().take(1500).collect();
    format!(
        "Task: {}\n\nFailure output:\n{}\n\nWrite a search query that would find how to fix this failure.",
        instruction, excerpt
    )
}

/// Wrapper for requirements that write the setup script
pub fn wrap_setup_instruction(instruction: &str) -> String {
    format!(
        "{}\n\nThe script must be idempotent: running it several times in a row must succeed and leave the same result. Check before installing or creating anything.",
        instruction
    )
}

/// Test-first wrapper for source-file requirements
pub fn wrap_test_driven_instruction(instruction: &str, path: &Path) -> String {
    format!(
        "{}\n\nWork test-first in {}: include tests that describe the requested behavior alongside the implementation, and make sure they pass.",
        instruction,
        path.display()
    )
}

/// Extensions considered source files for the test-first wrapper
pub fn is_testable_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("rs" | "go" | "py" | "js" | "ts" | "java" | "rb" | "php" | "cs")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn section(start: usize) -> Section {
        Section {
            file_path: PathBuf::from("src/lib.rs"),
            start_line: start,
            end_line: start + 1,
            text: "fn a() {}\nfn b() {}".to_string(),
        }
    }

    #[test]
    fn test_fence_language() {
        assert_eq!(fence_language(Path::new("a.rs")), "rust");
        assert_eq!(fence_language(Path::new("a.tsx")), "typescript");
        assert_eq!(fence_language(Path::new("Makefile")), "");
    }

    #[test]
    fn test_section_prompt_top_of_file() {
        let prompt = assemble_section_prompt("add a header comment", &section(0));
        assert!(prompt.contains("top of src/lib.rs (lines 1-2)"));
        assert!(prompt.contains("```rust"));
    }

    #[test]
    fn test_section_prompt_standard() {
        let prompt = assemble_section_prompt("rename b", &section(10));
        assert!(prompt.contains("specific section of src/lib.rs (lines 11-12)"));
        assert!(prompt.contains("ORIGINAL TASK: rename b"));
    }

    #[test]
    fn test_file_context_lists_files() {
        let context = assemble_file_context(&[(Path::new("README.md"), "helo")]);
        assert!(context.starts_with(SYSTEM_PROMPT_EDIT));
        assert!(context.contains("## File: README.md\n```markdown\nhelo\n```"));
    }

    #[test]
    fn test_retry_instruction() {
        let with = assemble_retry_instruction("add x", "exit 1", Some("old answer"));
        assert!(with.contains("Previous attempt failed"));
        assert!(with.contains("old answer"));
        let without = assemble_retry_instruction("add x", "exit 1", None);
        assert!(without.contains("Fix the cause"));
    }

    #[test]
    fn test_review_prompt_empty_diff() {
        let prompt = assemble_review_prompt("fix", "fix", "  ");
        assert!(prompt.contains("(no changes)"));
    }

    #[test]
    fn test_is_testable_source() {
        assert!(is_testable_source(Path::new("src/lib.rs")));
        assert!(!is_testable_source(Path::new("README.md")));
    }
}
