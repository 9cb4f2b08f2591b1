//! Integration tests for edit sessions: generation, merge, ledger and review

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use editloop::core::{EditSession, ModelConsumer, ModelReply, SYSTEM_PROMPT_EDIT, SYSTEM_PROMPT_SECTION};
use editloop::error::{EditLoopError, ModelError};
use editloop::models::Config;

mod common;

use common::{create_test_project, edit_block, read_file, test_config, verdict, write_file, ScriptedModel};

fn session(root: &Path, config: Config, model: Arc<ScriptedModel>) -> EditSession {
    EditSession::new(config, root.to_path_buf(), model).unwrap()
}

fn reviewed_config(max_rejection_retries: u32) -> Config {
    let mut config = test_config();
    config.review.enabled = true;
    config.review.max_rejection_retries = max_rejection_retries;
    config
}

#[tokio::test]
async fn test_edit_writes_records_and_rolls_back() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[&edit_block("README.md", "helo world", "hello world")]));
    let mut session = session(&root, test_config(), model.clone());

    let outcome = session
        .generate_edit(Path::new("README.md"), "fix the typo in the greeting")
        .await
        .unwrap();

    assert_eq!(read_file(&root, "README.md"), "hello world\n");
    assert!(outcome.diff.contains("-helo world"));
    assert!(outcome.diff.contains("+hello world"));
    let id = outcome.revision_id.unwrap();
    assert!(session.ledger().has_active_changes(&id));
    assert!(root.join(".editloop/revisions.json").is_file());
    assert!(model.calls()[0].0.starts_with(SYSTEM_PROMPT_EDIT));

    assert_eq!(session.rollback(&id).unwrap(), 1);
    assert_eq!(read_file(&root, "README.md"), "helo world\n");
    assert_eq!(session.rollback(&id).unwrap(), 0);
    assert_eq!(read_file(&root, "README.md"), "helo world\n");
}

#[tokio::test]
async fn test_directive_fix_records_exact_contents() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo\n");
    let model = Arc::new(ScriptedModel::new(&["```md # README.md\nhello\n```"]));
    let mut session = session(&root, test_config(), model.clone());

    let outcome = session
        .generate_edit(Path::new("README.md"), "fix typo in README.md #README.md")
        .await
        .unwrap();

    assert_eq!(read_file(&root, "README.md"), "hello\n");
    let revision = session.ledger().get(&outcome.revision_id.unwrap()).unwrap();
    assert_eq!(revision.changes.len(), 1);
    assert_eq!(revision.changes[0].old_content, "helo\n");
    assert_eq!(revision.changes[0].new_content, "hello\n");
    let sent = &model.calls()[0].1;
    assert!(sent.contains("### File: README.md"));
    assert!(sent.contains("helo"));
}

#[tokio::test]
async fn test_rollback_removes_created_file() {
    let (_temp, root) = create_test_project();
    let model = Arc::new(ScriptedModel::new(&[&edit_block("src/new.rs", "", "pub fn added() {}")]));
    let mut session = session(&root, test_config(), model);

    let outcome = session
        .generate_edit(Path::new("src/new.rs"), "create an empty function")
        .await
        .unwrap();
    assert!(read_file(&root, "src/new.rs").contains("pub fn added()"));

    let restored = session.rollback(&outcome.revision_id.unwrap()).unwrap();
    assert_eq!(restored, 1);
    assert!(!root.join("src/new.rs").exists());
}

#[tokio::test]
async fn test_declined_generation_writes_nothing() {
    let (_temp, root) = create_test_project();
    write_file(&root, "notes.txt", "keep\n");
    let model = Arc::new(ScriptedModel::new(&["I would rather not change anything."]));
    let mut session = session(&root, test_config(), model);

    let outcome = session.generate_edit(Path::new("notes.txt"), "tidy up").await.unwrap();

    assert!(outcome.is_empty());
    assert!(outcome.revision_id.is_none());
    assert!(session.revisions().is_empty());
    assert_eq!(read_file(&root, "notes.txt"), "keep\n");
}

#[tokio::test]
async fn test_dry_run_reports_diff_only() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[&edit_block("README.md", "helo world", "hello world")]));
    let mut config = test_config();
    config.behavior.dry_run = true;
    let mut session = session(&root, config, model);

    let outcome = session.generate_edit(Path::new("README.md"), "fix typo").await.unwrap();

    assert!(outcome.diff.contains("+hello world"));
    assert_eq!(read_file(&root, "README.md"), "helo world\n");
    let id = outcome.revision_id.unwrap();
    assert!(!session.ledger().has_active_changes(&id));
}

/// Writes to the target while the model "thinks", then replies
struct DivergingModel {
    path: std::path::PathBuf,
    concurrent: &'static str,
    reply: String,
}

#[async_trait]
impl ModelConsumer for DivergingModel {
    async fn send(&self, _: &str, _: &str, _: Option<&Path>) -> Result<ModelReply, ModelError> {
        fs::write(&self.path, self.concurrent).unwrap();
        Ok(ModelReply {
            text: self.reply.clone(),
            model: "diverging".to_string(),
        })
    }
}

#[tokio::test]
async fn test_concurrent_change_is_merged() {
    let (_temp, root) = create_test_project();
    write_file(&root, "list.txt", "a\nb\nc\n");
    let model = Arc::new(DivergingModel {
        path: root.join("list.txt"),
        concurrent: "a\nb\nc\nd\n",
        reply: edit_block("list.txt", "a", "A"),
    });
    let mut session = EditSession::new(test_config(), root.clone(), model).unwrap();

    let outcome = session.generate_edit(Path::new("list.txt"), "capitalize a").await.unwrap();

    assert_eq!(read_file(&root, "list.txt"), "A\nb\nc\nd\n");
    assert!(outcome.diff.contains("-a"));
    assert!(!outcome.diff.contains("-d"));
}

#[tokio::test]
async fn test_full_file_reply_merges_with_concurrent_append() {
    let (_temp, root) = create_test_project();
    write_file(&root, "list.txt", "A\nB\n");
    let model = Arc::new(DivergingModel {
        path: root.join("list.txt"),
        concurrent: "A\nB\nC\n",
        reply: "```txt # list.txt\nA2\nB\n```".to_string(),
    });
    let mut session = EditSession::new(test_config(), root.clone(), model).unwrap();

    session.generate_edit(Path::new("list.txt"), "rename A").await.unwrap();

    assert_eq!(read_file(&root, "list.txt"), "A2\nB\nC\n");
}

#[tokio::test]
async fn test_overlapping_concurrent_change_conflicts() {
    let (_temp, root) = create_test_project();
    write_file(&root, "list.txt", "a\nb\nc\n");
    let model = Arc::new(DivergingModel {
        path: root.join("list.txt"),
        concurrent: "a\nX\nc\n",
        reply: edit_block("list.txt", "b", "Y"),
    });
    let mut session = EditSession::new(test_config(), root.clone(), model).unwrap();

    let err = session.generate_edit(Path::new("list.txt"), "change b").await.unwrap_err();

    assert!(matches!(err, EditLoopError::MergeConflict { .. }));
    assert_eq!(read_file(&root, "list.txt"), "a\nX\nc\n");
}

#[tokio::test]
async fn test_partial_edit_replaces_only_the_section() {
    let (_temp, root) = create_test_project();
    write_file(
        &root,
        "src/lib.rs",
        "use std::fmt;\n\nfn helper() -> i32 {\n    1\n}\n\nfn main() {\n    println!(\"{}\", helper());\n}\n",
    );
    let model = Arc::new(ScriptedModel::new(&["```rust\nfn helper() -> i32 {\n    2\n}\n```"]));
    let mut session = session(&root, test_config(), model.clone());

    session
        .apply_partial_edit(Path::new("src/lib.rs"), "make helper return 2")
        .await
        .unwrap();

    assert_eq!(
        read_file(&root, "src/lib.rs"),
        "use std::fmt;\n\nfn helper() -> i32 {\n    2\n}\n\nfn main() {\n    println!(\"{}\", helper());\n}\n"
    );
    let calls = model.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, SYSTEM_PROMPT_SECTION);
    assert!(calls[0].1.contains("specific section of src/lib.rs (lines 3-5)"));
}

#[tokio::test]
async fn test_partial_edit_locates_section_from_typed_instruction() {
    let (_temp, root) = create_test_project();
    write_file(
        &root,
        "src/lib.rs",
        "use std::fmt;\n\nfn helper() -> i32 {\n    1\n}\n\nfn render_report() -> String {\n    helper().to_string()\n}\n",
    );
    write_file(&root, "src/other.rs", "// mirrors render_report\npub const TWO: i32 = 2;\n");
    let model = Arc::new(ScriptedModel::new(&["```rust\nfn helper() -> i32 {\n    2\n}\n```"]));
    let mut session = session(&root, test_config(), model.clone());

    session
        .apply_partial_edit(Path::new("src/lib.rs"), "make helper return TWO from #src/other.rs")
        .await
        .unwrap();

    assert_eq!(
        read_file(&root, "src/lib.rs"),
        "use std::fmt;\n\nfn helper() -> i32 {\n    2\n}\n\nfn render_report() -> String {\n    helper().to_string()\n}\n"
    );
    let calls = model.calls();
    assert!(calls[0].1.contains("(lines 3-5)"));
    assert!(calls[0].1.contains("pub const TWO: i32 = 2;"));
}

#[tokio::test]
async fn test_indented_find_edits_the_right_line() {
    let (_temp, root) = create_test_project();
    write_file(&root, "src/lib.rs", "let total = 10;\nfn f() -> i32 {\n    1\n}\n");
    let model = Arc::new(ScriptedModel::new(&[&edit_block("src/lib.rs", "    1", "    2")]));
    let mut session = session(&root, test_config(), model);

    session.generate_edit(Path::new("src/lib.rs"), "return 2").await.unwrap();

    assert_eq!(read_file(&root, "src/lib.rs"), "let total = 10;\nfn f() -> i32 {\n    2\n}\n");
}

#[tokio::test]
async fn test_partial_edit_falls_back_to_whole_file() {
    let (_temp, root) = create_test_project();
    write_file(&root, "src/lib.rs", "fn helper() -> i32 {\n    1\n}\n");
    let model = Arc::new(ScriptedModel::new(&[
        "I cannot edit just a section.",
        &edit_block("src/lib.rs", "    1", "    3"),
    ]));
    let mut session = session(&root, test_config(), model.clone());

    session
        .apply_partial_edit(Path::new("src/lib.rs"), "make helper return 3")
        .await
        .unwrap();

    assert_eq!(read_file(&root, "src/lib.rs"), "fn helper() -> i32 {\n    3\n}\n");
    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].0.starts_with(SYSTEM_PROMPT_EDIT));
}

#[tokio::test]
async fn test_review_approved_keeps_change() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[
        &edit_block("README.md", "helo world", "hello world"),
        &verdict("approved", "typo fixed", ""),
    ]));
    let mut session = session(&root, reviewed_config(2), model.clone());

    let outcome = session.generate_edit(Path::new("README.md"), "fix typo").await.unwrap();

    assert_eq!(read_file(&root, "README.md"), "hello world\n");
    assert!(session.ledger().has_active_changes(&outcome.revision_id.unwrap()));
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_review_rejection_exhausts_budget_and_restores() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[
        &edit_block("README.md", "helo world", "hello world"),
        &verdict("rejected", "wrong greeting", "use a friendlier greeting"),
        &edit_block("README.md", "helo world", "hello world"),
        &verdict("rejected", "still wrong", ""),
    ]));
    let mut session = session(&root, reviewed_config(1), model.clone());

    let err = session.generate_edit(Path::new("README.md"), "fix typo").await.unwrap_err();

    match err {
        EditLoopError::ReviewRejected { feedback, attempts, .. } => {
            assert_eq!(feedback, "still wrong");
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(read_file(&root, "README.md"), "helo world\n");
    assert_eq!(model.call_count(), 4);
    assert_eq!(model.calls()[2].1, "use a friendlier greeting");
    assert!(session.revisions().iter().all(|r| !r.has_active_changes()));
}

#[tokio::test]
async fn test_needs_revision_builds_on_previous_change() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[
        &edit_block("README.md", "helo world", "hello world"),
        &verdict("needs_revision", "missing punctuation", "add an exclamation mark to the greeting"),
        &edit_block("README.md", "hello world", "hello world!"),
        &verdict("approved", "done", ""),
    ]));
    let mut session = session(&root, reviewed_config(0), model.clone());

    session.generate_edit(Path::new("README.md"), "fix typo").await.unwrap();

    assert_eq!(read_file(&root, "README.md"), "hello world!\n");
    assert_eq!(session.revisions().len(), 2);
    assert!(session.revisions().iter().all(|r| r.has_active_changes()));
}

#[tokio::test]
async fn test_rejection_without_active_changes_skips_rollback() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[
        &edit_block("README.md", "helo world", "hello world"),
        &verdict("rejected", "no", ""),
        &edit_block("README.md", "helo world", "hello world"),
        &verdict("approved", "fine", ""),
    ]));
    let mut config = reviewed_config(1);
    config.behavior.dry_run = true;
    let mut session = session(&root, config, model.clone());

    let outcome = session.generate_edit(Path::new("README.md"), "fix typo").await.unwrap();

    assert!(outcome.diff.contains("+hello world"));
    assert_eq!(model.call_count(), 4);
    assert!(model.calls()[2].1.contains("rejected the previous attempt"));
    assert_eq!(read_file(&root, "README.md"), "helo world\n");
}

#[tokio::test]
async fn test_needs_revision_without_suggestion_asks_to_build_on_file() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[
        &edit_block("README.md", "helo world", "hello world"),
        &verdict("needs_revision", "missing punctuation", ""),
        &edit_block("README.md", "hello world", "hello world!"),
        &verdict("approved", "done", ""),
    ]));
    let mut session = session(&root, reviewed_config(0), model.clone());

    session.generate_edit(Path::new("README.md"), "fix typo").await.unwrap();

    assert_eq!(read_file(&root, "README.md"), "hello world!\n");
    let retry = &model.calls()[2].1;
    assert!(retry.contains("missing punctuation"));
    assert!(retry.contains("Build on the current file"));
    assert!(!retry.contains("rejected"));
}

#[tokio::test]
async fn test_unparseable_review_keeps_change() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[
        &edit_block("README.md", "helo world", "hello world"),
        "Looks fine to me I guess",
    ]));
    let mut session = session(&root, reviewed_config(2), model);

    let outcome = session.generate_edit(Path::new("README.md"), "fix typo").await.unwrap();

    assert_eq!(read_file(&root, "README.md"), "hello world\n");
    assert!(outcome.revision_id.is_some());
}

#[tokio::test]
async fn test_advisory_review_never_rolls_back() {
    let (_temp, root) = create_test_project();
    write_file(&root, "README.md", "helo world\n");
    let model = Arc::new(ScriptedModel::new(&[
        &edit_block("README.md", "helo world", "hello world"),
        &verdict("rejected", "would rather not", ""),
    ]));
    let mut config = reviewed_config(2);
    config.review.advisory_only = true;
    let mut session = session(&root, config, model.clone());

    session.generate_edit(Path::new("README.md"), "fix typo").await.unwrap();

    assert_eq!(read_file(&root, "README.md"), "hello world\n");
    assert_eq!(model.call_count(), 2);
}
