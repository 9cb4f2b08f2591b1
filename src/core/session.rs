//! Editing session: the context object behind every exposed edit operation.
//!
//! One `EditSession` is built per invocation. It owns the configuration, the
//! revision ledger and the collaborators, and runs the pipeline
//! expand -> generate -> merge -> write -> review for each attempt.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::STATE_DIR;
use crate::core::directives::DirectiveExpander;
use crate::core::generation::GenerationBridge;
use crate::core::ledger::RevisionLedger;
use crate::core::merge::{merge, render_diff};
use crate::core::model::{HttpFetcher, ModelConsumer, SearchGroundingProvider, UrlFetcher, WorkspaceContextProvider};
use crate::core::parser::{extract_snippet, is_partial_content};
use crate::core::prompts::{assemble_section_prompt, fence_language, SYSTEM_PROMPT_SECTION};
use crate::core::review::ReviewJudge;
use crate::core::section::SectionRegistry;
use crate::error::{EditLoopError, Result};
use crate::models::{
    request_hash, split_note, AttemptBudget, ChangeRecord, ChangeStatus, Config, Revision, ReviewStatus, Section,
};

/// Stages and commits written files
pub trait VcsSink: Send + Sync {
    fn add_and_commit(&self, path: &Path, message: &str) -> Result<()>;
}

/// `VcsSink` that shells out to git in the project root
pub struct GitSink {
    repo_root: PathBuf,
}

impl GitSink {
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| EditLoopError::Vcs(format!("failed to run git: {}", e)))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(EditLoopError::Vcs(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

impl VcsSink for GitSink {
    fn add_and_commit(&self, path: &Path, message: &str) -> Result<()> {
        let path = path.to_string_lossy();
        self.git(&["add", "--", &path])?;
        self.git(&["commit", "-m", message, "--", &path])
    }
}

/// Which generation route an edit takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    /// Section edit first, whole file when no section can be edited
    Partial,
    /// Whole-file generation only
    FullFile,
}

/// Progress of a partial edit; each state is tried at most once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempted {
    Partial,
    FullFile,
}

/// Result of one edit operation
#[derive(Debug, Clone, Default)]
pub struct EditOutcome {
    /// Unified diff of what was (or in a dry run, would be) written
    pub diff: String,
    /// `None` when the model proposed nothing
    pub revision_id: Option<String>,
    /// Files whose content changed
    pub files: Vec<PathBuf>,
    /// Instruction sent to the model after directive expansion
    pub instruction: String,
    pub raw_response: String,
    pub model: String,
}

impl EditOutcome {
    /// The model proposed no change
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Proposed contents plus the bases they were computed from
struct Proposal {
    files: BTreeMap<PathBuf, String>,
    bases: BTreeMap<PathBuf, String>,
    raw_response: String,
    model: String,
}

pub struct EditSession {
    config: Config,
    project_root: PathBuf,
    expander: DirectiveExpander,
    sections: SectionRegistry,
    bridge: GenerationBridge,
    judge: Option<Arc<ReviewJudge>>,
    ledger: RevisionLedger,
    vcs: Option<Box<dyn VcsSink>>,
}

impl EditSession {
    /// Build a session for `project_root`, opening its ledger.
    ///
    /// The same model serves generation, search-query synthesis and, when
    /// review is enabled, judging.
    pub fn new(config: Config, project_root: PathBuf, model: Arc<dyn ModelConsumer>) -> Result<Self> {
        let timeout = Duration::from_secs(config.model.timeout_seconds);
        let ledger = RevisionLedger::open(&project_root.join(STATE_DIR))?;

        let fetcher: Arc<dyn UrlFetcher> = Arc::new(HttpFetcher::new(timeout)?);
        let expander = DirectiveExpander::new(project_root.clone(), config.limits.clone(), timeout)
            .with_query_model(model.clone())
            .with_url_fetcher(fetcher);

        let judge = config
            .review
            .enabled
            .then(|| Arc::new(ReviewJudge::new(model.clone(), timeout)));
        let vcs: Option<Box<dyn VcsSink>> = config
            .behavior
            .auto_commit
            .then(|| Box::new(GitSink::new(project_root.clone())) as Box<dyn VcsSink>);

        Ok(Self {
            bridge: GenerationBridge::new(model, timeout),
            config,
            project_root,
            expander,
            sections: SectionRegistry::with_defaults(),
            judge,
            ledger,
            vcs,
        })
    }

    pub fn with_workspace_provider(mut self, provider: Arc<dyn WorkspaceContextProvider>) -> Self {
        self.expander.set_workspace_provider(provider);
        self
    }

    pub fn with_search_provider(mut self, provider: Arc<dyn SearchGroundingProvider>) -> Self {
        self.expander.set_search_provider(provider);
        self
    }

    pub fn with_url_fetcher(mut self, fetcher: Arc<dyn UrlFetcher>) -> Self {
        self.expander.set_url_fetcher(fetcher);
        self
    }

    pub fn with_sections(mut self, sections: SectionRegistry) -> Self {
        self.sections = sections;
        self
    }

    /// Use a separate model for review, enabling the judge
    pub fn with_judge_model(mut self, model: Arc<dyn ModelConsumer>) -> Self {
        let timeout = Duration::from_secs(self.config.model.timeout_seconds);
        self.judge = Some(Arc::new(ReviewJudge::new(model, timeout)));
        self
    }

    pub fn with_vcs(mut self, vcs: Box<dyn VcsSink>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn bridge(&self) -> &GenerationBridge {
        &self.bridge
    }

    pub fn ledger(&self) -> &RevisionLedger {
        &self.ledger
    }

    /// Whether `#SG` directives can be resolved in this session
    pub fn can_search(&self) -> bool {
        self.expander.has_search_provider()
    }

    /// Whole-file edit of `target`
    pub async fn generate_edit(&mut self, target: &Path, instruction: &str) -> Result<EditOutcome> {
        self.edit_with_review(EditMode::FullFile, target, instruction).await
    }

    /// Section edit of `target`, falling back to a whole-file edit
    pub async fn apply_partial_edit(&mut self, target: &Path, instruction: &str) -> Result<EditOutcome> {
        self.edit_with_review(EditMode::Partial, target, instruction).await
    }

    /// Undo every active change of a revision; returns the number of files restored
    pub fn rollback(&mut self, revision_id: &str) -> Result<usize> {
        Ok(self.ledger.rollback(revision_id, &self.project_root)?)
    }

    /// Re-apply a rolled back revision
    pub fn restore(&mut self, revision_id: &str) -> Result<usize> {
        Ok(self.ledger.restore(revision_id, &self.project_root)?)
    }

    pub fn revisions(&self) -> &[Revision] {
        self.ledger.revisions()
    }

    /// Run attempts under the review judge, when one is configured.
    ///
    /// `needs_revision` continues on top of the written change and is capped by
    /// `review.max_revision_rounds`. `rejected` rolls the revision back and
    /// retries while the rejection budget allows.
    async fn edit_with_review(&mut self, mode: EditMode, target: &Path, instruction: &str) -> Result<EditOutcome> {
        let Some(judge) = self.judge.clone() else {
            return self.attempt(mode, target, instruction).await;
        };

        let review = self.config.review.clone();
        let target = self.relative(target);
        let mut budget = AttemptBudget::new(review.max_rejection_retries);
        let mut rounds = 0u32;
        let mut prompt = instruction.to_string();

        loop {
            let outcome = self.attempt(mode, &target, &prompt).await?;
            let Some(revision_id) = outcome.revision_id.clone() else {
                return Ok(outcome);
            };

            let verdict = match judge
                .judge(&outcome.diff, instruction, &outcome.instruction, Some(target.as_path()))
                .await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!("Review failed, keeping revision {}: {}", revision_id, e);
                    return Ok(outcome);
                }
            };

            if review.advisory_only {
                info!("Advisory review: {:?} - {}", verdict.status, verdict.feedback);
                return Ok(outcome);
            }

            match verdict.status {
                ReviewStatus::Approved => return Ok(outcome),
                ReviewStatus::NeedsRevision => {
                    if rounds >= review.max_revision_rounds {
                        return Err(EditLoopError::ReviewUnresolved {
                            path: target,
                            feedback: verdict.feedback,
                            rounds,
                        });
                    }
                    rounds += 1;
                    info!("Review requested revision {}/{}: {}", rounds, review.max_revision_rounds, verdict.feedback);
                    prompt = verdict.revision_prompt(instruction);
                }
                ReviewStatus::Rejected => {
                    warn!("Review rejected revision {}: {}", revision_id, verdict.feedback);
                    if review.rollback_on_reject {
                        if self.ledger.has_active_changes(&revision_id) {
                            let restored = self.ledger.rollback(&revision_id, &self.project_root)?;
                            info!("Rolled back {} file(s) after rejection", restored);
                        } else {
                            info!("No active changes recorded for this revision; skipping rollback");
                        }
                    }
                    if !budget.consume() {
                        return Err(EditLoopError::ReviewRejected {
                            path: target,
                            feedback: verdict.feedback,
                            suggested_prompt: verdict.refined_instruction,
                            attempts: budget.used() + 1,
                        });
                    }
                    info!(
                        "Retrying after rejection ({}/{}, {} left)",
                        budget.used(),
                        budget.limit(),
                        budget.remaining()
                    );
                    prompt = verdict.retry_prompt(instruction);
                }
            }
        }
    }

    /// One editing attempt: expand, generate, then write through the merge
    async fn attempt(&mut self, mode: EditMode, target: &Path, instruction: &str) -> Result<EditOutcome> {
        let target = self.relative(target);
        let expanded = self.expander.expand(instruction).await;

        let mut state = match mode {
            EditMode::Partial => Attempted::Partial,
            EditMode::FullFile => Attempted::FullFile,
        };
        let proposal = loop {
            match state {
                Attempted::Partial => match self.propose_section(&target, instruction, &expanded).await? {
                    Some(proposal) => break proposal,
                    None => {
                        info!("Falling back to whole-file generation for {}", target.display());
                        state = Attempted::FullFile;
                    }
                },
                Attempted::FullFile => break self.propose_file(&target, &expanded).await?,
            }
        };

        let mut outcome = EditOutcome {
            instruction: expanded.clone(),
            raw_response: proposal.raw_response.clone(),
            model: proposal.model.clone(),
            ..EditOutcome::default()
        };
        if proposal.files.is_empty() {
            info!("Model proposed no changes for {}", target.display());
            return Ok(outcome);
        }

        let revision_id = self
            .ledger
            .record_revision(&request_hash(instruction), &expanded, &proposal.raw_response)?;
        let (diff, files) = self.handle_file_updates(&revision_id, &proposal, instruction)?;
        outcome.diff = diff;
        outcome.files = files;
        outcome.revision_id = Some(revision_id);
        Ok(outcome)
    }

    async fn propose_file(&self, target: &Path, instruction: &str) -> Result<Proposal> {
        let base = read_or_empty(&self.project_root.join(target))?;
        let files = vec![(target.to_path_buf(), base.clone())];
        let result = self.bridge.generate(&files, instruction, Some(target)).await?;
        Ok(Proposal {
            files: result.files_changed,
            bases: BTreeMap::from([(target.to_path_buf(), base)]),
            raw_response: result.raw_response,
            model: result.model,
        })
    }

    /// Ask for just the relevant section; `None` hands over to whole-file generation.
    ///
    /// The section is located from the instruction as typed, since inlined
    /// directive content would match names from other files.
    async fn propose_section(&self, target: &Path, instruction: &str, expanded: &str) -> Result<Option<Proposal>> {
        let path = self.project_root.join(target);
        if !path.is_file() {
            debug!("{} does not exist yet; no section to edit", target.display());
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let Some(section) = self.sections.extract(&content, instruction, target) else {
            debug!("No relevant section found in {}", target.display());
            return Ok(None);
        };

        let prompt = assemble_section_prompt(expanded, &section);
        let reply = match self.bridge.request(SYSTEM_PROMPT_SECTION, &prompt, Some(target)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Section edit failed for {}: {}", target.display(), e);
                return Ok(None);
            }
        };

        let Some(snippet) = extract_snippet(&reply.text, fence_language(target)) else {
            debug!("No code block in section reply");
            return Ok(None);
        };
        if is_partial_content(&snippet) {
            warn!("Section reply for {} contains placeholder lines", target.display());
            return Ok(None);
        }

        let updated = splice_section(&content, &section, &snippet);
        Ok(Some(Proposal {
            files: BTreeMap::from([(target.to_path_buf(), updated)]),
            bases: BTreeMap::from([(target.to_path_buf(), content)]),
            raw_response: reply.text,
            model: reply.model,
        }))
    }

    /// Merge each proposed file into what is on disk now, write it and record it.
    ///
    /// Files are handled one at a time, each re-read right before its merge.
    fn handle_file_updates(
        &mut self,
        revision_id: &str,
        proposal: &Proposal,
        instruction: &str,
    ) -> Result<(String, Vec<PathBuf>)> {
        let (note, description) = split_note(instruction);
        let mut diff = String::new();
        let mut written = Vec::new();

        for (path, proposed) in &proposal.files {
            if !is_within_project(path) {
                warn!("Ignoring {}: path leaves the project root", path.display());
                continue;
            }
            let full_path = self.project_root.join(path);
            let existed_before = full_path.exists();
            let current = read_or_empty(&full_path)?;
            let base = proposal.bases.get(path).unwrap_or(&current);

            let merged = merge(base, &current, proposed).map_err(|c| c.into_error(path, base, &current, proposed))?;
            if merged == current {
                debug!("{} already up to date", path.display());
                continue;
            }

            diff.push_str(&render_diff(path, &current, &merged));
            written.push(path.clone());

            if self.config.behavior.dry_run {
                info!("Dry run: not writing {}", path.display());
                continue;
            }

            if let Some(parent) = full_path.parent() {
                if self.config.behavior.create_output_dirs {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(&full_path, &merged)?;
            info!("Wrote {}", path.display());

            let record = ChangeRecord {
                revision_id: revision_id.to_string(),
                file_path: path.clone(),
                old_content: current,
                new_content: merged,
                existed_before,
                note: note.clone(),
                description: description.clone(),
                instruction: instruction.to_string(),
                raw_response: proposal.raw_response.clone(),
                model_used: proposal.model.clone(),
                created_at: chrono::Utc::now(),
                status: ChangeStatus::Active,
            };
            let message = record.commit_message();
            self.ledger.record_change(record)?;

            if let Some(vcs) = &self.vcs {
                if let Err(e) = vcs.add_and_commit(path, &message) {
                    warn!("Commit of {} skipped: {}", path.display(), e);
                }
            }
        }

        Ok((diff, written))
    }

    fn relative(&self, target: &Path) -> PathBuf {
        target
            .strip_prefix(&self.project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| target.to_path_buf())
    }
}

fn read_or_empty(path: &Path) -> Result<String> {
    if path.exists() {
        Ok(fs::read_to_string(path)?)
    } else {
        Ok(String::new())
    }
}

fn is_within_project(path: &Path) -> bool {
    !path.is_absolute() && path.components().all(|c| !matches!(c, Component::ParentDir))
}

/// Replace the section's lines in `content` with `snippet`
pub fn splice_section(content: &str, section: &Section, snippet: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let end = (section.end_line + 1).min(lines.len());
    let start = section.start_line.min(end);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..start]);
    out.extend(snippet.trim_end_matches('\n').lines());
    out.extend_from_slice(&lines[end..]);

    let mut result = out.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(start: usize, end: usize) -> Section {
        Section {
            file_path: PathBuf::from("a.txt"),
            start_line: start,
            end_line: end,
            text: String::new(),
        }
    }

    #[test]
    fn test_splice_middle() {
        let spliced = splice_section("a\nb\nc\nd\n", &section(1, 2), "B\nC\nC2\n");
        assert_eq!(spliced, "a\nB\nC\nC2\nd\n");
    }

    #[test]
    fn test_splice_top_keeps_missing_trailing_newline() {
        assert_eq!(splice_section("a\nb", &section(0, 0), "header\na"), "header\na\nb");
    }

    #[test]
    fn test_is_within_project() {
        assert!(is_within_project(Path::new("src/lib.rs")));
        assert!(!is_within_project(Path::new("../outside.rs")));
        assert!(!is_within_project(Path::new("/etc/passwd")));
    }
}
