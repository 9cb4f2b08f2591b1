use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::scripts::ScriptRunner;
use super::store::PlanStore;
use crate::core::directives::{extract_query, strip_trailing_workspace_tag};
use crate::core::prompts::{
    assemble_retry_instruction, assemble_search_query_prompt, is_testable_source, wrap_setup_instruction,
    wrap_test_driven_instruction, SYSTEM_PROMPT_SEARCH_QUERY,
};
use crate::core::session::{EditOutcome, EditSession};
use crate::error::{EditLoopError, Result};
use crate::models::{OrchestrationPlan, OrchestrationRequirement};

/// Shared stop request, checked between attempts and between requirements
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a plan through generation, setup and validation
pub struct RequirementProcessor {
    session: EditSession,
    store: Box<dyn PlanStore>,
    scripts: Arc<dyn ScriptRunner>,
    cancel: CancelFlag,
}

impl RequirementProcessor {
    pub fn new(session: EditSession, store: Box<dyn PlanStore>, scripts: Arc<dyn ScriptRunner>) -> Self {
        Self {
            session,
            store,
            scripts,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn into_session(self) -> EditSession {
        self.session
    }

    /// Run every requirement that is not completed yet, in order.
    ///
    /// Stops at the first requirement that exhausts its attempts; the plan is
    /// saved with that requirement marked failed and later ones untouched.
    pub async fn run(&mut self, plan: &mut OrchestrationPlan) -> Result<()> {
        let total = plan.requirements.len();
        info!("Running plan '{}': {}/{} complete", plan.name, plan.completed_count(), total);

        for index in 0..total {
            if plan.requirements[index].status.is_complete() {
                debug!("Skipping completed {}", plan.requirements[index].file_path.display());
                continue;
            }
            if self.cancel.is_cancelled() {
                return Err(EditLoopError::Cancelled);
            }
            info!("[{}/{}] {}", index + 1, total, plan.requirements[index].file_path.display());
            self.run_requirement(plan, index).await?;
        }

        info!("Plan '{}' complete", plan.name);
        Ok(())
    }

    async fn run_requirement(&mut self, plan: &mut OrchestrationPlan, index: usize) -> Result<()> {
        let orchestration = self.session.config().orchestration.clone();
        let max_attempts = orchestration.max_attempts.max(1);
        plan.requirements[index].attempts = 0;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                self.persist(plan)?;
                return Err(EditLoopError::Cancelled);
            }

            let requirement = plan.requirements[index].clone();
            plan.requirements[index].attempts = attempt;
            if attempt > 1 {
                info!("Attempt {}/{} for {}", attempt, max_attempts, requirement.file_path.display());
            }

            let instruction = self.build_instruction(&requirement, attempt).await;
            let outcome = match self.generate(&requirement.file_path, &instruction).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_attempt_failure() => {
                    warn!("Generation for {} failed: {}", requirement.file_path.display(), e);
                    plan.requirements[index].record_failure(format!("Generation failed: {}", e), None);
                    self.persist(plan)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if outcome.revision_id.is_none() {
                warn!("Model produced no file for {}", requirement.file_path.display());
                plan.requirements[index].record_failure(
                    format!("The response contained no usable content for {}", requirement.file_path.display()),
                    Some(outcome.raw_response),
                );
                self.persist(plan)?;
                continue;
            }

            if requirement.is_setup_script(&orchestration.setup_script) {
                info!("Wrote {}", requirement.file_path.display());
                plan.requirements[index].mark_completed();
                self.persist(plan)?;
                return Ok(());
            }

            let setup = self.scripts.run(&orchestration.setup_script).await;
            if !setup.success {
                warn!("{} failed after writing {}", orchestration.setup_script, requirement.file_path.display());
                plan.requirements[index].record_failure(
                    format!("{} failed:\n{}", orchestration.setup_script, setup.output),
                    Some(outcome.raw_response),
                );
                self.persist(plan)?;
                continue;
            }

            let validation = self.scripts.run(&orchestration.validate_script).await;
            if !validation.success {
                warn!("{} failed for {}", orchestration.validate_script, requirement.file_path.display());
                plan.requirements[index].record_failure(
                    format!("{} failed:\n{}", orchestration.validate_script, validation.output),
                    Some(outcome.raw_response),
                );
                self.persist(plan)?;
                continue;
            }

            info!("Completed {}", requirement.file_path.display());
            plan.requirements[index].mark_completed();
            self.persist(plan)?;
            return Ok(());
        }

        plan.requirements[index].mark_failed();
        self.persist(plan)?;

        let failed = &plan.requirements[index];
        Err(EditLoopError::RequirementFailed {
            path: failed.file_path.clone(),
            instruction: failed.instruction.clone(),
            attempts: max_attempts,
            last_failure: failed.validation_failure_context.clone().unwrap_or_default(),
            last_response: failed.last_raw_response.clone(),
        })
    }

    async fn generate(&mut self, target: &Path, instruction: &str) -> Result<EditOutcome> {
        if self.session.config().behavior.partial_edits {
            self.session.apply_partial_edit(target, instruction).await
        } else {
            self.session.generate_edit(target, instruction).await
        }
    }

    /// Base instruction on the first attempt; retries carry the last failure
    async fn build_instruction(&self, requirement: &OrchestrationRequirement, attempt: u32) -> String {
        let orchestration = &self.session.config().orchestration;
        let mut instruction = requirement.instruction.clone();

        if attempt > 1 {
            if let Some(failure) = &requirement.validation_failure_context {
                let mut base = strip_trailing_workspace_tag(&instruction);
                if let Some(query) = self.search_query(&base, failure).await {
                    base = format!("#SG \"{}\" {}", query, base);
                }
                instruction = assemble_retry_instruction(&base, failure, requirement.last_raw_response.as_deref());
            }
        }

        if requirement.is_setup_script(&orchestration.setup_script) {
            wrap_setup_instruction(&instruction)
        } else if orchestration.test_driven && is_testable_source(&requirement.file_path) {
            wrap_test_driven_instruction(&instruction, &requirement.file_path)
        } else {
            instruction
        }
    }

    /// Ask the model for a 2-15 word query describing the failure
    async fn search_query(&self, instruction: &str, failure: &str) -> Option<String> {
        if !self.session.config().orchestration.search_on_retry || !self.session.can_search() {
            return None;
        }
        let prompt = assemble_search_query_prompt(instruction, failure);
        let reply = match self.session.bridge().request(SYSTEM_PROMPT_SEARCH_QUERY, &prompt, None).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Search query generation failed: {}", e);
                return None;
            }
        };

        let query = extract_query(&reply.text)?;
        let words = query.split_whitespace().count();
        if (2..=15).contains(&words) {
            debug!("Retry search query: {}", query);
            Some(query)
        } else {
            debug!("Discarding search query with {} words", words);
            None
        }
    }

    fn persist(&self, plan: &mut OrchestrationPlan) -> Result<()> {
        plan.touch();
        Ok(self.store.save(plan)?)
    }
}
