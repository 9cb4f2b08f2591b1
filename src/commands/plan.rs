use std::path::Path;

use crate::core::{require_state_dir, JsonPlanStore, PlanStore};
use crate::error::EditLoopError;
use crate::models::{OrchestrationPlan, RequirementStatus};

/// Show the stored plan and where it stands
pub fn show_plan(project_root: &Path, verbose: bool) -> Result<(), EditLoopError> {
    let store = JsonPlanStore::new(&require_state_dir(project_root)?);
    match store.load()? {
        Some(plan) => print_plan(&plan, verbose),
        None => println!("No plan stored. Import one with 'editloop orchestrate --plan <file>'."),
    }
    Ok(())
}

pub fn print_plan(plan: &OrchestrationPlan, verbose: bool) {
    println!("=== Plan: {} ===\n", plan.name);
    println!("{}/{} complete\n", plan.completed_count(), plan.requirements.len());

    for (i, requirement) in plan.requirements.iter().enumerate() {
        let status_str = match requirement.status {
            RequirementStatus::Pending => "PENDING",
            RequirementStatus::Completed => "DONE",
            RequirementStatus::Failed => "FAILED",
        };
        print!("  {}. {} [{}]", i + 1, requirement.file_path.display(), status_str);
        if requirement.attempts > 1 {
            print!(" ({} attempts)", requirement.attempts);
        }
        println!();

        if verbose {
            println!("     {}", requirement.instruction.lines().next().unwrap_or_default());
        }
        if let Some(ref failure) = requirement.validation_failure_context {
            let excerpt: String = failure.lines().take(if verbose { 20 } else { 3 }).collect::<Vec<_>>().join("\n     ");
            println!("     last failure: {}", excerpt);
        }
    }
}
