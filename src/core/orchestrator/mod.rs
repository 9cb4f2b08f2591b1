//! Orchestration: run an ordered plan of file requirements to completion.
//!
//! Each requirement is generated through the edit session, then the setup and
//! validate scripts run. Failures feed the next attempt's prompt, and the plan
//! is persisted after every transition so an interrupted run can resume.

mod processor;
mod scripts;
mod store;

pub use processor::{CancelFlag, RequirementProcessor};
pub use scripts::{ScriptOutcome, ScriptRunner, ShellScriptRunner};
pub use store::{import_plan, JsonPlanStore, PlanStore, PLAN_FILE};
