use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::PlanError;
use crate::models::{OrchestrationPlan, OrchestrationRequirement};

/// File name of the persisted plan inside the state folder
pub const PLAN_FILE: &str = "plan.json";

/// Durable storage for the plan being executed
pub trait PlanStore: Send + Sync {
    /// `Ok(None)` when no plan has been stored yet
    fn load(&self) -> Result<Option<OrchestrationPlan>, PlanError>;
    fn save(&self, plan: &OrchestrationPlan) -> Result<(), PlanError>;
}

/// Plan stored as pretty JSON, replaced atomically on every save
pub struct JsonPlanStore {
    plan_file: PathBuf,
}

impl JsonPlanStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            plan_file: state_dir.join(PLAN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.plan_file
    }
}

impl PlanStore for JsonPlanStore {
    fn load(&self) -> Result<Option<OrchestrationPlan>, PlanError> {
        if !self.plan_file.exists() {
            debug!("No stored plan at {}", self.plan_file.display());
            return Ok(None);
        }
        let content =
            fs::read_to_string(&self.plan_file).map_err(|e| PlanError::ReadError(self.plan_file.clone(), e))?;
        let plan = serde_json::from_str(&content)
            .map_err(|e| PlanError::ParseError(self.plan_file.clone(), e.to_string()))?;
        Ok(Some(plan))
    }

    fn save(&self, plan: &OrchestrationPlan) -> Result<(), PlanError> {
        if let Some(parent) = self.plan_file.parent() {
            fs::create_dir_all(parent).map_err(|e| PlanError::WriteError(parent.to_path_buf(), e))?;
        }
        let json = serde_json::to_string_pretty(plan)
            .map_err(|e| PlanError::ParseError(self.plan_file.clone(), e.to_string()))?;

        let temp_file = self.plan_file.with_extension("json.tmp");
        fs::write(&temp_file, &json).map_err(|e| PlanError::WriteError(temp_file.clone(), e))?;
        fs::rename(&temp_file, &self.plan_file).map_err(|e| PlanError::WriteError(self.plan_file.clone(), e))?;

        debug!("Saved plan ({}/{} complete)", plan.completed_count(), plan.requirements.len());
        Ok(())
    }
}

/// Read a plan written by hand, as YAML (`.yaml`/`.yml`) or JSON.
///
/// Either a full plan object or a bare list of `{file_path, instruction}`
/// entries is accepted.
pub fn import_plan(path: &Path) -> Result<OrchestrationPlan, PlanError> {
    let content = fs::read_to_string(path).map_err(|e| PlanError::ReadError(path.to_path_buf(), e))?;
    let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));

    let mut plan = if is_yaml {
        serde_yaml::from_str::<OrchestrationPlan>(&content).or_else(|_| {
            serde_yaml::from_str::<Vec<OrchestrationRequirement>>(&content)
                .map(|requirements| OrchestrationPlan::new("", requirements))
                .map_err(|e| PlanError::ParseError(path.to_path_buf(), e.to_string()))
        })?
    } else {
        serde_json::from_str::<OrchestrationPlan>(&content).or_else(|_| {
            serde_json::from_str::<Vec<OrchestrationRequirement>>(&content)
                .map(|requirements| OrchestrationPlan::new("", requirements))
                .map_err(|e| PlanError::ParseError(path.to_path_buf(), e.to_string()))
        })?
    };

    if plan.requirements.is_empty() {
        return Err(PlanError::Empty);
    }
    if plan.name.is_empty() {
        plan.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
    }
    info!("Imported plan '{}' with {} requirement(s)", plan.name, plan.requirements.len());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequirementStatus;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_plan() {
        let temp = TempDir::new().unwrap();
        let store = JsonPlanStore::new(temp.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = JsonPlanStore::new(&temp.path().join(".editloop"));
        let mut plan = OrchestrationPlan::new("demo", vec![OrchestrationRequirement::new("a.sh", "write a")]);
        plan.requirements[0].mark_completed();
        store.save(&plan).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.requirements[0].status, RequirementStatus::Completed);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_import_yaml_list() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("build.yaml");
        fs::write(
            &path,
            "- file_path: setup.sh\n  instruction: install deps\n- file_path: src/main.py\n  instruction: print hello\n",
        )
        .unwrap();

        let plan = import_plan(&path).unwrap();
        assert_eq!(plan.name, "build");
        assert_eq!(plan.requirements.len(), 2);
        assert_eq!(plan.requirements[1].status, RequirementStatus::Pending);
    }

    #[test]
    fn test_import_json_plan_object() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plan.json");
        fs::write(
            &path,
            r#"{"name": "api", "requirements": [{"file_path": "api.go", "instruction": "add handler"}]}"#,
        )
        .unwrap();

        let plan = import_plan(&path).unwrap();
        assert_eq!(plan.name, "api");
        assert_eq!(plan.requirements[0].file_path, PathBuf::from("api.go"));
    }

    #[test]
    fn test_import_empty_plan() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.json");
        fs::write(&path, "[]").unwrap();
        assert!(matches!(import_plan(&path), Err(PlanError::Empty)));
    }
}
