//! Repair plans: the operator-supplied description of what to change.

use crate::core::{ChangeKind, EditOp, EngineError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One requested edit, before decomposition into a change unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedEdit {
    pub kind: ChangeKind,
    /// Path relative to the session root.
    pub target: PathBuf,
    pub description: String,
    #[serde(flatten)]
    pub op: EditOp,
}

/// A full plan for one repair session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairPlan {
    pub description: String,
    pub edits: Vec<PlannedEdit>,
}

impl RepairPlan {
    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path)?;
        let plan: RepairPlan = serde_json::from_str(&contents)?;
        if plan.edits.is_empty() {
            return Err(EngineError::Configuration(format!(
                "plan {} contains no edits",
                path.display()
            )));
        }
        Ok(plan)
    }
}
