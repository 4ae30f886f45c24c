//! Pre-apply validation of a change unit. All checks run even after one
//! fails, so the report is complete; any failed blocking check stops the
//! session before the unit mutates anything.

use super::snapshot::SnapshotManager;
use crate::config::EngineConfig;
use crate::core::{ChangeKind, ChangeUnit, EditOp, PreflightCheckResult, RiskLevel};
use crate::parsers::ParserRegistry;
use crate::resource::MetricsProvider;
use crate::revision::RevisionSystem;
use std::path::Path;
use std::sync::Arc;

pub struct PreflightValidator<'a> {
    root: &'a Path,
    registry: Arc<ParserRegistry>,
    config: &'a EngineConfig,
}

impl<'a> PreflightValidator<'a> {
    pub fn new(root: &'a Path, registry: Arc<ParserRegistry>, config: &'a EngineConfig) -> Self {
        Self {
            root,
            registry,
            config,
        }
    }

    pub fn run(
        &self,
        unit: &ChangeUnit,
        metrics: &dyn MetricsProvider,
        snapshots: &SnapshotManager,
        revision: Option<&dyn RevisionSystem>,
    ) -> Vec<PreflightCheckResult> {
        let mut results = Vec::new();
        results.push(self.check_target(unit));
        results.push(self.check_current_content(unit));
        if let Some(check) = self.check_proposed_content(unit) {
            results.push(check);
        }
        results.extend(self.check_resources(metrics));
        if let Some(check) = check_working_tree(revision) {
            results.push(check);
        }
        results.push(check_snapshot_store(snapshots));
        results
    }

    /// The target must exist and be writable. A config rewrite may
    /// create the file instead.
    fn check_target(&self, unit: &ChangeUnit) -> PreflightCheckResult {
        let may_create = matches!(
            (unit.kind, &unit.op),
            (ChangeKind::ConfigEdit, EditOp::RewriteConfig { .. })
        );

        for target in &unit.targets {
            let path = self.root.join(target);
            if !path.exists() {
                if may_create {
                    continue;
                }
                return failed(
                    "target_exists",
                    RiskLevel::High,
                    true,
                    format!("{} does not exist", target.display()),
                );
            }
            let writable = std::fs::metadata(&path)
                .map(|m| !m.permissions().readonly())
                .unwrap_or(false);
            if !writable {
                return failed(
                    "target_exists",
                    RiskLevel::High,
                    true,
                    format!("{} is not writable", target.display()),
                );
            }
        }
        passed("target_exists", "all targets exist and are writable")
    }

    /// The file must be structurally valid before we touch it, so a
    /// failed verification later can be pinned on this unit's edit.
    fn check_current_content(&self, unit: &ChangeUnit) -> PreflightCheckResult {
        for target in &unit.targets {
            let path = self.root.join(target);
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            if let Some(Err(message)) = self.registry.validate(&path, &content) {
                return failed(
                    "current_content_valid",
                    RiskLevel::High,
                    true,
                    format!("{} is already invalid: {}", target.display(), message),
                );
            }
        }
        passed("current_content_valid", "current content parses")
    }

    /// Proposed content can only be checked when the edit carries the
    /// whole file; partial edits are validated after apply instead.
    fn check_proposed_content(&self, unit: &ChangeUnit) -> Option<PreflightCheckResult> {
        let content = match &unit.op {
            EditOp::Replace { content } | EditOp::RewriteConfig { content } => content,
            EditOp::Insert { .. } | EditOp::PatchLine { .. } | EditOp::UpdateManifest { .. } => {
                return None
            }
        };
        let target = unit.targets.first()?;
        match self.registry.validate(&self.root.join(target), content) {
            Some(Err(message)) => Some(failed(
                "proposed_content_valid",
                RiskLevel::Critical,
                true,
                format!("proposed content for {} is invalid: {}", target.display(), message),
            )),
            Some(Ok(())) => Some(passed("proposed_content_valid", "proposed content parses")),
            None => None,
        }
    }

    fn check_resources(&self, metrics: &dyn MetricsProvider) -> Vec<PreflightCheckResult> {
        let sample = metrics.sample();
        let mut results = Vec::new();

        if sample.memory_pct >= self.config.memory_critical_pct {
            results.push(failed(
                "memory_headroom",
                RiskLevel::Critical,
                true,
                format!("memory at {:.1}%", sample.memory_pct),
            ));
        } else if sample.memory_pct >= self.config.memory_warn_pct {
            results.push(failed(
                "memory_headroom",
                RiskLevel::Medium,
                false,
                format!("memory at {:.1}%", sample.memory_pct),
            ));
        } else {
            results.push(passed(
                "memory_headroom",
                format!("memory at {:.1}%", sample.memory_pct),
            ));
        }

        if sample.disk_pct >= self.config.disk_critical_pct {
            results.push(failed(
                "disk_headroom",
                RiskLevel::Critical,
                true,
                format!("disk at {:.1}%, cannot snapshot safely", sample.disk_pct),
            ));
        } else if sample.disk_pct >= self.config.disk_warn_pct {
            results.push(failed(
                "disk_headroom",
                RiskLevel::Medium,
                false,
                format!("disk at {:.1}%", sample.disk_pct),
            ));
        } else {
            results.push(passed(
                "disk_headroom",
                format!("disk at {:.1}%", sample.disk_pct),
            ));
        }
        results
    }
}

/// Uncommitted changes widen the blast radius of a rollback, but the
/// file-level snapshots still cover them. Warning only.
fn check_working_tree(revision: Option<&dyn RevisionSystem>) -> Option<PreflightCheckResult> {
    let system = revision?;
    Some(match system.working_tree_clean() {
        Ok(true) => passed("working_tree_clean", "working tree is clean"),
        Ok(false) => failed(
            "working_tree_clean",
            RiskLevel::Medium,
            false,
            "uncommitted changes present".to_string(),
        ),
        Err(e) => failed(
            "working_tree_clean",
            RiskLevel::Medium,
            false,
            format!("could not query working tree: {e}"),
        ),
    })
}

fn check_snapshot_store(snapshots: &SnapshotManager) -> PreflightCheckResult {
    match snapshots.probe() {
        Ok(()) => passed("snapshot_store", "restore store is writable"),
        Err(e) => failed(
            "snapshot_store",
            RiskLevel::Critical,
            true,
            format!("cannot write restore store: {e}"),
        ),
    }
}

fn passed(name: &str, detail: impl Into<String>) -> PreflightCheckResult {
    PreflightCheckResult {
        name: name.to_string(),
        passed: true,
        risk_level: RiskLevel::Low,
        blocking: false,
        detail: detail.into(),
    }
}

fn failed(
    name: &str,
    risk_level: RiskLevel,
    blocking: bool,
    detail: String,
) -> PreflightCheckResult {
    PreflightCheckResult {
        name: name.to_string(),
        passed: false,
        risk_level,
        blocking,
        detail,
    }
}

/// True when no blocking check failed. Non-blocking failures are
/// reported but never stop a session.
pub fn blocking_passed(results: &[PreflightCheckResult]) -> bool {
    results.iter().all(|r| r.passed || !r.blocking)
}

/// Human-readable summary of the failed blocking checks.
pub fn blocking_failures(results: &[PreflightCheckResult]) -> String {
    results
        .iter()
        .filter(|r| !r.passed && r.blocking)
        .map(|r| format!("{}: {}", r.name, r.detail))
        .collect::<Vec<_>>()
        .join("; ")
}
