//! Session orchestration: decompose, validate, apply, verify, and roll
//! back change units under a single-session admission lock.
//!
//! Unit lifecycle inside a session:
//! preflight -> snapshot -> apply -> verify, with rollback to the unit's
//! restore point on any failure past preflight. A failed final
//! validation rolls the whole session back to its opening restore point.

use super::decomposer::Decomposer;
use super::plan::RepairPlan;
use super::preflight::{blocking_failures, blocking_passed, PreflightValidator};
use super::snapshot::SnapshotManager;
use crate::config::EngineConfig;
use crate::core::{
    ids, ChangeStatus, ChangeUnit, EditOp, EngineError, SessionRecord, SessionStatus, UnitOutcome,
};
use crate::parsers::ParserRegistry;
use crate::resource::{MetricsProvider, SystemMetricsProvider};
use crate::revision::RevisionSystem;
use crate::risk::{analyze_tree, SystemAnalysis};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Exclusive admission token for one session. Dropping it releases the
/// orchestrator for the next session.
pub struct SessionGuard {
    active: Arc<AtomicBool>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Requests a stop at the next unit boundary. Units already applying
/// finish and verify before the session ends.
#[derive(Clone)]
pub struct CancelHandle {
    cancel: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

pub struct RepairOrchestrator {
    root: PathBuf,
    config: EngineConfig,
    registry: Arc<ParserRegistry>,
    metrics: Arc<dyn MetricsProvider>,
    revision: Option<Box<dyn RevisionSystem>>,
    active: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl RepairOrchestrator {
    pub fn new(root: &Path, config: EngineConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            registry: Arc::new(ParserRegistry::with_defaults()),
            metrics: Arc::new(SystemMetricsProvider::new(root)),
            revision: None,
            active: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_revision(mut self, revision: Box<dyn RevisionSystem>) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ParserRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Claim the single-session slot, or reject if a session is active.
    pub fn try_begin(&self) -> Result<SessionGuard, EngineError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::ConcurrentSessionRejected);
        }
        Ok(SessionGuard {
            active: Arc::clone(&self.active),
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Run one repair session to completion. Every exit path other than
    /// a failed rollback returns the session record.
    pub fn run_session(&self, plan: &RepairPlan) -> Result<SessionRecord, EngineError> {
        let _guard = self.try_begin()?;
        self.cancel.store(false, Ordering::Release);

        let started = Instant::now();
        let session_id = ids::timestamped("session", &plan.description);
        let mut record = SessionRecord::new(session_id.clone(), Utc::now());

        log::info!("session {} started: {}", session_id, plan.description);

        let analysis = analyze_tree(&self.root, Arc::clone(&self.registry), &self.config)?;
        record.health_before = analysis.health_score;
        let baseline_findings: BTreeSet<PathBuf> =
            analysis.findings.iter().map(|f| f.file.clone()).collect();

        let mut snapshots = SnapshotManager::new(
            &self.root,
            self.config.extensions.clone(),
            self.config.ignore_patterns.clone(),
        );
        let revision = self.current_revision();
        let session_rp = snapshots.create_restore_point(
            &format!("session {session_id} start"),
            revision.clone(),
            self.metrics.sample(),
        )?;
        record.restore_points.push(session_rp.clone());

        let units = Decomposer::new(&self.root, &self.config, Some(&analysis)).decompose(plan)?;
        log::info!("session {}: {} units planned", session_id, units.len());

        let validator =
            PreflightValidator::new(&self.root, Arc::clone(&self.registry), &self.config);

        let mut all_verified = true;
        for mut unit in units {
            if self.cancel.load(Ordering::Acquire) {
                log::warn!("session {} cancelled before unit {}", session_id, unit.id);
                record.status = SessionStatus::Aborted;
                return self.finish(record, started, None);
            }

            let checks = validator.run(
                &unit,
                self.metrics.as_ref(),
                &snapshots,
                self.revision.as_deref(),
            );
            if !blocking_passed(&checks) {
                let blocked = EngineError::PreflightBlocked {
                    unit: unit.id.clone(),
                    details: blocking_failures(&checks),
                };
                log::error!("{}", blocked);
                record
                    .outcomes
                    .push(outcome(&unit, None, Some(blocked.to_string()), 0));
                record.status = SessionStatus::Aborted;
                return self.finish(record, started, None);
            }
            unit.advance(ChangeStatus::Validated)?;

            let timer = Instant::now();
            let unit_rp = snapshots.create_restore_point(
                &format!("before unit {}", unit.id),
                self.current_revision(),
                self.metrics.sample(),
            )?;
            record.restore_points.push(unit_rp.clone());

            match self.execute_unit(&mut unit, timer, &snapshots, &unit_rp, record.health_before) {
                Ok(()) => {
                    record.outcomes.push(outcome(
                        &unit,
                        Some(unit_rp),
                        None,
                        timer.elapsed().as_millis() as u64,
                    ));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    record.outcomes.push(outcome(
                        &unit,
                        Some(unit_rp),
                        Some(e.to_string()),
                        timer.elapsed().as_millis() as u64,
                    ));
                    record.status = SessionStatus::PartialFailed;
                    all_verified = false;
                    break;
                }
            }
        }

        if all_verified {
            match self.final_validation(record.health_before, &baseline_findings) {
                Ok(analysis) => {
                    record.status = SessionStatus::Success;
                    return self.finish(record, started, Some(analysis.health_score));
                }
                Err(e) => {
                    log::error!("session {} failed final validation: {}", session_id, e);
                    snapshots.emergency_rollback(&session_rp, self.revision.as_deref())?;
                    record.status = SessionStatus::FailedFinalValidation;
                }
            }
        }
        self.finish(record, started, None)
    }

    /// Apply and verify one unit, rolling back to its restore point on
    /// failure. A rollback failure is returned untouched.
    fn execute_unit(
        &self,
        unit: &mut ChangeUnit,
        timer: Instant,
        snapshots: &SnapshotManager,
        unit_rp: &str,
        health_floor: f64,
    ) -> Result<(), EngineError> {
        let applied = self.apply_unit(unit).and_then(|()| {
            let elapsed = timer.elapsed().as_secs();
            if elapsed > self.config.unit_timeout_secs {
                Err(EngineError::TimeoutExceeded {
                    unit: unit.id.clone(),
                    elapsed_secs: elapsed,
                    limit_secs: self.config.unit_timeout_secs,
                })
            } else {
                Ok(())
            }
        });

        let failure = match applied {
            Ok(()) => {
                unit.advance(ChangeStatus::Applied)?;
                match self.verify_unit(unit, health_floor) {
                    Ok(()) => {
                        unit.advance(ChangeStatus::Verified)?;
                        log::info!("unit {} verified", unit.id);
                        return Ok(());
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        log::warn!("unit {} failed ({}), rolling back", unit.id, failure);
        snapshots.rollback_to(unit_rp, self.revision.as_deref())?;
        unit.advance(ChangeStatus::Failed)?;
        unit.advance(ChangeStatus::RolledBack)?;
        Err(failure)
    }

    fn apply_unit(&self, unit: &ChangeUnit) -> Result<(), EngineError> {
        let target = unit
            .targets
            .first()
            .ok_or_else(|| EngineError::ApplyFailed {
                unit: unit.id.clone(),
                message: "unit has no target".to_string(),
            })?;
        let path = self.root.join(target);

        match &unit.op {
            EditOp::Replace { content } | EditOp::RewriteConfig { content } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, content)?;
            }
            EditOp::Insert { content } => {
                let mut existing = std::fs::read_to_string(&path).unwrap_or_default();
                existing.push_str(content);
                std::fs::write(&path, existing)?;
            }
            EditOp::PatchLine { line, content } => {
                let existing = std::fs::read_to_string(&path)?;
                let mut lines: Vec<&str> = existing.lines().collect();
                if *line == 0 || *line > lines.len() {
                    return Err(EngineError::ApplyFailed {
                        unit: unit.id.clone(),
                        message: format!(
                            "line {} out of range for {} ({} lines)",
                            line,
                            target.display(),
                            lines.len()
                        ),
                    });
                }
                lines[*line - 1] = content;
                let mut patched = lines.join("\n");
                if existing.ends_with('\n') {
                    patched.push('\n');
                }
                std::fs::write(&path, patched)?;
            }
            EditOp::UpdateManifest { content, install } => {
                std::fs::write(&path, content)?;
                if *install {
                    self.run_install_step(unit)?;
                }
            }
        }
        log::debug!("unit {} applied to {}", unit.id, target.display());
        Ok(())
    }

    fn run_install_step(&self, unit: &ChangeUnit) -> Result<(), EngineError> {
        let Some(command) = &self.config.install_command else {
            log::debug!("no install command configured, skipping install step");
            return Ok(());
        };
        let Some((program, args)) = command.split_first() else {
            return Ok(());
        };
        let status = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .status()
            .map_err(|e| EngineError::ApplyFailed {
                unit: unit.id.clone(),
                message: format!("install step failed to start: {e}"),
            })?;
        if !status.success() {
            return Err(EngineError::ApplyFailed {
                unit: unit.id.clone(),
                message: format!("install step exited with {status}"),
            });
        }
        Ok(())
    }

    /// Structural validity of every touched file, then a fresh analysis
    /// to confirm the health score has not regressed past the tolerance
    /// relative to the session's opening score.
    fn verify_unit(&self, unit: &ChangeUnit, health_floor: f64) -> Result<(), EngineError> {
        let mut issues = Vec::new();
        for target in &unit.targets {
            let path = self.root.join(target);
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    issues.push(format!("{}: unreadable after apply: {}", target.display(), e));
                    continue;
                }
            };
            if let Some(Err(message)) = self.registry.validate(&path, &content) {
                issues.push(format!("{}: {}", target.display(), message));
            }
        }
        if !issues.is_empty() {
            return Err(EngineError::VerificationFailed {
                unit: unit.id.clone(),
                issues,
            });
        }

        let analysis = analyze_tree(&self.root, Arc::clone(&self.registry), &self.config)?;
        let floor = health_floor - self.config.health_tolerance;
        if analysis.health_score < floor {
            return Err(EngineError::VerificationFailed {
                unit: unit.id.clone(),
                issues: vec![format!(
                    "health score {:.3} fell below {:.3}",
                    analysis.health_score, floor
                )],
            });
        }
        Ok(())
    }

    /// Whole-tree check after the last unit: no parse findings beyond
    /// those already present at session start, and the health floor
    /// still holds.
    fn final_validation(
        &self,
        health_floor: f64,
        baseline_findings: &BTreeSet<PathBuf>,
    ) -> Result<SystemAnalysis, EngineError> {
        let analysis = analyze_tree(&self.root, Arc::clone(&self.registry), &self.config)?;
        let introduced: Vec<&PathBuf> = analysis
            .findings
            .iter()
            .map(|f| &f.file)
            .filter(|file| !baseline_findings.contains(*file))
            .collect();
        if !introduced.is_empty() {
            return Err(EngineError::Analysis(format!(
                "{} files fail to parse after session",
                introduced.len()
            )));
        }
        let floor = health_floor - self.config.health_tolerance;
        if analysis.health_score < floor {
            return Err(EngineError::Analysis(format!(
                "health score {:.3} fell below {:.3}",
                analysis.health_score, floor
            )));
        }
        Ok(analysis)
    }

    fn current_revision(&self) -> Option<String> {
        let system = self.revision.as_ref()?;
        match system.current_revision() {
            Ok(revision) => Some(revision),
            Err(e) => {
                log::warn!("could not read current revision: {}", e);
                None
            }
        }
    }

    /// Stamp the record, journal it, and hand it back. Journal failures
    /// are logged, never fatal.
    fn finish(
        &self,
        mut record: SessionRecord,
        started: Instant,
        health_after: Option<f64>,
    ) -> Result<SessionRecord, EngineError> {
        record.finished_at = Some(Utc::now());
        record.duration_ms = started.elapsed().as_millis() as u64;
        record.health_after = health_after;

        let dir = self.root.join(".mendmap").join("sessions");
        let journal = dir.join(format!("{}.json", record.session_id));
        let write = std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::write(&journal, serde_json::to_vec_pretty(&record)?));
        if let Err(e) = write {
            log::warn!("could not journal session {}: {}", record.session_id, e);
        }

        log::info!(
            "session {} finished: {:?} in {}ms",
            record.session_id,
            record.status,
            record.duration_ms
        );
        Ok(record)
    }
}

fn outcome(
    unit: &ChangeUnit,
    restore_point: Option<String>,
    error: Option<String>,
    duration_ms: u64,
) -> UnitOutcome {
    UnitOutcome {
        unit_id: unit.id.clone(),
        description: unit.description.clone(),
        kind: unit.kind,
        status: unit.status,
        restore_point,
        error,
        duration_ms,
    }
}
