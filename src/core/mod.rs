//! Core domain types shared across the engine.

pub mod errors;
pub mod ids;

pub use errors::EngineError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Identifier of one analyzable unit of the source tree, derived from its
/// path relative to the scan root (`src/graph/builder.rs` -> `src.graph.builder`).
pub type ComponentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a [0,1] risk score: low < 0.4, medium < 0.6, high < 0.8,
    /// critical >= 0.8.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// One component of the scanned tree, typically one file. Rebuilt from
/// scratch on every full analysis; never mutated outside a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceComponent {
    pub id: ComponentId,
    pub path: PathBuf,
    /// Non-blank line count.
    pub lines: usize,
    pub last_modified: DateTime<Utc>,
    pub dependencies: BTreeSet<ComponentId>,
    pub dependents: BTreeSet<ComponentId>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureImpact {
    Low,
    Medium,
    High,
    Catastrophic,
}

/// A reachable region of the call graph large enough to be treated as a
/// failure-amplifying chain. Read-only once computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPath {
    pub id: String,
    pub components: Vec<String>,
    pub entry_points: Vec<String>,
    pub exit_points: Vec<String>,
    pub risk_score: f64,
    pub failure_impact: FailureImpact,
    pub recovery_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    SourceEdit,
    ConfigEdit,
    DependencyEdit,
    SchemaMigration,
    EnvironmentEdit,
}

impl ChangeKind {
    /// Baseline risk contribution per kind of change.
    pub fn base_risk(&self) -> f64 {
        match self {
            ChangeKind::SourceEdit => 0.3,
            ChangeKind::ConfigEdit => 0.5,
            ChangeKind::EnvironmentEdit => 0.6,
            ChangeKind::DependencyEdit => 0.7,
            ChangeKind::SchemaMigration => 0.9,
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            ChangeKind::SourceEdit => "src",
            ChangeKind::ConfigEdit => "cfg",
            ChangeKind::DependencyEdit => "dep",
            ChangeKind::SchemaMigration => "mig",
            ChangeKind::EnvironmentEdit => "env",
        }
    }
}

/// Lifecycle of a change unit. The only legal forward path is
/// Planned -> Validated -> Applied -> Verified; failures divert to
/// Failed -> RolledBack, and RolledBack is reachable only from Applied
/// or Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Planned,
    Validated,
    Applied,
    Verified,
    Failed,
    RolledBack,
}

impl ChangeStatus {
    pub fn can_advance_to(self, next: ChangeStatus) -> bool {
        use ChangeStatus::*;
        matches!(
            (self, next),
            (Planned, Validated)
                | (Validated, Applied)
                | (Applied, Verified)
                | (Validated, Failed)
                | (Applied, Failed)
                | (Applied, RolledBack)
                | (Failed, RolledBack)
        )
    }
}

/// The concrete edit a change unit performs when applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    /// Replace the whole file with the given content.
    Replace { content: String },
    /// Append the given content after the current content.
    Insert { content: String },
    /// Replace a single 1-based line.
    PatchLine { line: usize, content: String },
    /// Full rewrite of a configuration file.
    RewriteConfig { content: String },
    /// Rewrite a dependency manifest, optionally running the install step.
    UpdateManifest { content: String, install: bool },
}

/// Smallest independently applicable, verifiable, and revertible edit.
/// Owned exclusively by the orchestrator for the duration of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeUnit {
    pub id: String,
    pub kind: ChangeKind,
    pub description: String,
    pub targets: Vec<PathBuf>,
    pub op: EditOp,
    /// Ids of units that must be applied before this one.
    pub depends_on: Vec<String>,
    pub estimated_risk: f64,
    pub status: ChangeStatus,
}

impl ChangeUnit {
    /// Move the unit forward in its lifecycle, rejecting skipped states.
    pub fn advance(&mut self, next: ChangeStatus) -> Result<(), EngineError> {
        if !self.status.can_advance_to(next) {
            return Err(EngineError::InvalidTransition {
                unit: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightCheckResult {
    pub name: String,
    pub passed: bool,
    pub risk_level: RiskLevel,
    pub blocking: bool,
    pub detail: String,
}

/// Point-in-time host resource reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_pct: f32,
    pub memory_pct: f32,
    pub disk_pct: f32,
    pub sampled_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub content: Vec<u8>,
    pub modified: DateTime<Utc>,
}

/// Immutable snapshot sufficient to undo all edits made since its
/// creation. Referenced, never mutated, after capture.
#[derive(Debug, Clone)]
pub struct RestorePoint {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub files: BTreeMap<PathBuf, FileSnapshot>,
    /// External revision handle, when a revision system is present.
    pub revision: Option<String>,
    pub metrics: ResourceSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Success,
    PartialFailed,
    FailedFinalValidation,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub unit_id: String,
    pub description: String,
    pub kind: ChangeKind,
    pub status: ChangeStatus,
    pub restore_point: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Terminal record of one repair session. Every session produces one,
/// regardless of how it ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub status: SessionStatus,
    pub health_before: f64,
    pub health_after: Option<f64>,
    pub outcomes: Vec<UnitOutcome>,
    pub restore_points: Vec<String>,
}

impl SessionRecord {
    pub fn new(session_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            started_at,
            finished_at: None,
            duration_ms: 0,
            status: SessionStatus::Running,
            health_before: 0.0,
            health_after: None,
            outcomes: Vec::new(),
            restore_points: Vec::new(),
        }
    }
}
