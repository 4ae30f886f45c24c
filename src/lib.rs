// Export modules for library usage
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod graph;
pub mod io;
pub mod parsers;
pub mod repair;
pub mod resource;
pub mod revision;
pub mod risk;

// Re-export commonly used types
pub use crate::config::{load_config, EngineConfig, RiskWeights};
pub use crate::core::{
    ChangeKind, ChangeStatus, ChangeUnit, ComponentId, CriticalPath, EditOp, EngineError,
    FailureImpact, PreflightCheckResult, ResourceSample, RestorePoint, RiskLevel, SessionRecord,
    SessionStatus, SourceComponent, UnitOutcome,
};
pub use crate::graph::{CallGraph, DependencyGraph, GraphBuilder, ScanResult};
pub use crate::parsers::{ParserRegistry, StructuralParser};
pub use crate::repair::{
    CancelHandle, PlannedEdit, RepairOrchestrator, RepairPlan, SnapshotManager,
};
pub use crate::resource::{MetricsProvider, StaticMetricsProvider, SystemMetricsProvider};
pub use crate::revision::{GitRevision, RevisionSystem};
pub use crate::risk::{analyze_tree, ImpactAnalysis, RiskScorer, SystemAnalysis, SystemReport};
