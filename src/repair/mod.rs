//! Safe repair: plans, decomposition, preflight, snapshots, and the
//! session orchestrator.

pub mod decomposer;
pub mod orchestrator;
pub mod plan;
pub mod preflight;
pub mod snapshot;

pub use decomposer::Decomposer;
pub use orchestrator::{CancelHandle, RepairOrchestrator, SessionGuard};
pub use plan::{PlannedEdit, RepairPlan};
pub use preflight::PreflightValidator;
pub use snapshot::SnapshotManager;
