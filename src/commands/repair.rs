use crate::config::load_config;
use crate::core::SessionStatus;
use crate::parsers::ParserRegistry;
use crate::repair::{Decomposer, RepairOrchestrator, RepairPlan};
use crate::revision::GitRevision;
use crate::risk::analyze_tree;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

pub fn handle_repair(path: PathBuf, plan_path: PathBuf, dry_run: bool) -> Result<()> {
    let config = load_config(&path);
    let plan = RepairPlan::from_json_file(&plan_path)
        .with_context(|| format!("failed to load plan {}", plan_path.display()))?;

    if dry_run {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let analysis = analyze_tree(&path, registry, &config)?;
        let units = Decomposer::new(&path, &config, Some(&analysis)).decompose(&plan)?;
        println!("{} ({} units)", "Dry run".bold(), units.len());
        for unit in &units {
            println!(
                "  {}  risk {:.3}  {}  -> {}",
                unit.id,
                unit.estimated_risk,
                unit.description,
                unit.targets
                    .iter()
                    .map(|t| t.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        return Ok(());
    }

    let mut orchestrator = RepairOrchestrator::new(&path, config);
    if let Some(revision) = GitRevision::discover(&path) {
        orchestrator = orchestrator.with_revision(Box::new(revision));
    }

    let record = orchestrator.run_session(&plan)?;

    let status = match record.status {
        SessionStatus::Success => "success".green().bold(),
        SessionStatus::PartialFailed => "partial failure (rolled back)".yellow().bold(),
        SessionStatus::FailedFinalValidation => {
            "failed final validation (session rolled back)".red().bold()
        }
        SessionStatus::Aborted => "aborted".red().bold(),
        SessionStatus::Running => "running".normal(),
    };
    println!("session {}: {}", record.session_id, status);
    println!(
        "  health: {:.3} -> {}",
        record.health_before,
        record
            .health_after
            .map(|h| format!("{h:.3}"))
            .unwrap_or_else(|| "n/a".to_string())
    );
    for outcome in &record.outcomes {
        let marker = match outcome.error {
            None => "ok".green(),
            Some(_) => "failed".red(),
        };
        println!(
            "  [{}] {}  {}  {}ms",
            marker, outcome.unit_id, outcome.description, outcome.duration_ms
        );
        if let Some(error) = &outcome.error {
            println!("        {error}");
        }
    }

    if record.status != SessionStatus::Success {
        anyhow::bail!("repair session did not complete successfully");
    }
    Ok(())
}
