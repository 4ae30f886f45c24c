use crate::cli::OutputFormat;
use crate::config::load_config;
use crate::graph::find_all_usages;
use crate::parsers::ParserRegistry;
use crate::risk::{analyze_tree, SystemAnalysis};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn handle_analyze(path: PathBuf, format: OutputFormat, output: Option<PathBuf>) -> Result<()> {
    let analysis = run_analysis(&path)?;
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&analysis.report())?,
        OutputFormat::Terminal => render_terminal(&analysis),
    };
    emit(rendered, output)
}

pub fn handle_impact(path: PathBuf, component: String, format: OutputFormat) -> Result<()> {
    let analysis = run_analysis(&path)?;
    let impact = analysis
        .impact_analysis(&component)
        .with_context(|| format!("unknown component: {component}"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&impact)?),
        OutputFormat::Terminal => {
            println!("{} {}", "Component:".bold(), impact.component);
            println!(
                "  risk: {:.3} ({})",
                impact.risk_score,
                impact.risk_level.as_str()
            );
            println!("  direct dependents: {}", impact.direct_dependents.len());
            println!(
                "  transitive dependents: {}",
                impact.transitive_dependents.len()
            );
            println!("  critical paths involved: {}", impact.critical_paths.len());
            println!(
                "  change impact score: {}",
                format!("{:.3}", impact.change_impact_score).bold()
            );
        }
    }
    Ok(())
}

pub fn handle_usages(path: PathBuf, name: String) -> Result<()> {
    let config = load_config(&path);
    let usages = find_all_usages(&path, &config, &name)?;
    if usages.is_empty() {
        println!("no usages of {name} found");
        return Ok(());
    }
    for (file, line) in &usages {
        println!("{}:{}", file.display(), line);
    }
    println!("{} usages of {}", usages.len(), name);
    Ok(())
}

fn run_analysis(path: &Path) -> Result<SystemAnalysis> {
    let config = load_config(path);
    let registry = Arc::new(ParserRegistry::with_defaults());
    analyze_tree(path, registry, &config)
        .with_context(|| format!("failed to analyze {}", path.display()))
}

fn render_terminal(analysis: &SystemAnalysis) -> String {
    let report = analysis.report();
    let mut out = String::new();

    out.push_str(&format!("{}\n", "System map".bold()));
    out.push_str(&format!(
        "  components: {}  lines: {}  dependency edges: {}  depth: {}\n",
        report.total_components,
        report.total_lines,
        report.dependency_edges,
        report.dependency_depth
    ));

    let health = format!("{:.3}", report.health_score);
    let health = if report.health_score >= 0.8 {
        health.green()
    } else if report.health_score >= 0.6 {
        health.yellow()
    } else {
        health.red()
    };
    out.push_str(&format!("  health score: {health}\n"));

    if !report.critical_paths.is_empty() {
        out.push_str(&format!(
            "\n{} ({})\n",
            "Critical paths".bold(),
            report.critical_paths.len()
        ));
        for path in &report.critical_paths {
            out.push_str(&format!(
                "  {}  risk {:.3}  impact {:?}  entry {}\n",
                path.id,
                path.risk_score,
                path.failure_impact,
                path.entry_points.join(", ")
            ));
        }
    }

    if !report.high_risk_components.is_empty() {
        out.push_str(&format!("\n{}\n", "High-risk components".bold()));
        for id in &report.high_risk_components {
            if let Some(component) = analysis.components.get(id) {
                out.push_str(&format!(
                    "  {}  {:.3} ({})\n",
                    id,
                    component.risk_score,
                    component.risk_level.as_str()
                ));
            }
        }
    }

    if !report.parse_findings.is_empty() {
        out.push_str(&format!(
            "\n{} ({})\n",
            "Parse findings".red().bold(),
            report.parse_findings.len()
        ));
        for finding in &report.parse_findings {
            out.push_str(&format!("  {}: {}\n", finding.file.display(), finding.message));
        }
    }
    out
}

fn emit(rendered: String, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
