//! Deterministic heuristic risk scoring over the scanned graphs.
//!
//! Path risk weighs call-name categories (network-like, persistence-like,
//! file-I/O-like) plus path length; component risk weighs dependent count,
//! size, modification recency, and critical-path involvement. The system
//! health score is 1 minus the mean component risk.

use crate::config::EngineConfig;
use crate::core::{
    ids, ComponentId, CriticalPath, EngineError, FailureImpact, RiskLevel, SourceComponent,
};
use crate::graph::builder::component_id;
use crate::graph::{CallGraph, DependencyGraph, Finding, GraphBuilder, ScanResult};
use crate::parsers::ParserRegistry;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ENTRY_POINT_HINTS: &[&str] = &[
    "main", "handler", "command", "callback", "start", "init", "process", "execute", "run",
    "webhook",
];
const NETWORK_HINTS: &[&str] = &["request", "http", "api", "fetch", "send"];
const PERSISTENCE_HINTS: &[&str] = &["db", "database", "query", "session", "store", "save"];
const FILE_IO_HINTS: &[&str] = &["file", "read", "write", "open"];

// Path-risk weights, fixed constants summing to 1.
const W_NETWORK: f64 = 0.3;
const W_PERSISTENCE: f64 = 0.3;
const W_FILE_IO: f64 = 0.2;
const W_LENGTH: f64 = 0.2;

/// Full analysis of a tree: scan output with risk fields populated,
/// critical paths, and the aggregate health score. Read-only once built.
#[derive(Debug, Clone)]
pub struct SystemAnalysis {
    pub root: PathBuf,
    pub components: BTreeMap<ComponentId, SourceComponent>,
    pub dependency_graph: DependencyGraph,
    pub call_graph: CallGraph,
    pub findings: Vec<Finding>,
    pub critical_paths: Vec<CriticalPath>,
    pub health_score: f64,
}

/// Impact of changing one component: who depends on it, which critical
/// paths involve it, and a combined change-impact score.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactAnalysis {
    pub component: ComponentId,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub direct_dependents: Vec<ComponentId>,
    pub transitive_dependents: Vec<ComponentId>,
    pub critical_paths: Vec<CriticalPath>,
    pub change_impact_score: f64,
}

pub struct RiskScorer<'a> {
    config: &'a EngineConfig,
}

impl<'a> RiskScorer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Consume a scan and produce the scored analysis. Risk fields are
    /// recomputed from scratch on every invocation.
    pub fn score(&self, scan: ScanResult) -> SystemAnalysis {
        let ScanResult {
            root,
            mut components,
            dependency_graph,
            call_graph,
            findings,
        } = scan;

        let critical_paths = self.identify_critical_paths(&call_graph);
        self.score_components(&mut components, &critical_paths);
        let health_score = health_score(&components);

        log::info!(
            "risk scoring complete: {} critical paths, health {:.3}",
            critical_paths.len(),
            health_score
        );

        SystemAnalysis {
            root,
            components,
            dependency_graph,
            call_graph,
            findings,
            critical_paths,
            health_score,
        }
    }

    fn identify_critical_paths(&self, call_graph: &CallGraph) -> Vec<CriticalPath> {
        let mut paths = Vec::new();
        for entry in find_entry_points(call_graph) {
            let reachable = call_graph.reachable_from(&entry);
            if reachable.len() <= self.config.critical_path_min_reach {
                continue;
            }
            let exit_points: Vec<String> = reachable
                .iter()
                .filter(|node| call_graph.out_degree(node) == 0)
                .cloned()
                .collect();
            let impact = assess_failure_impact(&entry);
            paths.push(CriticalPath {
                id: ids::short_hash(&format!("{}_{}", entry, reachable.len())),
                components: reachable.iter().cloned().collect(),
                entry_points: vec![entry.clone()],
                exit_points,
                risk_score: path_risk(&reachable),
                failure_impact: impact,
                recovery_secs: recovery_secs(impact),
            });
        }
        paths.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        paths
    }

    fn score_components(
        &self,
        components: &mut BTreeMap<ComponentId, SourceComponent>,
        critical_paths: &[CriticalPath],
    ) {
        let weights = &self.config.weights;
        let now = Utc::now();

        for component in components.values_mut() {
            let dependents_score = (component.dependents.len() as f64 / 10.0).min(1.0);
            let size_score = (component.lines as f64 / 1000.0).min(1.0);

            let days = (now - component.last_modified).num_days();
            let recency_score =
                (1.0 - days as f64 / self.config.recency_window_days as f64).clamp(0.0, 1.0);

            let path_score: f64 = critical_paths
                .iter()
                .filter(|cp| involves_component(cp, &component.id))
                .map(|cp| cp.risk_score)
                .sum::<f64>()
                .min(1.0);

            let risk = dependents_score * weights.dependents
                + size_score * weights.size
                + recency_score * weights.recency
                + path_score * weights.critical_paths;

            component.risk_score = round3(risk.clamp(0.0, 1.0));
            component.risk_level = RiskLevel::from_score(component.risk_score);
        }
    }
}

/// Scan and score a tree in one call.
pub fn analyze_tree(
    root: &Path,
    registry: Arc<ParserRegistry>,
    config: &EngineConfig,
) -> Result<SystemAnalysis, EngineError> {
    let scan = GraphBuilder::new(root, registry, config).scan()?;
    Ok(RiskScorer::new(config).score(scan))
}

fn find_entry_points(call_graph: &CallGraph) -> Vec<String> {
    let mut entries: Vec<String> = call_graph
        .node_names()
        .filter(|name| {
            let bare = name.rsplit('.').next().unwrap_or(name).to_lowercase();
            ENTRY_POINT_HINTS.iter().any(|hint| bare.contains(hint))
        })
        .cloned()
        .collect();
    entries.sort();
    entries
}

/// Weighted sum of normalized category counts plus normalized length,
/// capped to [0, 1].
fn path_risk(nodes: &BTreeSet<String>) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    let total = nodes.len() as f64;
    let count = |hints: &[&str]| {
        nodes
            .iter()
            .filter(|node| {
                let lower = node.to_lowercase();
                hints.iter().any(|hint| lower.contains(hint))
            })
            .count() as f64
            / total
    };

    let risk = count(NETWORK_HINTS) * W_NETWORK
        + count(PERSISTENCE_HINTS) * W_PERSISTENCE
        + count(FILE_IO_HINTS) * W_FILE_IO
        + (total / 100.0).min(1.0) * W_LENGTH;
    round3(risk.min(1.0))
}

fn assess_failure_impact(entry: &str) -> FailureImpact {
    let lower = entry.to_lowercase();
    if ["main", "start", "init"].iter().any(|k| lower.contains(k)) {
        FailureImpact::Catastrophic
    } else if ["handler", "process", "command"]
        .iter()
        .any(|k| lower.contains(k))
    {
        FailureImpact::High
    } else if ["callback", "helper", "util"].iter().any(|k| lower.contains(k)) {
        FailureImpact::Medium
    } else {
        FailureImpact::Low
    }
}

fn recovery_secs(impact: FailureImpact) -> u64 {
    match impact {
        FailureImpact::Catastrophic => 300,
        FailureImpact::High => 120,
        FailureImpact::Medium => 60,
        FailureImpact::Low => 30,
    }
}

fn involves_component(path: &CriticalPath, component: &str) -> bool {
    let prefix = format!("{component}.");
    path.components.iter().any(|node| node.starts_with(&prefix))
        || path
            .entry_points
            .iter()
            .any(|node| node.starts_with(&prefix))
}

/// 1 minus the mean component risk, in [0, 1]. An empty tree is healthy.
pub fn health_score(components: &BTreeMap<ComponentId, SourceComponent>) -> f64 {
    if components.is_empty() {
        return 1.0;
    }
    let total: f64 = components.values().map(|c| c.risk_score).sum();
    round3((1.0 - total / components.len() as f64).clamp(0.0, 1.0))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

impl SystemAnalysis {
    /// Component id for a path under this analysis root, if scanned.
    pub fn component_for_path(&self, path: &Path) -> Option<&SourceComponent> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let id = component_id(&self.root, &abs);
        self.components.get(&id)
    }

    /// Direct dependents, the transitive closure of dependents, involved
    /// critical paths, and a combined change-impact score.
    pub fn impact_analysis(&self, component: &str) -> Option<ImpactAnalysis> {
        let subject = self.components.get(component)?;

        let mut transitive: BTreeSet<ComponentId> = BTreeSet::new();
        let mut frontier: Vec<ComponentId> = subject.dependents.iter().cloned().collect();
        while let Some(current) = frontier.pop() {
            if !transitive.insert(current.clone()) {
                continue;
            }
            if let Some(c) = self.components.get(&current) {
                frontier.extend(c.dependents.iter().cloned());
            }
        }

        let involved: Vec<CriticalPath> = self
            .critical_paths
            .iter()
            .filter(|cp| involves_component(cp, component))
            .cloned()
            .collect();

        let dependent_score = (subject.dependents.len() as f64 / 10.0).min(1.0);
        let path_share = if self.critical_paths.is_empty() {
            0.0
        } else {
            involved.len() as f64 / self.critical_paths.len() as f64
        };
        let impact =
            round3(dependent_score * 0.4 + path_share * 0.4 + subject.risk_score * 0.2);

        Some(ImpactAnalysis {
            component: component.to_string(),
            risk_level: subject.risk_level,
            risk_score: subject.risk_score,
            direct_dependents: subject.dependents.iter().cloned().collect(),
            transitive_dependents: transitive.into_iter().collect(),
            critical_paths: involved,
            change_impact_score: impact,
        })
    }

    /// Components at high or critical risk, highest score first.
    pub fn high_risk_components(&self) -> Vec<&SourceComponent> {
        let mut high: Vec<&SourceComponent> = self
            .components
            .values()
            .filter(|c| c.risk_level >= RiskLevel::High)
            .collect();
        high.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        high
    }

    pub fn report(&self) -> SystemReport {
        let total_loc: usize = self.components.values().map(|c| c.lines).sum();
        let total = self.components.len();
        let edges = self.dependency_graph.edge_count();
        SystemReport {
            generated_at: Utc::now().to_rfc3339(),
            root: self.root.clone(),
            total_components: total,
            total_lines: total_loc,
            dependency_edges: edges,
            dependency_depth: self.dependency_graph.dependency_depth(),
            dependency_ratio: round3(edges as f64 / total.max(1) as f64),
            health_score: self.health_score,
            critical_paths: self.critical_paths.clone(),
            high_risk_components: self
                .high_risk_components()
                .into_iter()
                .map(|c| c.id.clone())
                .collect(),
            parse_findings: self.findings.clone(),
            components: self.components.clone(),
        }
    }
}

/// JSON-serializable system map produced by `analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub generated_at: String,
    pub root: PathBuf,
    pub total_components: usize,
    pub total_lines: usize,
    pub dependency_edges: usize,
    pub dependency_depth: usize,
    pub dependency_ratio: f64,
    pub health_score: f64,
    pub critical_paths: Vec<CriticalPath>,
    pub high_risk_components: Vec<ComponentId>,
    pub parse_findings: Vec<Finding>,
    pub components: BTreeMap<ComponentId, SourceComponent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn component(id: &str, lines: usize, dependents: &[&str]) -> SourceComponent {
        SourceComponent {
            id: id.to_string(),
            path: PathBuf::from(format!("{id}.rs")),
            lines,
            last_modified: Utc::now() - Duration::days(90),
            dependencies: BTreeSet::new(),
            dependents: dependents.iter().map(|s| s.to_string()).collect(),
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
        }
    }

    #[test]
    fn entry_points_found_by_name_heuristics() {
        let mut g = CallGraph::new();
        g.add_function("app.main".into(), "app".into(), 1);
        g.add_function("app.helper_fn".into(), "app".into(), 5);
        g.add_function("web.on_webhook".into(), "web".into(), 1);
        let entries = find_entry_points(&g);
        assert!(entries.contains(&"app.main".to_string()));
        assert!(entries.contains(&"web.on_webhook".to_string()));
        assert!(!entries.contains(&"app.helper_fn".to_string()));
    }

    #[test]
    fn path_risk_is_bounded_and_keyword_sensitive() {
        let risky: BTreeSet<String> = ["a.db_query", "a.http_request", "a.write_file"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let calm: BTreeSet<String> =
            ["a.format", "a.compute"].iter().map(|s| s.to_string()).collect();
        let risky_score = path_risk(&risky);
        let calm_score = path_risk(&calm);
        assert!(risky_score > calm_score);
        assert!((0.0..=1.0).contains(&risky_score));
        assert!((0.0..=1.0).contains(&calm_score));
    }

    #[test]
    fn short_reach_does_not_register_critical_path() {
        let config = EngineConfig::default();
        let mut g = CallGraph::new();
        g.add_function("app.main".into(), "app".into(), 1);
        g.add_call("app.main".into(), "app.step".into());
        let paths = RiskScorer::new(&config).identify_critical_paths(&g);
        assert!(paths.is_empty());
    }

    #[test]
    fn long_reach_registers_critical_path() {
        let config = EngineConfig::default();
        let mut g = CallGraph::new();
        g.add_function("app.main".into(), "app".into(), 1);
        for i in 0..6 {
            g.add_call(format!("app.step{i}"), format!("app.step{}", i + 1));
        }
        g.add_call("app.main".into(), "app.step0".into());
        let paths = RiskScorer::new(&config).identify_critical_paths(&g);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].entry_points, vec!["app.main".to_string()]);
        assert_eq!(paths[0].failure_impact, FailureImpact::Catastrophic);
        assert_eq!(paths[0].recovery_secs, 300);
    }

    #[test]
    fn recently_modified_components_score_higher() {
        let config = EngineConfig::default();
        let scorer = RiskScorer::new(&config);
        let mut components = BTreeMap::new();
        let mut fresh = component("fresh", 100, &[]);
        fresh.last_modified = Utc::now();
        components.insert("fresh".to_string(), fresh);
        components.insert("stale".to_string(), component("stale", 100, &[]));

        scorer.score_components(&mut components, &[]);
        assert!(components["fresh"].risk_score > components["stale"].risk_score);
    }

    #[test]
    fn health_is_one_minus_mean_risk() {
        let mut components = BTreeMap::new();
        let mut a = component("a", 0, &[]);
        a.risk_score = 0.2;
        let mut b = component("b", 0, &[]);
        b.risk_score = 0.6;
        components.insert("a".to_string(), a);
        components.insert("b".to_string(), b);
        assert!((health_score(&components) - 0.6).abs() < 1e-9);
        assert_eq!(health_score(&BTreeMap::new()), 1.0);
    }

    #[test]
    fn impact_analysis_walks_transitive_dependents() {
        let mut components = BTreeMap::new();
        components.insert("base".to_string(), component("base", 10, &["mid"]));
        components.insert("mid".to_string(), component("mid", 10, &["top"]));
        components.insert("top".to_string(), component("top", 10, &[]));

        let analysis = SystemAnalysis {
            root: PathBuf::from("/proj"),
            components,
            dependency_graph: DependencyGraph::new(),
            call_graph: CallGraph::new(),
            findings: vec![],
            critical_paths: vec![],
            health_score: 1.0,
        };

        let impact = analysis.impact_analysis("base").unwrap();
        assert_eq!(impact.direct_dependents, vec!["mid".to_string()]);
        assert_eq!(
            impact.transitive_dependents,
            vec!["mid".to_string(), "top".to_string()]
        );
        assert!(analysis.impact_analysis("missing").is_none());
    }
}
