//! Decomposition of a repair plan into ordered change units.
//!
//! Each planned edit becomes one unit. Ordering constraints are derived
//! from edit kinds (manifests before source, configuration before source
//! files that read it) and resolved with a risk-ascending topological sort.

use super::plan::RepairPlan;
use crate::config::EngineConfig;
use crate::core::{ids, ChangeKind, ChangeStatus, ChangeUnit, EngineError};
use crate::risk::SystemAnalysis;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::Path;

pub struct Decomposer<'a> {
    root: &'a Path,
    config: &'a EngineConfig,
    analysis: Option<&'a SystemAnalysis>,
}

impl<'a> Decomposer<'a> {
    pub fn new(
        root: &'a Path,
        config: &'a EngineConfig,
        analysis: Option<&'a SystemAnalysis>,
    ) -> Self {
        Self {
            root,
            config,
            analysis,
        }
    }

    /// Produce the execution-ordered unit list for `plan`.
    pub fn decompose(&self, plan: &RepairPlan) -> Result<Vec<ChangeUnit>, EngineError> {
        let mut units: Vec<ChangeUnit> = plan
            .edits
            .iter()
            .map(|edit| {
                let id = format!(
                    "{}_{}",
                    edit.kind.id_prefix(),
                    ids::short_hash(&format!("{}{}", edit.target.display(), edit.description))
                );
                ChangeUnit {
                    id,
                    kind: edit.kind,
                    description: edit.description.clone(),
                    targets: vec![edit.target.clone()],
                    op: edit.op.clone(),
                    depends_on: Vec::new(),
                    estimated_risk: self.estimate_risk(edit.kind, &edit.target),
                    status: ChangeStatus::Planned,
                }
            })
            .collect();

        self.wire_dependencies(&mut units);
        order_units(units)
    }

    /// Baseline kind risk, bumped for critical file names and by the
    /// analyzed change-impact score of the touched component.
    fn estimate_risk(&self, kind: ChangeKind, target: &Path) -> f64 {
        let mut risk = kind.base_risk();

        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if self
            .config
            .critical_file_patterns
            .iter()
            .any(|pattern| stem.contains(pattern))
        {
            risk += 0.2;
        }

        if let Some(analysis) = self.analysis {
            if let Some(component) = analysis.component_for_path(target) {
                if let Some(impact) = analysis.impact_analysis(&component.id) {
                    risk += 0.3 * impact.change_impact_score;
                }
            }
        }

        (risk.min(1.0) * 1000.0).round() / 1000.0
    }

    /// Kind-derived ordering edges: every dependency edit precedes every
    /// source edit, and a configuration edit precedes a source edit whose
    /// current content mentions the config file's stem.
    fn wire_dependencies(&self, units: &mut [ChangeUnit]) {
        let manifest_ids: Vec<String> = units
            .iter()
            .filter(|u| u.kind == ChangeKind::DependencyEdit)
            .map(|u| u.id.clone())
            .collect();

        let config_units: Vec<(String, String)> = units
            .iter()
            .filter(|u| u.kind == ChangeKind::ConfigEdit)
            .filter_map(|u| {
                u.targets
                    .first()
                    .and_then(|t| t.file_stem())
                    .map(|stem| (u.id.clone(), stem.to_string_lossy().to_lowercase()))
            })
            .collect();

        for unit in units.iter_mut() {
            if unit.kind != ChangeKind::SourceEdit {
                continue;
            }
            unit.depends_on.extend(manifest_ids.iter().cloned());

            let Some(target) = unit.targets.first() else {
                continue;
            };
            let content = std::fs::read_to_string(self.root.join(target)).unwrap_or_default();
            let lower = content.to_lowercase();
            for (config_id, stem) in &config_units {
                if lower.contains(stem.as_str()) {
                    unit.depends_on.push(config_id.clone());
                }
            }
        }
    }
}

#[derive(PartialEq)]
struct RiskKey(f64, String);

impl Eq for RiskKey {}

impl PartialOrd for RiskKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0).then_with(|| self.1.cmp(&other.1))
    }
}

/// Kahn's algorithm with a min-heap keyed on estimated risk, so among
/// ready units the safest runs first. A cycle in `depends_on` is a plan
/// authoring error.
fn order_units(units: Vec<ChangeUnit>) -> Result<Vec<ChangeUnit>, EngineError> {
    let mut by_id: HashMap<String, ChangeUnit> = HashMap::new();
    let mut indegree: HashMap<String, usize> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    for unit in &units {
        indegree.insert(unit.id.clone(), unit.depends_on.len());
        for dep in &unit.depends_on {
            dependents
                .entry(dep.clone())
                .or_default()
                .push(unit.id.clone());
        }
    }
    for unit in units {
        by_id.insert(unit.id.clone(), unit);
    }

    let mut ready: BinaryHeap<Reverse<RiskKey>> = BinaryHeap::new();
    for (id, &deg) in &indegree {
        if deg == 0 {
            ready.push(Reverse(RiskKey(by_id[id].estimated_risk, id.clone())));
        }
    }

    let mut ordered = Vec::with_capacity(by_id.len());
    while let Some(Reverse(RiskKey(_, id))) = ready.pop() {
        for dependent in dependents.remove(&id).unwrap_or_default() {
            if let Some(deg) = indegree.get_mut(&dependent) {
                *deg -= 1;
                if *deg == 0 {
                    ready.push(Reverse(RiskKey(
                        by_id[&dependent].estimated_risk,
                        dependent,
                    )));
                }
            }
        }
        if let Some(unit) = by_id.remove(&id) {
            ordered.push(unit);
        }
    }

    if !by_id.is_empty() {
        let mut stuck: Vec<String> = by_id.into_keys().collect();
        stuck.sort();
        return Err(EngineError::Configuration(format!(
            "dependency cycle among units: {}",
            stuck.join(", ")
        )));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EditOp;
    use crate::repair::plan::PlannedEdit;
    use std::fs;
    use std::path::PathBuf;

    fn edit(kind: ChangeKind, target: &str, description: &str) -> PlannedEdit {
        PlannedEdit {
            kind,
            target: PathBuf::from(target),
            description: description.to_string(),
            op: EditOp::Replace {
                content: "x = 1".to_string(),
            },
        }
    }

    fn decompose(root: &Path, edits: Vec<PlannedEdit>) -> Vec<ChangeUnit> {
        let config = EngineConfig::default();
        let plan = RepairPlan {
            description: "test".into(),
            edits,
        };
        Decomposer::new(root, &config, None)
            .decompose(&plan)
            .unwrap()
    }

    #[test]
    fn one_unit_per_edit_with_kind_prefixed_ids() {
        let dir = tempfile::tempdir().unwrap();
        let units = decompose(
            dir.path(),
            vec![
                edit(ChangeKind::SourceEdit, "a.rs", "edit a"),
                edit(ChangeKind::SchemaMigration, "schema.sql", "migrate"),
            ],
        );
        assert_eq!(units.len(), 2);
        assert!(units.iter().any(|u| u.id.starts_with("src_")));
        assert!(units.iter().any(|u| u.id.starts_with("mig_")));
    }

    #[test]
    fn dependency_edits_run_before_source_edits() {
        let dir = tempfile::tempdir().unwrap();
        let units = decompose(
            dir.path(),
            vec![
                edit(ChangeKind::SourceEdit, "a.rs", "edit a"),
                edit(ChangeKind::DependencyEdit, "Cargo.toml", "bump dep"),
            ],
        );
        assert_eq!(units[0].kind, ChangeKind::DependencyEdit);
        assert_eq!(units[1].kind, ChangeKind::SourceEdit);
        assert_eq!(units[1].depends_on, vec![units[0].id.clone()]);
    }

    #[test]
    fn config_edit_precedes_source_that_reads_it() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("reader.rs"),
            "fn load() { read(\"settings.toml\"); }\n",
        )
        .unwrap();
        let units = decompose(
            dir.path(),
            vec![
                edit(ChangeKind::SourceEdit, "reader.rs", "edit reader"),
                edit(ChangeKind::ConfigEdit, "settings.toml", "rewrite settings"),
            ],
        );
        assert_eq!(units[0].kind, ChangeKind::ConfigEdit);
        assert!(units[1].depends_on.contains(&units[0].id));
    }

    #[test]
    fn independent_units_order_by_ascending_risk() {
        let dir = tempfile::tempdir().unwrap();
        let units = decompose(
            dir.path(),
            vec![
                edit(ChangeKind::SchemaMigration, "schema.sql", "migrate"),
                edit(ChangeKind::EnvironmentEdit, "service.env", "tweak env"),
                edit(ChangeKind::SourceEdit, "a.rs", "edit a"),
            ],
        );
        let risks: Vec<f64> = units.iter().map(|u| u.estimated_risk).collect();
        assert!(risks.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(units[0].kind, ChangeKind::SourceEdit);
        assert_eq!(units[2].kind, ChangeKind::SchemaMigration);
    }

    #[test]
    fn critical_file_names_raise_risk() {
        let dir = tempfile::tempdir().unwrap();
        let units = decompose(
            dir.path(),
            vec![
                edit(ChangeKind::SourceEdit, "src/main.rs", "edit main"),
                edit(ChangeKind::SourceEdit, "src/util.rs", "edit util"),
            ],
        );
        let main = units.iter().find(|u| u.targets[0].ends_with("main.rs")).unwrap();
        let util = units.iter().find(|u| u.targets[0].ends_with("util.rs")).unwrap();
        assert!(main.estimated_risk > util.estimated_risk);
    }

    #[test]
    fn cycle_in_dependencies_is_an_error() {
        let units = vec![
            ChangeUnit {
                id: "src_a".into(),
                kind: ChangeKind::SourceEdit,
                description: "a".into(),
                targets: vec![PathBuf::from("a.rs")],
                op: EditOp::Insert {
                    content: String::new(),
                },
                depends_on: vec!["src_b".into()],
                estimated_risk: 0.3,
                status: ChangeStatus::Planned,
            },
            ChangeUnit {
                id: "src_b".into(),
                kind: ChangeKind::SourceEdit,
                description: "b".into(),
                targets: vec![PathBuf::from("b.rs")],
                op: EditOp::Insert {
                    content: String::new(),
                },
                depends_on: vec!["src_a".into()],
                estimated_risk: 0.3,
                status: ChangeStatus::Planned,
            },
        ];
        assert!(order_units(units).is_err());
    }
}
