//! Whole-tree analysis over synthetic projects.

use mendmap::config::EngineConfig;
use mendmap::parsers::ParserRegistry;
use mendmap::risk::analyze_tree;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/main.rs"),
        r#"use crate::store::save_record;
use crate::web::fetch_page;

fn main() {
    step_one();
}

fn step_one() {
    step_two();
}

fn step_two() {
    step_three();
}

fn step_three() {
    step_four();
}

fn step_four() {
    fetch_page();
    save_record();
}
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("src/store.rs"),
        "pub fn save_record() {}\n\npub fn query_db() {}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("src/web.rs"),
        "pub fn fetch_page() {}\n\npub fn http_request() {}\n",
    )
    .unwrap();
    fs::write(dir.path().join("settings.toml"), "limit = 1\n").unwrap();
    dir
}

#[test]
fn analysis_links_components_and_finds_a_critical_path() {
    let dir = project();
    let analysis = analyze_tree(
        dir.path(),
        Arc::new(ParserRegistry::with_defaults()),
        &EngineConfig::default(),
    )
    .unwrap();

    assert_eq!(analysis.components.len(), 4);
    let main = &analysis.components["src.main"];
    assert!(main.dependencies.contains("src.store"));
    assert!(main.dependencies.contains("src.web"));
    assert!(analysis.components["src.store"]
        .dependents
        .contains("src.main"));

    // main reaches step_one..step_four plus the two leaf calls: > 5 nodes.
    assert!(!analysis.critical_paths.is_empty());
    let path = &analysis.critical_paths[0];
    assert!(path.entry_points.contains(&"src.main.main".to_string()));
    assert!((0.0..=1.0).contains(&path.risk_score));

    assert!((0.0..=1.0).contains(&analysis.health_score));
    assert!(analysis.findings.is_empty());
}

#[test]
fn impact_reflects_dependents_and_critical_paths() {
    let dir = project();
    let analysis = analyze_tree(
        dir.path(),
        Arc::new(ParserRegistry::with_defaults()),
        &EngineConfig::default(),
    )
    .unwrap();

    let store = analysis.impact_analysis("src.store").unwrap();
    assert_eq!(store.direct_dependents, vec!["src.main".to_string()]);

    let main = analysis.impact_analysis("src.main").unwrap();
    assert!(main.direct_dependents.is_empty());
    // main sits on the critical path, so changing it carries more impact
    // than changing the leaf it calls into.
    assert!(!main.critical_paths.is_empty());
    assert!(main.change_impact_score > store.change_impact_score);
    assert!((0.0..=1.0).contains(&main.change_impact_score));
}

#[test]
fn report_serializes_to_json() {
    let dir = project();
    let analysis = analyze_tree(
        dir.path(),
        Arc::new(ParserRegistry::with_defaults()),
        &EngineConfig::default(),
    )
    .unwrap();

    let json = serde_json::to_value(analysis.report()).unwrap();
    assert_eq!(json["total_components"], 4);
    assert!(json["health_score"].is_number());
    assert!(json["components"]["src.main"]["risk_score"].is_number());
}
