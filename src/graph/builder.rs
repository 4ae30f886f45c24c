//! Source-tree scanning: one component per matching file, dependency
//! edges from imports, call edges from function bodies.

use super::{CallGraph, DependencyGraph, Finding};
use crate::config::EngineConfig;
use crate::core::{ComponentId, EngineError, RiskLevel, SourceComponent};
use crate::io::{count_nonblank_lines, FileWalker};
use crate::parsers::{ParsedSource, ParserRegistry};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable result of one full scan. Published to the risk scorer and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub root: PathBuf,
    pub components: BTreeMap<ComponentId, SourceComponent>,
    pub dependency_graph: DependencyGraph,
    pub call_graph: CallGraph,
    pub findings: Vec<Finding>,
}

pub struct GraphBuilder {
    root: PathBuf,
    registry: Arc<ParserRegistry>,
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
}

struct FileScan {
    id: ComponentId,
    path: PathBuf,
    lines: usize,
    last_modified: DateTime<Utc>,
    parsed: Option<ParsedSource>,
    finding: Option<Finding>,
}

impl GraphBuilder {
    pub fn new(root: &Path, registry: Arc<ParserRegistry>, config: &EngineConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            registry,
            extensions: config.extensions.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }

    /// Scan the tree and build both graphs. Parsing runs on parallel
    /// workers; per-file parse failures become findings, never errors.
    pub fn scan(&self) -> Result<ScanResult, EngineError> {
        let files = FileWalker::new(self.root.clone())
            .with_extensions(self.extensions.clone())
            .with_ignore_patterns(self.ignore_patterns.clone())
            .walk()
            .map_err(|e| EngineError::Analysis(e.to_string()))?;

        log::debug!("scanning {} files under {}", files.len(), self.root.display());

        let scans: Vec<Option<FileScan>> = files
            .par_iter()
            .map(|path| self.scan_file(path))
            .collect();

        let mut components: BTreeMap<ComponentId, SourceComponent> = BTreeMap::new();
        let mut findings = Vec::new();
        let mut scanned = Vec::new();

        for scan in scans.into_iter().flatten() {
            if let Some(finding) = &scan.finding {
                findings.push(finding.clone());
            }
            components.insert(
                scan.id.clone(),
                SourceComponent {
                    id: scan.id.clone(),
                    path: scan.path.clone(),
                    lines: scan.lines,
                    last_modified: scan.last_modified,
                    dependencies: BTreeSet::new(),
                    dependents: BTreeSet::new(),
                    risk_score: 0.0,
                    risk_level: RiskLevel::Low,
                },
            );
            scanned.push(scan);
        }

        let mut dependency_graph = DependencyGraph::new();
        let mut call_graph = CallGraph::new();
        let ids: Vec<ComponentId> = components.keys().cloned().collect();

        for scan in &scanned {
            dependency_graph.ensure_node(&scan.id);
            let Some(parsed) = &scan.parsed else {
                continue;
            };

            for import in &parsed.imports {
                match resolve_import(import, &ids) {
                    Some(target) if target != scan.id => {
                        dependency_graph.add_edge(&scan.id, &target);
                        if let Some(c) = components.get_mut(&scan.id) {
                            c.dependencies.insert(target.clone());
                        }
                        if let Some(c) = components.get_mut(&target) {
                            c.dependents.insert(scan.id.clone());
                        }
                    }
                    Some(_) => {}
                    None => {
                        if let Some(head) = import.split('.').next() {
                            dependency_graph.add_edge(&scan.id, head);
                        }
                    }
                }
            }

            for function in &parsed.functions {
                let qualified = format!("{}.{}", scan.id, function.name);
                call_graph.add_function(qualified.clone(), scan.id.clone(), function.line);
                for call in &function.calls {
                    let callee = if call.contains('.') {
                        call.clone()
                    } else {
                        format!("{}.{}", scan.id, call)
                    };
                    call_graph.add_call(qualified.clone(), callee);
                }
            }
        }

        log::info!(
            "scan complete: {} components, {} dependency edges, {} call-graph nodes, {} findings",
            components.len(),
            dependency_graph.edge_count(),
            call_graph.node_count(),
            findings.len()
        );

        Ok(ScanResult {
            root: self.root.clone(),
            components,
            dependency_graph,
            call_graph,
            findings,
        })
    }

    fn scan_file(&self, path: &Path) -> Option<FileScan> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("could not read {}: {}", path.display(), e);
                return None;
            }
        };

        let last_modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let id = component_id(&self.root, path);
        let (parsed, finding) = match self.registry.for_path(path) {
            Some(parser) => match parser.parse(&content) {
                Ok(parsed) => (Some(parsed), None),
                Err(message) => (
                    None,
                    Some(Finding {
                        file: path.to_path_buf(),
                        message,
                    }),
                ),
            },
            None => (None, None),
        };

        Some(FileScan {
            id,
            path: path.to_path_buf(),
            lines: count_nonblank_lines(&content),
            last_modified,
            parsed,
            finding,
        })
    }
}

/// Path-derived component id, unique per scan: relative path with
/// separators replaced by dots and the extension stripped.
pub fn component_id(root: &Path, path: &Path) -> ComponentId {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let no_ext = rel.with_extension("");
    no_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Resolve a dotted import to a scanned component. Leading `crate`,
/// `self`, and `super` segments are dropped, then progressively shorter
/// prefixes are matched against component-id suffixes (imports usually
/// name an item inside the module, not the module itself).
fn resolve_import(import: &str, ids: &[ComponentId]) -> Option<ComponentId> {
    let segments: Vec<&str> = import
        .split('.')
        .skip_while(|s| matches!(*s, "crate" | "self" | "super"))
        .collect();
    if segments.is_empty() {
        return None;
    }

    for take in (1..=segments.len()).rev() {
        let candidate = segments[..take].join(".");
        for id in ids {
            if id == &candidate || id.ends_with(&format!(".{candidate}")) {
                return Some(id.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::fs;

    fn scan(dir: &Path) -> ScanResult {
        let config = EngineConfig::default();
        GraphBuilder::new(dir, Arc::new(ParserRegistry::with_defaults()), &config)
            .scan()
            .unwrap()
    }

    #[test]
    fn component_ids_are_path_derived() {
        let root = PathBuf::from("/proj");
        assert_eq!(
            component_id(&root, &root.join("src/graph/builder.rs")),
            "src.graph.builder"
        );
    }

    #[test]
    fn scan_links_imports_between_components() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/store.rs"),
            "pub fn save() {}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("src/api.rs"),
            indoc! {r#"
                use crate::store::save;
                fn handler() {
                    save();
                }
            "#},
        )
        .unwrap();

        let result = scan(dir.path());
        let api = &result.components["src.api"];
        assert!(api.dependencies.contains("src.store"));
        let store = &result.components["src.store"];
        assert!(store.dependents.contains("src.api"));
    }

    #[test]
    fn scan_builds_call_graph_with_qualified_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("app.rs"),
            indoc! {r#"
                fn handler() {
                    process();
                }
                fn process() {}
            "#},
        )
        .unwrap();

        let result = scan(dir.path());
        assert!(result.call_graph.contains("app.handler"));
        assert!(result.call_graph.contains("app.process"));
        assert_eq!(
            result.call_graph.callees_of("app.handler"),
            vec!["app.process".to_string()]
        );
    }

    #[test]
    fn parse_failure_is_a_finding_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.rs"), "fn ok() {}\n").unwrap();
        fs::write(dir.path().join("bad.rs"), "fn broken( {\n").unwrap();

        let result = scan(dir.path());
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].file.ends_with("bad.rs"));
        // The broken file is still tracked as a component.
        assert!(result.components.contains_key("bad"));
        assert!(result.components.contains_key("good"));
    }

    #[test]
    fn external_imports_become_graph_nodes_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "use serde::Serialize;\n").unwrap();

        let result = scan(dir.path());
        assert!(result.dependency_graph.contains("serde"));
        assert!(!result.components.contains_key("serde"));
        assert!(result.components["a"].dependencies.is_empty());
    }
}
