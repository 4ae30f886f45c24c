//! Dependency and call graphs over scanned components.

pub mod builder;
pub mod impact;

pub use builder::{GraphBuilder, ScanResult};
pub use impact::find_all_usages;

use crate::core::ComponentId;
use im::{HashMap, HashSet, Vector};
use petgraph::algo::condensation;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::collections::HashMap as StdHashMap;
use std::collections::VecDeque;
use std::path::PathBuf;

/// A non-fatal problem recorded during a scan, typically a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub file: PathBuf,
    pub message: String,
}

/// Directed multigraph of "references" relationships between components.
/// Nodes cover both scanned components and external modules they import;
/// cycles are allowed and condensed away when computing depth.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ComponentId, ()>,
    indices: StdHashMap<ComponentId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.indices.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.indices.insert(id.to_string(), idx);
        idx
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        let a = self.ensure_node(from);
        let b = self.ensure_node(to);
        self.graph.add_edge(a, b, ());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.indices.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Longest chain length in the cycle-condensed graph.
    pub fn dependency_depth(&self) -> usize {
        if self.graph.node_count() == 0 {
            return 0;
        }
        let dag = condensation(self.graph.clone(), true);
        let order = match petgraph::algo::toposort(&dag, None) {
            Ok(order) => order,
            Err(_) => return 0,
        };
        let mut depth = vec![0usize; dag.node_count()];
        let mut max_depth = 0;
        for idx in order {
            let here = depth[idx.index()];
            for succ in dag.neighbors(idx) {
                let candidate = here + 1;
                if candidate > depth[succ.index()] {
                    depth[succ.index()] = candidate;
                    max_depth = max_depth.max(candidate);
                }
            }
        }
        max_depth
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallNode {
    pub name: String,
    pub component: ComponentId,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
}

/// Directed graph of function-level call relationships over qualified
/// `component.function` names. Edge targets that were never defined in
/// the scan (external or method receivers) still participate as nodes.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: HashMap<String, CallNode>,
    edges: Vector<CallEdge>,
    callee_index: HashMap<String, HashSet<String>>,
    caller_index: HashMap<String, HashSet<String>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, name: String, component: ComponentId, line: usize) {
        let node = CallNode {
            name: name.clone(),
            component,
            line,
        };
        self.nodes.insert(name, node);
    }

    pub fn add_call(&mut self, caller: String, callee: String) {
        self.edges.push_back(CallEdge {
            caller: caller.clone(),
            callee: callee.clone(),
        });
        self.callee_index
            .entry(caller.clone())
            .or_default()
            .insert(callee.clone());
        self.caller_index.entry(callee).or_default().insert(caller);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn component_of(&self, name: &str) -> Option<&ComponentId> {
        self.nodes.get(name).map(|n| &n.component)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn out_degree(&self, name: &str) -> usize {
        self.callee_index.get(name).map_or(0, |set| set.len())
    }

    pub fn callees_of(&self, name: &str) -> Vec<String> {
        self.callee_index
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn callers_of(&self, name: &str) -> Vec<String> {
        self.caller_index
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every node reachable from `entry` by following call edges,
    /// excluding `entry` itself.
    pub fn reachable_from(&self, entry: &str) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(entry.to_string());
        while let Some(current) = queue.pop_front() {
            if let Some(callees) = self.callee_index.get(&current) {
                for callee in callees {
                    if callee != entry && seen.insert(callee.clone()) {
                        queue.push_back(callee.clone());
                    }
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_depth_linear_chain() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b");
        g.add_edge("b", "c");
        g.add_edge("c", "d");
        assert_eq!(g.dependency_depth(), 3);
    }

    #[test]
    fn dependency_depth_survives_cycles() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b");
        g.add_edge("b", "a");
        g.add_edge("b", "c");
        // a<->b condense into one node; one edge remains to c.
        assert_eq!(g.dependency_depth(), 1);
    }

    #[test]
    fn parallel_edges_are_kept() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b");
        g.add_edge("a", "b");
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn reachability_excludes_entry() {
        let mut g = CallGraph::new();
        g.add_function("m.start".into(), "m".into(), 1);
        g.add_function("m.step".into(), "m".into(), 5);
        g.add_call("m.start".into(), "m.step".into());
        g.add_call("m.step".into(), "db.query".into());

        let reach = g.reachable_from("m.start");
        assert!(reach.contains("m.step"));
        assert!(reach.contains("db.query"));
        assert!(!reach.contains("m.start"));
    }

    #[test]
    fn reachability_handles_call_cycles() {
        let mut g = CallGraph::new();
        g.add_call("a.f".into(), "a.g".into());
        g.add_call("a.g".into(), "a.f".into());
        let reach = g.reachable_from("a.f");
        assert_eq!(reach.len(), 1);
        assert!(reach.contains("a.g"));
    }
}
