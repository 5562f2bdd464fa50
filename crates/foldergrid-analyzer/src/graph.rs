//! Folder dependency graph.
//!
//! Edges read "`from` depends on `to`". Insertion refuses any edge that
//! would close a cycle, so a graph built through `add_edge` is always a DAG
//! and `topological_order` only fails on graphs loaded with `from_map`.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AnalyzerError, AnalyzerResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a stored dependency map as-is, cycles included.
    pub fn from_map(map: &BTreeMap<String, Vec<String>>) -> Self {
        let mut graph = Self::new();
        for (from, deps) in map {
            graph.add_node(from);
            for to in deps {
                graph.add_node(to);
                graph.edges.entry(from.clone()).or_default().insert(to.clone());
            }
        }
        graph
    }

    pub fn add_node(&mut self, node: &str) {
        self.edges.entry(node.to_string()).or_default();
    }

    /// Insert `from → to`. Returns a conflict description instead when the
    /// edge would close a cycle; the graph is left unchanged in that case.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Option<String> {
        if from == to || self.reaches(to, from) {
            return Some(format!("{from} -> {to} would close a dependency cycle"));
        }
        self.add_node(to);
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        None
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|deps| deps.contains(to))
    }

    pub fn dependencies(&self, node: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(node)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    fn reaches(&self, start: &str, target: &str) -> bool {
        let mut stack = vec![start];
        let mut seen = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if seen.insert(node) {
                stack.extend(self.dependencies(node));
            }
        }
        false
    }

    /// Nodes ordered so every dependency precedes its dependents.
    ///
    /// Ties are broken by name so the order is stable.
    pub fn topological_order(&self) -> AnalyzerResult<Vec<String>> {
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (node, deps) in &self.edges {
            pending.insert(node, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(node);
            }
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(pending.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());
            for dependent in dependents.get(node).into_iter().flatten() {
                if let Some(n) = pending.get_mut(dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() < pending.len() {
            let stuck = pending
                .iter()
                .find(|(_, n)| **n > 0)
                .map(|(node, _)| node.to_string())
                .unwrap_or_default();
            return Err(AnalyzerError::Cycle(stuck));
        }
        Ok(order)
    }

    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.edges
            .iter()
            .map(|(node, deps)| (node.clone(), deps.iter().cloned().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_closing_a_cycle_is_suppressed() {
        let mut g = DependencyGraph::new();
        assert!(g.add_edge("shop", "shop/api").is_none());
        assert!(g.add_edge("shop", "shop/web").is_none());
        assert!(g.add_edge("shop/web", "shop/api").is_none());

        assert!(g.add_edge("shop/api", "shop/web").is_some());
        assert!(g.add_edge("shop/web", "shop/web").is_some());
        // back to the ancestor
        assert!(g.add_edge("shop/api", "shop").is_some());
        assert!(!g.contains_edge("shop/api", "shop"));
        assert!(!g.contains_edge("shop/api", "shop/web"));
    }

    #[test]
    fn mutual_reference_keeps_first_edge_only() {
        let mut g = DependencyGraph::new();
        assert!(g.add_edge("a", "b").is_none());
        assert!(g.add_edge("b", "a").is_some());
        assert!(g.contains_edge("a", "b"));
        assert!(!g.contains_edge("b", "a"));
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let mut g = DependencyGraph::new();
        g.add_edge("shop", "shop/web");
        g.add_edge("shop", "shop/api");
        g.add_edge("shop", "shop/db");
        g.add_edge("shop/web", "shop/api");
        g.add_edge("shop/api", "shop/db");

        let order = g.topological_order().unwrap();
        assert_eq!(order, vec!["shop/db", "shop/api", "shop/web", "shop"]);
    }

    #[test]
    fn loaded_cycle_is_rejected() {
        let map = BTreeMap::from([
            ("a".to_string(), vec!["b".to_string()]),
            ("b".to_string(), vec!["a".to_string()]),
        ]);
        let err = DependencyGraph::from_map(&map).topological_order().unwrap_err();
        assert!(matches!(err, AnalyzerError::Cycle(_)));
    }

    #[test]
    fn map_round_trip_keeps_leaf_nodes() {
        let mut g = DependencyGraph::new();
        g.add_edge("x", "y");
        let map = g.to_map();
        assert_eq!(map["y"], Vec::<String>::new());
        assert_eq!(DependencyGraph::from_map(&map), g);
    }
}
