//! Component wiring and topological ordering.

use std::collections::{BTreeMap, BTreeSet};

use swp_diag::SimError;

/// A directed acyclic graph over component IDs, with a cached topological
/// order.
///
/// Ties during the sort are broken by lexicographic ID, so the same edge
/// set always yields the same order — required for the harness's
/// byte-identical-reruns determinism property.
#[derive(Debug, Clone)]
pub struct Topology {
    order: Vec<String>,
    predecessors: BTreeMap<String, Vec<String>>,
    successors: BTreeMap<String, Vec<String>>,
}

impl Topology {
    /// Builds a topology from `node_ids` and `edges` (each `(upstream,
    /// downstream)`).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::CycleDetected`] if the edge set is not a DAG,
    /// naming one component ID known to participate in the cycle.
    pub fn build(node_ids: &[String], edges: &[(String, String)]) -> Result<Self, SimError> {
        let mut predecessors: BTreeMap<String, Vec<String>> =
            node_ids.iter().map(|id| (id.clone(), Vec::new())).collect();
        let mut successors: BTreeMap<String, Vec<String>> =
            node_ids.iter().map(|id| (id.clone(), Vec::new())).collect();
        let mut in_degree: BTreeMap<String, usize> =
            node_ids.iter().map(|id| (id.clone(), 0)).collect();

        for (upstream, downstream) in edges {
            successors.entry(upstream.clone()).or_default().push(downstream.clone());
            predecessors.entry(downstream.clone()).or_default().push(upstream.clone());
            *in_degree.entry(downstream.clone()).or_insert(0) += 1;
        }

        // Kahn's algorithm, lexicographic tie-break via a sorted frontier.
        let mut frontier: BTreeSet<String> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut remaining_in_degree = in_degree.clone();
        let mut order = Vec::with_capacity(node_ids.len());

        while let Some(id) = frontier.iter().next().cloned() {
            frontier.remove(&id);
            order.push(id.clone());
            for successor in successors.get(&id).cloned().unwrap_or_default() {
                let degree = remaining_in_degree.entry(successor.clone()).or_insert(0);
                *degree -= 1;
                if *degree == 0 {
                    frontier.insert(successor);
                }
            }
        }

        if order.len() != node_ids.len() {
            let stuck = node_ids
                .iter()
                .find(|id| !order.contains(id))
                .cloned()
                .unwrap_or_default();
            return Err(SimError::CycleDetected { component_id: stuck });
        }

        Ok(Self {
            order,
            predecessors,
            successors,
        })
    }

    /// The topological order, ties broken lexicographically.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// The direct predecessors (upstream neighbors) of `id`.
    #[must_use]
    pub fn predecessors(&self, id: &str) -> &[String] {
        self.predecessors.get(id).map_or(&[], Vec::as_slice)
    }

    /// The direct successors (downstream neighbors) of `id`.
    #[must_use]
    pub fn successors(&self, id: &str) -> &[String] {
        self.successors.get(id).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_linear_chain_orders_upstream_first() {
        let topo = Topology::build(&ids(&["a", "b", "c"]), &edges(&[("a", "b"), ("b", "c")])).unwrap();
        assert_eq!(topo.order(), &["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_ties_broken_lexicographically() {
        // b and c both have no predecessors; lexicographic order picks b first.
        let topo = Topology::build(&ids(&["c", "b", "a"]), &edges(&[("b", "a"), ("c", "a")])).unwrap();
        assert_eq!(topo.order()[0], "b");
        assert_eq!(topo.order()[1], "c");
        assert_eq!(topo.order()[2], "a");
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = Topology::build(&ids(&["a", "b"]), &edges(&[("a", "b"), ("b", "a")])).unwrap_err();
        assert!(matches!(err, SimError::CycleDetected { .. }));
    }

    #[test]
    fn test_predecessors_and_successors() {
        let topo = Topology::build(&ids(&["a", "b", "c"]), &edges(&[("a", "c"), ("b", "c")])).unwrap();
        assert_eq!(topo.predecessors("c"), &["a".to_string(), "b".to_string()]);
        assert_eq!(topo.successors("a"), &["c".to_string()]);
    }
}
