//! # Dependency Graph
//!
//! Orders the systems of one stage and groups them into batches.
//!
//! 1. `before`/`after` labels become edges; a Kahn sort seeded in
//!    registration order yields a deterministic order or a cycle error.
//! 2. Batches are filled greedily along that order. A system joins the open
//!    batch when none of its predecessors is still unplaced or inside the
//!    open batch, and it does not conflict on data with any member.

use std::collections::{HashMap, VecDeque};

use crate::error::{EcsError, EcsResult};
use crate::schedule::system::Dependencies;

/// What the graph needs to know about one system.
#[derive(Clone, Debug)]
pub struct SystemNode<'a> {
    /// Label of the system.
    pub label: &'static str,
    /// Systems this one must precede.
    pub before: &'a [&'static str],
    /// Systems this one must follow.
    pub after: &'a [&'static str],
    /// Declared data access.
    pub dependencies: &'a Dependencies,
}

/// Ordering edges between the nodes of one stage.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Resolves the labels of `nodes` into edges. Labels that name no
    /// system of the stage are ignored with a warning.
    #[must_use]
    pub fn new(stage: &str, nodes: &[SystemNode<'_>]) -> Self {
        let mut by_label: HashMap<&'static str, usize> = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            by_label.entry(node.label).or_insert(index);
        }

        let mut graph = Self {
            successors: vec![Vec::new(); nodes.len()],
            predecessors: vec![Vec::new(); nodes.len()],
        };
        for (index, node) in nodes.iter().enumerate() {
            for &label in node.before {
                match by_label.get(label) {
                    Some(&target) => graph.add_edge(index, target),
                    None => tracing::warn!(stage, system = node.label, before = label, "unknown ordering label"),
                }
            }
            for &label in node.after {
                match by_label.get(label) {
                    Some(&source) => graph.add_edge(source, index),
                    None => tracing::warn!(stage, system = node.label, after = label, "unknown ordering label"),
                }
            }
        }
        graph
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if !self.successors[from].contains(&to) {
            self.successors[from].push(to);
            self.predecessors[to].push(from);
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.successors.len()
    }

    /// True for a stage without systems.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    /// Nodes that must run before `node`.
    #[must_use]
    pub fn predecessors(&self, node: usize) -> &[usize] {
        &self.predecessors[node]
    }

    /// Kahn topological sort. Ready nodes are taken in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ScheduleCycle`] naming the stage and the systems
    /// the sort could not drain.
    pub fn topological_order(&self, stage: &str, nodes: &[SystemNode<'_>]) -> EcsResult<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = (0..self.len()).filter(|&node| in_degree[node] == 0).collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(node) = ready.pop_front() {
            order.push(node);
            for &next in &self.successors[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if order.len() < self.len() {
            let systems = (0..self.len())
                .filter(|&node| in_degree[node] > 0)
                .map(|node| nodes[node].label)
                .collect();
            return Err(EcsError::ScheduleCycle {
                stage: stage.to_owned(),
                systems,
            });
        }
        Ok(order)
    }

    /// Splits `order` into batches of mutually independent systems.
    #[must_use]
    pub fn batches(&self, order: &[usize], nodes: &[SystemNode<'_>]) -> Vec<Vec<usize>> {
        let mut placed: Vec<Option<usize>> = vec![None; self.len()];
        let mut batches: Vec<Vec<usize>> = Vec::new();

        for (position, &first) in order.iter().enumerate() {
            if placed[first].is_some() {
                continue;
            }
            let current = batches.len();
            placed[first] = Some(current);
            let mut batch = vec![first];

            for &candidate in &order[position + 1..] {
                if placed[candidate].is_some() {
                    continue;
                }
                let ready = self.predecessors[candidate]
                    .iter()
                    .all(|&pred| placed[pred].is_some_and(|batch| batch < current));
                if !ready {
                    continue;
                }
                let conflicts = batch.iter().any(|&member| {
                    nodes[member]
                        .dependencies
                        .conflicts_with(nodes[candidate].dependencies)
                });
                if !conflicts {
                    placed[candidate] = Some(current);
                    batch.push(candidate);
                }
            }
            batches.push(batch);
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Spec {
        label: &'static str,
        before: Vec<&'static str>,
        after: Vec<&'static str>,
        dependencies: Dependencies,
    }

    fn spec(label: &'static str) -> Spec {
        Spec {
            label,
            before: Vec::new(),
            after: Vec::new(),
            dependencies: Dependencies::default(),
        }
    }

    fn nodes(specs: &[Spec]) -> Vec<SystemNode<'_>> {
        specs
            .iter()
            .map(|spec| SystemNode {
                label: spec.label,
                before: &spec.before,
                after: &spec.after,
                dependencies: &spec.dependencies,
            })
            .collect()
    }

    fn labels(order: &[usize], specs: &[Spec]) -> Vec<&'static str> {
        order.iter().map(|&index| specs[index].label).collect()
    }

    #[test]
    fn test_order_respects_edges_and_registration() {
        let mut specs = vec![spec("render"), spec("physics"), spec("input"), spec("audio")];
        specs[0].after.push("physics");
        specs[1].after.push("input");
        let nodes = nodes(&specs);
        let graph = DependencyGraph::new("Update", &nodes);

        let order = graph.topological_order("Update", &nodes).unwrap();
        assert_eq!(labels(&order, &specs), vec!["input", "audio", "physics", "render"]);
    }

    #[test]
    fn test_cycle_names_stage_and_systems() {
        let mut specs = vec![spec("a"), spec("b"), spec("c")];
        specs[0].before.push("b");
        specs[1].before.push("a");
        let nodes = nodes(&specs);
        let graph = DependencyGraph::new("Update", &nodes);

        match graph.topological_order("Update", &nodes) {
            Err(EcsError::ScheduleCycle { stage, systems }) => {
                assert_eq!(stage, "Update");
                assert_eq!(systems, vec!["a", "b"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_labels_are_ignored() {
        let mut specs = vec![spec("a")];
        specs[0].after.push("missing");
        let nodes = nodes(&specs);
        let graph = DependencyGraph::new("First", &nodes);
        assert!(graph.predecessors(0).is_empty());
        assert_eq!(graph.topological_order("First", &nodes).unwrap(), vec![0]);
    }

    #[test]
    fn test_batches_split_on_data_conflicts() {
        let mut specs = vec![spec("write_a"), spec("read_a"), spec("write_b")];
        specs[0].dependencies.write::<u32>();
        specs[1].dependencies.read::<u32>();
        specs[2].dependencies.write::<u64>();
        let nodes = nodes(&specs);
        let graph = DependencyGraph::new("Update", &nodes);
        let order = graph.topological_order("Update", &nodes).unwrap();

        assert_eq!(graph.batches(&order, &nodes), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_shared_reads_split_batches() {
        let mut specs = vec![spec("reader"), spec("other_reader"), spec("unrelated")];
        specs[0].dependencies.read::<u32>();
        specs[1].dependencies.read::<u32>();
        specs[2].dependencies.read::<u64>();
        let nodes = nodes(&specs);
        let graph = DependencyGraph::new("Update", &nodes);
        let order = graph.topological_order("Update", &nodes).unwrap();

        assert_eq!(graph.batches(&order, &nodes), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_batches_pull_in_ready_systems() {
        // b and d follow a; c shares data with a, so it opens batch 1.
        let mut specs = vec![spec("a"), spec("b"), spec("c"), spec("d")];
        specs[1].after.push("a");
        specs[3].after.push("a");
        specs[0].dependencies.write::<u8>();
        specs[2].dependencies.write::<u8>();
        let nodes = nodes(&specs);
        let graph = DependencyGraph::new("Update", &nodes);
        let order = graph.topological_order("Update", &nodes).unwrap();
        assert_eq!(labels(&order, &specs), vec!["a", "c", "b", "d"]);

        assert_eq!(graph.batches(&order, &nodes), vec![vec![0], vec![2, 1, 3]]);
    }
}
