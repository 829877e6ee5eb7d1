//! DAG materialization with topological layers.
//!
//! Layers are the fixed point of `layer(n) = 1 + max(layer(p))` over
//! predecessors; roots sit in layer 1. The executor uses layers to decide
//! parallel groups; within a layer, order is irrelevant.

use devmatrix_core::model::task::AtomicTask;
use devmatrix_core::vector_store::GraphStore;
use devmatrix_core::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::warn;

/// A materialized task DAG with layer assignment.
#[derive(Debug, Clone)]
pub struct TaskDag {
    tasks: Vec<AtomicTask>,
    layer_of: HashMap<String, u32>,
    layers: Vec<Vec<String>>,
}

impl TaskDag {
    /// Build the DAG from atomic tasks.
    ///
    /// Fails with `UnknownPredecessor` when a task names a predecessor that
    /// is not present, and with `DagCyclic` (listing the offending chain)
    /// when the predecessor relation contains a cycle.
    pub fn build(tasks: Vec<AtomicTask>) -> Result<Self> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut index_of: HashMap<String, NodeIndex> = HashMap::new();

        for task in &tasks {
            let index = graph.add_node(task.id.clone());
            index_of.insert(task.id.clone(), index);
        }
        for task in &tasks {
            for predecessor in &task.predecessors {
                let Some(&from) = index_of.get(predecessor.as_str()) else {
                    return Err(Error::UnknownPredecessor {
                        task: task.id.clone(),
                        predecessor: predecessor.clone(),
                    });
                };
                graph.add_edge(from, index_of[&task.id], ());
            }
        }

        if let Some(chain) = find_cycle(&graph) {
            return Err(Error::DagCyclic { chain });
        }

        // Fixed point of layer(n) = 1 + max(layer(p)); converges because
        // the graph is acyclic.
        let mut layer_of: HashMap<String, u32> = HashMap::new();
        loop {
            let mut changed = false;
            for task in &tasks {
                let resolved: Option<Vec<u32>> = task
                    .predecessors
                    .iter()
                    .map(|p| layer_of.get(p).copied())
                    .collect();
                if let Some(predecessor_layers) = resolved {
                    let layer = 1 + predecessor_layers.into_iter().max().unwrap_or(0);
                    if layer_of.get(&task.id) != Some(&layer) {
                        layer_of.insert(task.id.clone(), layer);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let max_layer = layer_of.values().copied().max().unwrap_or(0);
        let mut layers: Vec<Vec<String>> = vec![Vec::new(); max_layer as usize];
        for task in &tasks {
            if let Some(&layer) = layer_of.get(&task.id) {
                layers[(layer - 1) as usize].push(task.id.clone());
            }
        }

        Ok(Self {
            tasks,
            layer_of,
            layers,
        })
    }

    /// The tasks, in the order they were supplied.
    #[must_use]
    pub fn tasks(&self) -> &[AtomicTask] {
        &self.tasks
    }

    /// Look up one task.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&AtomicTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// A task's 1-based layer.
    #[must_use]
    pub fn layer_of(&self, id: &str) -> Option<u32> {
        self.layer_of.get(id).copied()
    }

    /// Task ids grouped by layer, layer 1 first.
    #[must_use]
    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the DAG is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Persist the layered plan through the graph store. Failures are
    /// logged and swallowed; persistence is optional.
    pub async fn persist(&self, store: &dyn GraphStore, run_id: &str) {
        if let Err(err) = store.persist_layers(run_id, &self.layers).await {
            warn!(error = %err, "layered plan persistence failed, continuing");
        }
    }
}

/// Depth-first cycle search returning the offending chain of task ids,
/// ending at the node that was revisited.
fn find_cycle(graph: &DiGraph<String, ()>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
    }

    let mut marks = vec![Mark::White; graph.node_count()];
    let mut stack: Vec<NodeIndex> = Vec::new();

    fn visit(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        marks: &mut Vec<Mark>,
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        marks[node.index()] = Mark::Grey;
        stack.push(node);
        for next in graph.neighbors(node) {
            match marks[next.index()] {
                Mark::Grey => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut chain: Vec<String> =
                        stack[start..].iter().map(|&n| graph[n].clone()).collect();
                    chain.push(graph[next].clone());
                    return Some(chain);
                }
                Mark::White => {
                    if let Some(chain) = visit(graph, next, marks, stack) {
                        return Some(chain);
                    }
                }
                Mark::Black => {}
            }
        }
        stack.pop();
        marks[node.index()] = Mark::Black;
        None
    }

    for node in graph.node_indices() {
        if marks[node.index()] == Mark::White {
            if let Some(chain) = visit(graph, node, &mut marks, &mut stack) {
                return Some(chain);
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use devmatrix_core::model::requirement::Domain;
    use proptest::prelude::*;

    fn task(id: &str, predecessors: &[&str]) -> AtomicTask {
        AtomicTask::new(id, format!("purpose {id}"), Domain::Crud)
            .with_output("out", "string")
            .with_predecessors(predecessors.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn roots_sit_in_layer_one() {
        let dag = TaskDag::build(vec![task("a", &[]), task("b", &["a"]), task("c", &["a", "b"])])
            .unwrap();
        assert_eq!(dag.layer_of("a"), Some(1));
        assert_eq!(dag.layer_of("b"), Some(2));
        assert_eq!(dag.layer_of("c"), Some(3));
        assert_eq!(dag.layers().len(), 3);
    }

    #[test]
    fn siblings_share_a_layer() {
        let dag = TaskDag::build(vec![
            task("root", &[]),
            task("x", &["root"]),
            task("y", &["root"]),
        ])
        .unwrap();
        assert_eq!(dag.layer_of("x"), dag.layer_of("y"));
        let mut layer2 = dag.layers()[1].clone();
        layer2.sort();
        assert_eq!(layer2, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn unknown_predecessor_is_reported() {
        let err = TaskDag::build(vec![task("a", &["ghost"])]).unwrap_err();
        match err {
            Error::UnknownPredecessor { task, predecessor } => {
                assert_eq!(task, "a");
                assert_eq!(predecessor, "ghost");
            }
            other => panic!("expected UnknownPredecessor, got {other:?}"),
        }
    }

    #[test]
    fn cycles_list_the_offending_chain() {
        let err = TaskDag::build(vec![
            task("a", &["c"]),
            task("b", &["a"]),
            task("c", &["b"]),
        ])
        .unwrap_err();
        match err {
            Error::DagCyclic { chain } => {
                assert!(chain.len() >= 3);
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("expected DagCyclic, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let err = TaskDag::build(vec![task("a", &["a"])]).unwrap_err();
        assert!(matches!(err, Error::DagCyclic { .. }));
    }

    #[tokio::test]
    async fn persistence_failure_is_swallowed() {
        struct FailingStore;
        #[async_trait::async_trait]
        impl GraphStore for FailingStore {
            async fn persist_layers(&self, _run_id: &str, _layers: &[Vec<String>]) -> Result<()> {
                Err(Error::External("graph store down".into()))
            }
        }

        let dag = TaskDag::build(vec![task("a", &[])]).unwrap();
        dag.persist(&FailingStore, "run-1").await;
    }

    proptest! {
        // Acyclicity: graphs whose predecessors only point at earlier ids
        // always build, and every task lands strictly above its
        // predecessors.
        #[test]
        fn forward_edges_always_build(edge_bits in proptest::collection::vec(0u8..=1, 0..28)) {
            let n = 8usize;
            let mut tasks: Vec<AtomicTask> = Vec::new();
            let mut bit = 0usize;
            for i in 0..n {
                let mut predecessors = Vec::new();
                for j in 0..i {
                    if edge_bits.get(bit).copied().unwrap_or(0) == 1 {
                        predecessors.push(format!("t{j}"));
                    }
                    bit += 1;
                }
                let mut task = AtomicTask::new(
                    format!("t{i}"),
                    format!("purpose {i}"),
                    Domain::General,
                );
                task.outputs.insert("out".into(), "string".into());
                task.predecessors = predecessors;
                tasks.push(task);
            }

            let dag = TaskDag::build(tasks).unwrap();
            for task in dag.tasks() {
                let layer = dag.layer_of(&task.id).unwrap();
                for predecessor in &task.predecessors {
                    prop_assert!(dag.layer_of(predecessor).unwrap() < layer);
                }
            }
        }
    }
}
