//! Node graph built on `petgraph`.

use std::collections::{HashMap, HashSet};

use apollo_core::NodeId;
use petgraph::Direction;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::connection::Connection;
use crate::definition::WorkflowDefinition;
use crate::error::ValidationError;

/// Directed graph of a workflow's nodes.
///
/// Edge weights are declaration indices, so edge queries return
/// connections in the order the author declared them, which is the order
/// branching nodes evaluate guards in.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<NodeId, usize>,
    index_map: HashMap<NodeId, NodeIndex>,
    connections: Vec<Connection>,
}

impl DependencyGraph {
    /// Build a [`DependencyGraph`] from a [`WorkflowDefinition`].
    ///
    /// Returns an error if a connection references an unknown node or creates a self-loop.
    pub fn from_definition(definition: &WorkflowDefinition) -> Result<Self, ValidationError> {
        let mut graph = DiGraph::new();
        let mut index_map = HashMap::new();

        for node in &definition.nodes {
            let idx = graph.add_node(node.id.clone());
            index_map.insert(node.id.clone(), idx);
        }

        for (order, conn) in definition.connections.iter().enumerate() {
            let from_idx = index_map
                .get(&conn.from_node)
                .ok_or_else(|| ValidationError::UnknownNode(conn.from_node.clone()))?;
            let to_idx = index_map
                .get(&conn.to_node)
                .ok_or_else(|| ValidationError::UnknownNode(conn.to_node.clone()))?;
            if conn.is_self_loop() {
                return Err(ValidationError::SelfLoop(conn.from_node.clone()));
            }
            graph.add_edge(*from_idx, *to_idx, order);
        }

        Ok(Self {
            graph,
            index_map,
            connections: definition.connections.clone(),
        })
    }

    /// Returns `true` if the graph contains at least one cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        algo::is_cyclic_directed(&self.graph)
    }

    /// Find a cycle that survives removing every edge into a node accepted by
    /// `is_loop`. Returns one node on such a cycle.
    ///
    /// Loop bodies close back on their loop node, so those back edges are
    /// legitimate; any other cycle is unbounded.
    #[must_use]
    pub fn find_cycle_outside(&self, is_loop: impl Fn(&NodeId) -> bool) -> Option<NodeId> {
        let filtered = self.graph.filter_map(
            |_, id| Some(id.clone()),
            |edge, _| {
                let (_, target) = self.graph.edge_endpoints(edge)?;
                (!is_loop(&self.graph[target])).then_some(())
            },
        );
        algo::toposort(&filtered, None)
            .err()
            .map(|cycle| filtered[cycle.node_id()].clone())
    }

    fn sorted_edges(&self, id: &NodeId, direction: Direction) -> Vec<&Connection> {
        let Some(&idx) = self.index_map.get(id) else {
            return Vec::new();
        };
        let mut order: Vec<usize> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| *e.weight())
            .collect();
        order.sort_unstable();
        order.into_iter().map(|i| &self.connections[i]).collect()
    }

    /// Get all incoming connections (edges pointing TO this node), in declaration order.
    #[must_use]
    pub fn incoming_connections(&self, id: &NodeId) -> Vec<&Connection> {
        self.sorted_edges(id, Direction::Incoming)
    }

    /// Get all outgoing connections (edges leaving FROM this node), in declaration order.
    #[must_use]
    pub fn outgoing_connections(&self, id: &NodeId) -> Vec<&Connection> {
        self.sorted_edges(id, Direction::Outgoing)
    }

    /// Number of edges pointing at `id`.
    #[must_use]
    pub fn in_degree(&self, id: &NodeId) -> usize {
        self.index_map.get(id).map_or(0, |&idx| {
            self.graph
                .neighbors_directed(idx, Direction::Incoming)
                .count()
        })
    }

    /// Nodes with no incoming edges.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// Get the predecessor (upstream) node IDs of a given node.
    #[must_use]
    pub fn predecessors(&self, id: &NodeId) -> Vec<NodeId> {
        self.incoming_connections(id)
            .into_iter()
            .map(|c| c.from_node.clone())
            .collect()
    }

    /// Get the successor (downstream) node IDs of a given node.
    #[must_use]
    pub fn successors(&self, id: &NodeId) -> Vec<NodeId> {
        self.outgoing_connections(id)
            .into_iter()
            .map(|c| c.to_node.clone())
            .collect()
    }

    /// Every node reachable from `id` by following edges, excluding `id`
    /// unless it lies on a cycle.
    #[must_use]
    pub fn reachable_from(&self, id: &NodeId) -> HashSet<NodeId> {
        let Some(&start) = self.index_map.get(id) else {
            return HashSet::new();
        };
        let mut reached = HashSet::new();
        for next in self.graph.neighbors_directed(start, Direction::Outgoing) {
            let mut dfs = Dfs::new(&self.graph, next);
            while let Some(idx) = dfs.next(&self.graph) {
                reached.insert(self.graph[idx].clone());
            }
        }
        reached
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeDefinition;
    use apollo_core::WorkflowId;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn make_definition(nodes: &[&str], edges: &[(&str, &str)]) -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new(WorkflowId::new("wf").unwrap(), "graph");
        def.nodes = nodes
            .iter()
            .map(|n| NodeDefinition::task(id(n), "cap"))
            .collect();
        def.connections = edges
            .iter()
            .map(|(a, b)| Connection::new(id(a), id(b)))
            .collect();
        def
    }

    #[test]
    fn outgoing_edges_keep_declaration_order() {
        let def = make_definition(&["a", "b", "c", "d"], &[("a", "c"), ("a", "b"), ("a", "d")]);
        let graph = DependencyGraph::from_definition(&def).unwrap();
        assert_eq!(graph.successors(&id("a")), vec![id("c"), id("b"), id("d")]);
        assert_eq!(graph.predecessors(&id("b")), vec![id("a")]);
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let def = make_definition(&["a"], &[("a", "ghost")]);
        assert_eq!(
            DependencyGraph::from_definition(&def).unwrap_err(),
            ValidationError::UnknownNode(id("ghost"))
        );
    }

    #[test]
    fn entry_nodes_and_in_degree() {
        let def = make_definition(&["a", "b", "c"], &[("a", "b"), ("a", "c"), ("b", "c")]);
        let graph = DependencyGraph::from_definition(&def).unwrap();
        assert_eq!(graph.entry_nodes(), vec![id("a")]);
        assert_eq!(graph.in_degree(&id("c")), 2);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn back_edge_into_loop_is_not_a_cycle() {
        let def = make_definition(&["a", "l", "b"], &[("a", "l"), ("l", "b"), ("b", "l")]);
        let graph = DependencyGraph::from_definition(&def).unwrap();
        assert!(graph.has_cycle());
        assert_eq!(graph.find_cycle_outside(|n| n.as_str() == "l"), None);
        assert!(graph.find_cycle_outside(|_| false).is_some());
    }

    #[test]
    fn reachability_follows_edges() {
        let def = make_definition(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c")]);
        let graph = DependencyGraph::from_definition(&def).unwrap();
        let reached = graph.reachable_from(&id("a"));
        assert!(reached.contains(&id("c")));
        assert!(!reached.contains(&id("d")));
        assert!(!reached.contains(&id("a")));
    }
}
