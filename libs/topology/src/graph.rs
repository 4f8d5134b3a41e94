//! An abstraction of the physical topology.  All routing questions the builder
//! asks (reachability, hop distance, concrete shortest paths) are answered
//! here, either on the full graph or on its multicast-capable subgraph view.

use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use std::collections::HashMap;

/// One physical link between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub multicast: bool, // whether the link carries native multicast
    pub subnet: String,  // subnet id assigned by the provider
    pub rate: String,
    pub delay: String,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: UnGraph<String, Link>,
    node_index: HashMap<String, NodeIndex>,
}

impl Topology {
    pub fn ensure_node(&mut self, name: &str) -> NodeIndex {
        match self.node_index.get(name) {
            Some(&index) => index,
            None => {
                let index = self.graph.add_node(name.to_string());
                self.node_index.insert(name.to_string(), index);
                index
            }
        }
    }

    /// Adds a link, replacing any existing link between the same pair.
    pub fn add_link(&mut self, left: &str, right: &str, link: Link) {
        let a = self.ensure_node(left);
        let b = self.ensure_node(right);
        self.graph.update_edge(a, b, link);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_index.contains_key(name)
    }

    /// All node names, sorted.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.graph.node_weights().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn links(&self) -> impl Iterator<Item = (String, String, &Link)> + '_ {
        self.graph.edge_references().map(move |edge| {
            (
                self.graph[edge.source()].clone(),
                self.graph[edge.target()].clone(),
                edge.weight(),
            )
        })
    }

    /// Relay-capable nodes, classified by name prefix.
    pub fn relay_nodes(&self) -> Vec<String> {
        self.nodes_with_prefix("relay")
    }

    /// Gateway-capable nodes, classified by name prefix.
    pub fn gateway_nodes(&self) -> Vec<String> {
        self.nodes_with_prefix("gateway")
    }

    fn nodes_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .graph
            .node_weights()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        nodes.sort();
        nodes
    }

    pub fn has_path(&self, from: &str, to: &str) -> bool {
        self.distance(from, to).is_some()
    }

    /// Hop count of the shortest path on the full graph.
    pub fn distance(&self, from: &str, to: &str) -> Option<usize> {
        let goal = self.index(to);
        astar(&self.graph, self.index(from), |n| n == goal, |_| 1usize, |_| 0usize).map(|(cost, _)| cost)
    }

    /// Shortest path on the full graph as a node-name list.
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let goal = self.index(to);
        astar(&self.graph, self.index(from), |n| n == goal, |_| 1usize, |_| 0usize)
            .map(|(_, path)| self.names(path))
    }

    pub fn mcast_has_path(&self, from: &str, to: &str) -> bool {
        self.mcast_distance(from, to).is_some()
    }

    /// Hop count of the shortest path restricted to multicast-enabled links.
    pub fn mcast_distance(&self, from: &str, to: &str) -> Option<usize> {
        let mcast = EdgeFiltered::from_fn(&self.graph, |edge| edge.weight().multicast);
        let goal = self.index(to);
        astar(&mcast, self.index(from), |n| n == goal, |_| 1usize, |_| 0usize).map(|(cost, _)| cost)
    }

    /// Shortest path restricted to multicast-enabled links.
    pub fn mcast_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mcast = EdgeFiltered::from_fn(&self.graph, |edge| edge.weight().multicast);
        let goal = self.index(to);
        astar(&mcast, self.index(from), |n| n == goal, |_| 1usize, |_| 0usize)
            .map(|(_, path)| self.names(path))
    }

    fn index(&self, name: &str) -> NodeIndex {
        match self.node_index.get(name) {
            Some(&index) => index,
            None => panic!("{:?} is not a valid node", name),
        }
    }

    fn names(&self, path: Vec<NodeIndex>) -> Vec<String> {
        path.into_iter().map(|index| self.graph[index].clone()).collect()
    }
}
