//! Typed directed multigraph over documents.
//!
//! Resolved edges live in a petgraph `StableDiGraph` addressed through an
//! id -> `NodeIndex` map. An edge whose endpoint id no node carries is kept
//! on a side list for audit but is never part of the graph, so every
//! traversal skips it.

use std::collections::{BTreeMap, HashMap, VecDeque};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, VisitMap, Visitable};
use serde::{Deserialize, Serialize};

use lore_core::types::{CorpusDocument, Direction, DocType, EdgeType, RelatedRef};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Also the key of the node's vector in the vector index.
    pub doc_id: String,
    pub node_type: DocType,
    pub tags: Vec<String>,
}

impl From<&CorpusDocument> for GraphNode {
    fn from(doc: &CorpusDocument) -> Self {
        Self {
            doc_id: doc.doc_id.clone(),
            node_type: doc.doc_type,
            tags: doc.tags.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
        }
    }
}

/// Node and edge counts broken down by type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub dangling_edges: usize,
    pub nodes_by_type: BTreeMap<DocType, usize>,
    pub edges_by_type: BTreeMap<EdgeType, usize>,
}

/// Frozen knowledge graph. Built once, then only read.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeGraph {
    /// Edge weights are positions in `edges`.
    graph: StableDiGraph<GraphNode, usize>,
    index: HashMap<String, NodeIndex>,
    /// Every edge, resolved or not, in extraction order.
    edges: Vec<GraphEdge>,
    dangling: Vec<usize>,
}

impl KnowledgeGraph {
    /// Assemble a graph from nodes and an edge multiset.
    ///
    /// Later nodes repeating an earlier id are ignored. Edge order is kept.
    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        let mut graph = StableDiGraph::with_capacity(nodes.len(), edges.len());
        let mut index = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if index.contains_key(&node.doc_id) {
                continue;
            }
            let doc_id = node.doc_id.clone();
            index.insert(doc_id, graph.add_node(node));
        }

        let mut dangling = Vec::new();
        for (position, edge) in edges.iter().enumerate() {
            match (index.get(&edge.source), index.get(&edge.target)) {
                (Some(&source), Some(&target)) => {
                    graph.add_edge(source, target, position);
                }
                _ => dangling.push(position),
            }
        }

        Self {
            graph,
            index,
            edges,
            dangling,
        }
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_indices().map(move |ix| &self.graph[ix])
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, doc_id: &str) -> Option<&GraphNode> {
        self.index.get(doc_id).map(|&ix| &self.graph[ix])
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.index.contains_key(doc_id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All edges, dangling ones included.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_dangling(&self, edge: &GraphEdge) -> bool {
        !(self.contains(&edge.source) && self.contains(&edge.target))
    }

    /// Edges with at least one endpoint that resolves to no node.
    pub fn dangling_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.dangling.iter().map(move |&p| &self.edges[p])
    }

    /// Resolved edges leaving `doc_id`, in edge order.
    pub fn edges_from(&self, doc_id: &str) -> impl Iterator<Item = &GraphEdge> {
        self.adjacent_edges(doc_id, petgraph::Direction::Outgoing)
    }

    /// Resolved edges arriving at `doc_id`, in edge order.
    pub fn edges_to(&self, doc_id: &str) -> impl Iterator<Item = &GraphEdge> {
        self.adjacent_edges(doc_id, petgraph::Direction::Incoming)
    }

    fn adjacent_edges(&self, doc_id: &str, flow: petgraph::Direction) -> impl Iterator<Item = &GraphEdge> {
        let mut positions: Vec<usize> = match self.index.get(doc_id) {
            Some(&ix) => self.graph.edges_directed(ix, flow).map(|e| *e.weight()).collect(),
            None => Vec::new(),
        };
        positions.sort_unstable();
        positions.into_iter().map(move |p| &self.edges[p])
    }

    /// Typed neighbours of `doc_id`: outgoing first, then incoming.
    pub fn related(&self, doc_id: &str) -> Vec<RelatedRef> {
        let outgoing = self.edges_from(doc_id).map(|e| RelatedRef {
            doc_id: e.target.clone(),
            edge_type: e.edge_type,
            direction: Direction::Outgoing,
        });
        let incoming = self.edges_to(doc_id).map(|e| RelatedRef {
            doc_id: e.source.clone(),
            edge_type: e.edge_type,
            direction: Direction::Incoming,
        });
        outgoing.chain(incoming).collect()
    }

    /// Distinct node indices adjacent to `ix`, successors before predecessors.
    fn adjacent_nodes(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let mut seen = Vec::new();
        let successors = self.graph.neighbors_directed(ix, petgraph::Direction::Outgoing);
        let predecessors = self.graph.neighbors_directed(ix, petgraph::Direction::Incoming);
        for next in successors.chain(predecessors) {
            if next != ix && !seen.contains(&next) {
                seen.push(next);
            }
        }
        seen
    }

    /// Distinct ids adjacent to `doc_id` in either direction.
    pub fn neighbors(&self, doc_id: &str) -> Vec<&str> {
        match self.index.get(doc_id) {
            Some(&ix) => self
                .adjacent_nodes(ix)
                .into_iter()
                .map(|n| self.graph[n].doc_id.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Breadth-first walk over resolved edges, ignoring direction.
    ///
    /// Returns each reached node with its hop distance, starting nodes at
    /// hop 0. Unknown start ids are skipped.
    pub fn traverse(&self, start_ids: &[&str], max_hops: usize) -> Vec<(String, usize)> {
        let mut visited = self.graph.visit_map();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        for id in start_ids {
            if let Some(&ix) = self.index.get(*id) {
                if visited.visit(ix) {
                    order.push((ix, 0));
                    queue.push_back((ix, 0));
                }
            }
        }

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= max_hops {
                continue;
            }
            for next in self.adjacent_nodes(current) {
                if visited.visit(next) {
                    order.push((next, hops + 1));
                    queue.push_back((next, hops + 1));
                }
            }
        }

        order
            .into_iter()
            .map(|(ix, hops)| (self.graph[ix].doc_id.clone(), hops))
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.node_count(),
            edge_count: self.edges.len(),
            dangling_edges: self.dangling_edges().count(),
            ..GraphStats::default()
        };
        for node in self.nodes() {
            *stats.nodes_by_type.entry(node.node_type).or_default() += 1;
        }
        for edge in &self.edges {
            *stats.edges_by_type.entry(edge.edge_type).or_default() += 1;
        }
        stats
    }
}
