//! Knowledge graph over document chunks.
//!
//! A [`GraphIndex`] is an immutable value: nodes, chunks and edges plus two
//! derived maps (`node_neighbors`, the symmetric closure of the edges, and
//! `chunk_to_nodes`, the inverse of [`Node::chunk_ids`]). Mutation goes
//! through [`GraphIndex::splice`], which returns a *new* index; nodes and
//! chunks are `Arc`-shared with the previous generation and the derived maps
//! are recomputed only for the ids a patch touches.
//!
//! [`SharedGraph`] publishes the current generation. Readers take an
//! `Arc<GraphIndex>` snapshot and keep a consistent view for as long as they
//! hold it, regardless of concurrent mutations.
//!
//! # File format
//!
//! ```text
//! { "version": 2,
//!   "nodes":  [{ "id", "title", "chunk_ids": [..] }],
//!   "chunks": [{ "id", "text", "source"?, "section"?, "metadata"? }],
//!   "edges":  [{ "source", "target", "relation" }] }
//! ```
//!
//! Loading is best-effort: malformed entries are dropped, not fatal.

use im::{HashMap as PMap, OrdMap, OrdSet};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::models::{Chunk, Edge, Metadata, Node};

/// Version written by [`GraphIndex::to_json`]. Version 1 files (no chunk
/// metadata) load unchanged.
pub const GRAPH_FORMAT_VERSION: u32 = 2;

const DEFAULT_RELATION: &str = "related";

type IdSet = Arc<BTreeSet<String>>;

/// Copy-on-write knowledge graph.
///
/// Every container is a persistent map, so cloning an index is O(1) and a
/// splice costs time proportional to the patch, not to the graph.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    generation: u64,
    nodes: OrdMap<String, Arc<Node>>,
    chunks: OrdMap<String, Arc<Chunk>>,
    /// Edges keyed by insertion sequence; iteration order is file order.
    edges: OrdMap<u64, Edge>,
    next_edge: u64,
    /// Endpoint id to the keys of every edge touching it.
    edges_by_node: PMap<String, OrdSet<u64>>,
    node_neighbors: PMap<String, IdSet>,
    chunk_to_nodes: PMap<String, IdSet>,
}

/// A set of changes applied atomically by [`GraphIndex::splice`].
///
/// Removals are applied before additions, so a patch may remove and re-add
/// the same id. Every edge touching a removed node is dropped.
#[derive(Debug, Clone, Default)]
pub struct GraphPatch {
    pub remove_nodes: BTreeSet<String>,
    pub remove_chunks: BTreeSet<String>,
    pub add_nodes: Vec<Node>,
    pub add_chunks: Vec<Chunk>,
    pub add_edges: Vec<Edge>,
}

impl GraphPatch {
    pub fn is_empty(&self) -> bool {
        self.remove_nodes.is_empty()
            && self.remove_chunks.is_empty()
            && self.add_nodes.is_empty()
            && self.add_chunks.is_empty()
            && self.add_edges.is_empty()
    }
}

#[derive(Serialize)]
struct GraphFile<'a> {
    version: u32,
    nodes: Vec<&'a Node>,
    chunks: Vec<&'a Chunk>,
    edges: Vec<&'a Edge>,
}

impl GraphIndex {
    /// An empty graph (generation 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from parts, computing the derived maps from scratch.
    /// Later duplicates of a node or chunk id replace earlier ones.
    pub fn from_parts(nodes: Vec<Node>, chunks: Vec<Chunk>, edges: Vec<Edge>) -> Self {
        let nodes: OrdMap<String, Arc<Node>> = nodes
            .into_iter()
            .map(|n| (n.id.clone(), Arc::new(n)))
            .collect();
        let chunks: OrdMap<String, Arc<Chunk>> = chunks
            .into_iter()
            .map(|c| (c.id.clone(), Arc::new(c)))
            .collect();

        let mut index = Self {
            nodes,
            chunks,
            ..Self::default()
        };
        for edge in edges {
            index.insert_edge(edge);
        }
        let ids: Vec<String> = index.nodes.keys().cloned().collect();
        for id in ids {
            index.refresh_neighbors(&id);
        }
        for node in index.nodes.values() {
            for cid in &node.chunk_ids {
                attach(&mut index.chunk_to_nodes, cid, &node.id);
            }
        }
        index
    }

    /// Parse a graph file.
    ///
    /// Fails with [`Error::Format`] only when the bytes are not JSON or the
    /// top level is not an object. Nodes with an empty id or title, chunks
    /// with an empty id or text, and edges with an empty endpoint are dropped.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let data: Value = serde_json::from_slice(bytes)?;
        let obj = data
            .as_object()
            .ok_or_else(|| Error::Format("graph index must be a JSON object".to_string()))?;

        let mut dropped = 0usize;

        let mut nodes = Vec::new();
        for raw in array_field(obj, "nodes") {
            match parse_node(raw) {
                Some(node) => nodes.push(node),
                None => dropped += 1,
            }
        }

        let mut chunks = Vec::new();
        for raw in array_field(obj, "chunks") {
            match parse_chunk(raw) {
                Some(chunk) => chunks.push(chunk),
                None => dropped += 1,
            }
        }

        let mut edges = Vec::new();
        for raw in array_field(obj, "edges") {
            match parse_edge(raw) {
                Some(edge) => edges.push(edge),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::warn!(dropped, "skipped malformed graph entries while loading");
        }

        let index = Self::from_parts(nodes, chunks, edges);
        tracing::debug!(
            nodes = index.node_count(),
            chunks = index.chunk_count(),
            edges = index.edge_count(),
            "loaded graph index"
        );
        Ok(index)
    }

    /// Serialize to the versioned graph file format (pretty-printed UTF-8).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let file = GraphFile {
            version: GRAPH_FORMAT_VERSION,
            nodes: self.nodes.values().map(Arc::as_ref).collect(),
            chunks: self.chunks.values().map(Arc::as_ref).collect(),
            edges: self.edges.values().collect(),
        };
        let mut bytes = serde_json::to_vec_pretty(&file)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Number of splices since this lineage was loaded or built.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn node(&self, id: &str) -> Option<&Arc<Node>> {
        self.nodes.get(id)
    }

    pub fn chunk(&self, id: &str) -> Option<&Arc<Chunk>> {
        self.chunks.get(id)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    /// All chunks, ordered by id.
    pub fn chunks(&self) -> impl Iterator<Item = &Arc<Chunk>> {
        self.chunks.values()
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.chunks.is_empty()
    }

    /// Sorted neighbours of a node (empty for unknown ids).
    pub fn neighbors(&self, node_id: &str) -> impl Iterator<Item = &str> {
        self.node_neighbors
            .get(node_id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Ids of the nodes owning a chunk (empty for unknown ids).
    pub fn nodes_for_chunk(&self, chunk_id: &str) -> impl Iterator<Item = &str> {
        self.chunk_to_nodes
            .get(chunk_id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Lazily resolve chunk ids, skipping unknown ones. Restartable whenever
    /// `ids` is (e.g. pass `&set` again).
    pub fn iter_chunks<'a, I, S>(&'a self, ids: I) -> impl Iterator<Item = &'a Arc<Chunk>> + 'a
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: 'a,
        S: AsRef<str> + 'a,
    {
        ids.into_iter()
            .filter_map(move |id| self.chunks.get(id.as_ref()))
    }

    /// Breadth-first expansion through `node_neighbors`.
    ///
    /// Returns every node reached within `hops` hops of `seeds`, seeds
    /// included; `hops == 0` returns exactly the seeds.
    pub fn expand(&self, seeds: &BTreeSet<String>, hops: usize) -> BTreeSet<String> {
        let mut visited = seeds.clone();
        let mut frontier: VecDeque<(String, usize)> =
            seeds.iter().map(|id| (id.clone(), 0)).collect();

        while let Some((id, depth)) = frontier.pop_front() {
            if depth >= hops {
                continue;
            }
            for nb in self.neighbors(&id) {
                if visited.insert(nb.to_string()) {
                    frontier.push_back((nb.to_string(), depth + 1));
                }
            }
        }
        visited
    }

    /// Apply a patch, returning the next generation. `self` is untouched.
    pub fn splice(&self, patch: GraphPatch) -> GraphIndex {
        let GraphPatch {
            remove_nodes,
            remove_chunks,
            add_nodes,
            add_chunks,
            add_edges,
        } = patch;

        let mut next = self.clone();
        next.generation += 1;
        let mut affected: HashSet<String> = HashSet::new();

        // Old versions of removed or replaced nodes release their chunks.
        let replaced = add_nodes.iter().map(|n| n.id.as_str());
        let outgoing: BTreeSet<&str> = remove_nodes.iter().map(String::as_str).chain(replaced).collect();
        for id in outgoing {
            if let Some(old) = self.nodes.get(id) {
                for cid in &old.chunk_ids {
                    detach(&mut next.chunk_to_nodes, cid, id);
                }
            }
        }

        for id in &remove_nodes {
            next.nodes.remove(id);
            next.node_neighbors.remove(id);
            affected.insert(id.clone());
            if let Some(old) = self.node_neighbors.get(id) {
                affected.extend(old.iter().cloned());
            }
            for edge in next.remove_edges_of(id) {
                affected.insert(edge.source);
                affected.insert(edge.target);
            }
        }

        for cid in &remove_chunks {
            next.chunks.remove(cid);
        }
        for chunk in add_chunks {
            next.chunks.insert(chunk.id.clone(), Arc::new(chunk));
        }

        for node in add_nodes {
            for cid in &node.chunk_ids {
                attach(&mut next.chunk_to_nodes, cid, &node.id);
            }
            affected.insert(node.id.clone());
            next.nodes.insert(node.id.clone(), Arc::new(node));
        }

        for edge in add_edges {
            affected.insert(edge.source.clone());
            affected.insert(edge.target.clone());
            next.insert_edge(edge);
        }

        for id in &affected {
            if next.nodes.contains_key(id.as_str()) {
                next.refresh_neighbors(id);
            }
        }
        next
    }

    fn insert_edge(&mut self, edge: Edge) {
        let key = self.next_edge;
        self.next_edge += 1;
        for endpoint in [&edge.source, &edge.target] {
            let mut keys = self.edges_by_node.get(endpoint.as_str()).cloned().unwrap_or_default();
            keys.insert(key);
            self.edges_by_node.insert(endpoint.clone(), keys);
        }
        self.edges.insert(key, edge);
    }

    /// Drop every edge touching `node_id`, returning them.
    fn remove_edges_of(&mut self, node_id: &str) -> Vec<Edge> {
        let Some(keys) = self.edges_by_node.remove(node_id) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(edge) = self.edges.remove(&key) else {
                continue;
            };
            for endpoint in [&edge.source, &edge.target] {
                if endpoint == node_id {
                    continue;
                }
                if let Some(set) = self.edges_by_node.get_mut(endpoint.as_str()) {
                    set.remove(&key);
                    if set.is_empty() {
                        self.edges_by_node.remove(endpoint.as_str());
                    }
                }
            }
            removed.push(edge);
        }
        removed
    }

    /// Recompute the neighbour set of a known node from its edges.
    fn refresh_neighbors(&mut self, node_id: &str) {
        let mut set = BTreeSet::new();
        if let Some(keys) = self.edges_by_node.get(node_id) {
            for edge in keys.iter().filter_map(|k| self.edges.get(k)) {
                if edge.source == node_id {
                    set.insert(edge.target.clone());
                }
                if edge.target == node_id {
                    set.insert(edge.source.clone());
                }
            }
        }
        self.node_neighbors.insert(node_id.to_string(), Arc::new(set));
    }
}

fn attach(chunk_to_nodes: &mut PMap<String, IdSet>, chunk_id: &str, node_id: &str) {
    let mut set = chunk_to_nodes.get(chunk_id).cloned().unwrap_or_default();
    Arc::make_mut(&mut set).insert(node_id.to_string());
    chunk_to_nodes.insert(chunk_id.to_string(), set);
}

fn detach(chunk_to_nodes: &mut PMap<String, IdSet>, chunk_id: &str, node_id: &str) {
    if let Some(set) = chunk_to_nodes.get_mut(chunk_id) {
        Arc::make_mut(set).remove(node_id);
        if set.is_empty() {
            chunk_to_nodes.remove(chunk_id);
        }
    }
}

fn array_field<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Value> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Read a scalar field as a trimmed string; `None` when missing, null,
/// structured, or blank.
fn scalar(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_node(raw: &Value) -> Option<Node> {
    let obj = raw.as_object()?;
    let id = scalar(obj.get("id"))?;
    let title = scalar(obj.get("title"))?;
    let chunk_ids: Vec<String> = obj
        .get("chunk_ids")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|cid| scalar(Some(cid)))
        .collect();
    Some(Node::new(id, title, chunk_ids))
}

fn parse_chunk(raw: &Value) -> Option<Chunk> {
    let obj = raw.as_object()?;
    let id = scalar(obj.get("id"))?;
    let text = scalar(obj.get("text"))?;
    let metadata: Metadata = obj
        .get("metadata")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    Some(Chunk {
        id,
        text,
        source: scalar(obj.get("source")),
        section: scalar(obj.get("section")),
        metadata,
    })
}

fn parse_edge(raw: &Value) -> Option<Edge> {
    let obj = raw.as_object()?;
    let source = scalar(obj.get("source"))?;
    let target = scalar(obj.get("target"))?;
    let relation = scalar(obj.get("relation")).unwrap_or_else(|| DEFAULT_RELATION.to_string());
    Some(Edge::new(source, target, relation))
}

/// Publishes the current [`GraphIndex`] generation to concurrent readers.
///
/// Swapping the `Arc` is the only write; readers clone the pointer under a
/// short read lock and never observe a half-applied mutation.
#[derive(Debug, Default)]
pub struct SharedGraph {
    current: RwLock<Arc<GraphIndex>>,
}

impl SharedGraph {
    pub fn new(index: GraphIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The current generation.
    pub fn snapshot(&self) -> Arc<GraphIndex> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current generation, returning the published snapshot.
    pub fn publish(&self, index: GraphIndex) -> Arc<GraphIndex> {
        let next = Arc::new(index);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GraphIndex {
        GraphIndex::from_parts(
            vec![
                Node::new("file:a", "a.md", Vec::<String>::new()),
                Node::new("sec:a:0", "Intro", ["chunk:a:0"]),
                Node::new("sec:a:1", "Fields", ["chunk:a:1"]),
                Node::new("sec:a:2", "Lines", ["chunk:a:2", "chunk:missing"]),
            ],
            vec![
                Chunk::new("chunk:a:0", "intro text").with_source("a.md"),
                Chunk::new("chunk:a:1", "field text").with_source("a.md"),
                Chunk::new("chunk:a:2", "line text").with_source("a.md"),
            ],
            vec![
                Edge::new("file:a", "sec:a:0", "contains"),
                Edge::new("file:a", "sec:a:1", "contains"),
                Edge::new("sec:a:1", "sec:a:2", "contains"),
                Edge::new("sec:a:0", "sec:a:1", "next"),
                Edge::new("sec:a:1", "sec:a:2", "next"),
            ],
        )
    }

    fn seeds(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn assert_derived_consistent(index: &GraphIndex) {
        let nodes: Vec<Node> = index.nodes().map(|n| n.as_ref().clone()).collect();
        let chunks: Vec<Chunk> = index.chunks().map(|c| c.as_ref().clone()).collect();
        let rebuilt = GraphIndex::from_parts(nodes, chunks, index.edges().cloned().collect());
        assert_eq!(index.node_neighbors, rebuilt.node_neighbors);
        assert_eq!(index.chunk_to_nodes, rebuilt.chunk_to_nodes);

        // every edge is indexed under both endpoints and nothing else is
        let mut indexed = 0;
        for (endpoint, keys) in index.edges_by_node.iter() {
            assert!(!keys.is_empty());
            for key in keys.iter() {
                let edge = &index.edges[key];
                assert!(edge.touches(endpoint));
                indexed += 1;
            }
        }
        let expected: usize = index
            .edges()
            .map(|e| if e.source == e.target { 1 } else { 2 })
            .sum();
        assert_eq!(indexed, expected);
    }

    #[test]
    fn test_neighbors_are_symmetric_and_sorted() {
        let index = sample();
        let nb: Vec<&str> = index.neighbors("sec:a:1").collect();
        assert_eq!(nb, vec!["file:a", "sec:a:0", "sec:a:2"]);
        let nb: Vec<&str> = index.neighbors("sec:a:0").collect();
        assert_eq!(nb, vec!["file:a", "sec:a:1"]);
    }

    #[test]
    fn test_chunk_to_nodes_tolerates_dangling_ids() {
        let index = sample();
        let owners: Vec<&str> = index.nodes_for_chunk("chunk:missing").collect();
        assert_eq!(owners, vec!["sec:a:2"]);
        assert!(index.chunk("chunk:missing").is_none());
    }

    #[test]
    fn test_iter_chunks_skips_unknown_and_restarts() {
        let index = sample();
        let ids = vec!["chunk:a:2", "nope", "chunk:a:0"];
        let first: Vec<&str> = index.iter_chunks(&ids).map(|c| c.id.as_str()).collect();
        let second: Vec<&str> = index.iter_chunks(&ids).map(|c| c.id.as_str()).collect();
        assert_eq!(first, vec!["chunk:a:2", "chunk:a:0"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_expand_zero_hops_returns_seeds() {
        let index = sample();
        let s = seeds(&["sec:a:0"]);
        assert_eq!(index.expand(&s, 0), s);
    }

    #[test]
    fn test_expand_is_monotonic_in_hops() {
        let index = sample();
        let s = seeds(&["sec:a:0"]);
        let mut previous = index.expand(&s, 0);
        for hops in 1..5 {
            let current = index.expand(&s, hops);
            assert!(current.is_superset(&previous), "hops={} shrank", hops);
            previous = current;
        }
        assert_eq!(
            index.expand(&s, 1),
            seeds(&["file:a", "sec:a:0", "sec:a:1"])
        );
        assert_eq!(index.expand(&s, 2).len(), 4);
    }

    #[test]
    fn test_load_drops_malformed_entries() {
        let raw = br#"{
            "version": 1,
            "nodes": [
                {"id": "n1", "title": "One", "chunk_ids": ["c1", "", 7]},
                {"id": "", "title": "nameless"},
                {"id": "n2", "title": "  "},
                "garbage"
            ],
            "chunks": [
                {"id": "c1", "text": " hello ", "source": "s.md", "section": null},
                {"id": "c2", "text": ""},
                {"id": "c3", "text": "meta", "metadata": {"course_id": "phy101"}}
            ],
            "edges": [
                {"source": "n1", "target": "n9"},
                {"source": "", "target": "n1", "relation": "next"}
            ]
        }"#;
        let index = GraphIndex::load(raw).unwrap();
        assert_eq!(index.node_count(), 1);
        assert_eq!(index.node("n1").unwrap().chunk_ids, vec!["c1", "7"]);
        assert_eq!(index.chunk_count(), 2);
        assert_eq!(index.chunk("c1").unwrap().text, "hello");
        assert_eq!(index.chunk("c1").unwrap().section, None);
        assert_eq!(
            index.chunk("c3").unwrap().metadata.get("course_id"),
            Some(&Value::String("phy101".into()))
        );
        assert_eq!(index.edge_count(), 1);
        assert_eq!(index.edges().next().unwrap().relation, "related");
        let nb: Vec<&str> = index.neighbors("n1").collect();
        assert_eq!(nb, vec!["n9"]);
    }

    #[test]
    fn test_load_rejects_non_object() {
        assert!(matches!(GraphIndex::load(b"[1,2]"), Err(Error::Format(_))));
        assert!(matches!(GraphIndex::load(b"{not json"), Err(Error::Format(_))));
    }

    #[test]
    fn test_json_roundtrip_preserves_graph() {
        let mut meta = Metadata::new();
        meta.insert("course_id".into(), Value::String("c".into()));
        let index = sample().splice(GraphPatch {
            add_chunks: vec![Chunk::new("x", "extra").with_metadata(meta)],
            ..Default::default()
        });
        let reloaded = GraphIndex::load(&index.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.node_count(), index.node_count());
        assert_eq!(reloaded.chunk_count(), index.chunk_count());
        assert!(reloaded.edges().eq(index.edges()));
        assert_eq!(reloaded.chunk("x").unwrap().metadata.len(), 1);
        assert_derived_consistent(&reloaded);
    }

    #[test]
    fn test_splice_matches_full_rebuild() {
        let base = sample();
        let patch = GraphPatch {
            remove_nodes: seeds(&["sec:a:1"]),
            remove_chunks: seeds(&["chunk:a:1"]),
            add_nodes: vec![
                Node::new("sec:a:9", "New", ["chunk:a:9"]),
                Node::new("sec:a:0", "Intro v2", ["chunk:a:0", "chunk:a:9"]),
            ],
            add_chunks: vec![Chunk::new("chunk:a:9", "new text")],
            add_edges: vec![
                Edge::new("file:a", "sec:a:9", "contains"),
                Edge::new("sec:a:0", "sec:a:9", "next"),
            ],
        };
        let next = base.splice(patch);
        assert_eq!(next.generation(), base.generation() + 1);
        assert_derived_consistent(&next);
        assert!(next.node("sec:a:1").is_none());
        assert!(next.edges().all(|e| !e.touches("sec:a:1")));
        assert_eq!(next.node("sec:a:0").unwrap().title, "Intro v2");
        // The previous generation is untouched.
        assert!(base.node("sec:a:1").is_some());
        assert_derived_consistent(&base);
    }

    #[test]
    fn test_repeated_splices_stay_consistent() {
        let mut index = sample();
        for round in 0..5 {
            let id = format!("sec:x:{}", round);
            let mut remove_nodes = BTreeSet::new();
            if round > 0 {
                remove_nodes.insert(format!("sec:x:{}", round - 1));
            }
            index = index.splice(GraphPatch {
                remove_nodes,
                add_nodes: vec![Node::new(id.clone(), "X", ["chunk:a:0"])],
                add_edges: vec![
                    Edge::new("sec:a:0", id.clone(), "related"),
                    Edge::new(id.clone(), id.clone(), "self"),
                ],
                ..Default::default()
            });
            assert_derived_consistent(&index);
        }
        assert_eq!(index.generation(), 5);
        assert_eq!(index.edge_count(), sample().edge_count() + 2);
        let owners: Vec<&str> = index.nodes_for_chunk("chunk:a:0").collect();
        assert_eq!(owners, vec!["sec:a:0", "sec:x:4"]);
        let nb: Vec<&str> = index.neighbors("sec:x:4").collect();
        assert_eq!(nb, vec!["sec:a:0", "sec:x:4"]);
    }

    #[test]
    fn test_splice_shares_unchanged_chunks() {
        let base = sample();
        let next = base.splice(GraphPatch {
            add_chunks: vec![Chunk::new("z", "zzz")],
            ..Default::default()
        });
        assert!(Arc::ptr_eq(
            base.chunk("chunk:a:0").unwrap(),
            next.chunk("chunk:a:0").unwrap()
        ));
    }

    #[test]
    fn test_shared_graph_snapshot_survives_publish() {
        let shared = SharedGraph::new(sample());
        let before = shared.snapshot();
        shared.publish(GraphIndex::new());
        assert_eq!(before.node_count(), 4);
        assert!(shared.snapshot().is_empty());
    }
}
