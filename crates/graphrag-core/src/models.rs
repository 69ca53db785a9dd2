//! Core data models shared by the graph index, the updater and the
//! retrieval pipeline.
//!
//! Chunks and nodes are immutable once created; the graph index shares them
//! between generations through `Arc`, so cloning an index never copies text.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Per-chunk metadata: a string-keyed JSON map (`course_id`, `user_id`,
/// `doc_id`, `source`, `section`, …). Filters compare values by equality.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// The smallest retrievable unit of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Globally unique id that encodes the origin document,
    /// e.g. `chunk:doc:<doc_id>:<ordinal>`.
    pub id: String,
    pub text: String,
    pub source: Option<String>,
    pub section: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: None,
            section: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Source label used in rendered context headers and citations.
    pub fn source_label(&self) -> &str {
        self.source.as_deref().unwrap_or("unknown")
    }
}

/// A graph vertex grouping one or more chunks (a document, a section, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: String,
    pub title: String,
    /// Ordered set of owned chunk ids. Ids may dangle after a partial load.
    pub chunk_ids: Vec<String>,
}

impl Node {
    /// Build a node, dropping duplicate chunk ids while keeping first-seen order.
    pub fn new<I, S>(id: impl Into<String>, title: impl Into<String>, chunk_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let chunk_ids = chunk_ids
            .into_iter()
            .map(Into::into)
            .filter(|cid: &String| seen.insert(cid.clone()))
            .collect();
        Self {
            id: id.into(),
            title: title.into(),
            chunk_ids,
        }
    }
}

/// A typed relation between two nodes. Stored directed, expanded as undirected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Open tag: `"contains"`, `"next"`, `"related"`, …
    pub relation: String,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Chunking strategy selected by a document's `doc_type`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    #[default]
    Markdown,
    Assignment,
    Faq,
    /// Any unrecognised tag; chunked as one whole-document chunk.
    Other(String),
}

impl From<&str> for DocType {
    fn from(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => DocType::Markdown,
            "assignment" => DocType::Assignment,
            "faq" => DocType::Faq,
            _ => DocType::Other(tag.to_string()),
        }
    }
}

impl From<String> for DocType {
    fn from(tag: String) -> Self {
        DocType::from(tag.as_str())
    }
}

impl From<DocType> for String {
    fn from(doc_type: DocType) -> Self {
        match doc_type {
            DocType::Markdown => "markdown".to_string(),
            DocType::Assignment => "assignment".to_string(),
            DocType::Faq => "faq".to_string(),
            DocType::Other(tag) => tag,
        }
    }
}

/// A document handed to the index updater. Exists only for the duration of
/// an add/update call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    /// Human-readable origin, e.g. `assignment:12345` or `docs/chapter1.md`.
    pub source: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub doc_type: DocType,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, doc_type: DocType) -> Self {
        let id = id.into();
        Self {
            source: id.clone(),
            id,
            content: content.into(),
            course_id: None,
            user_id: None,
            doc_type,
        }
    }

    /// Graph node id and chunk `source` tag for this document.
    pub fn node_id(&self) -> String {
        document_node_id(&self.id)
    }
}

/// `doc:<id>`: the node id and chunk source tag of an updater document.
pub fn document_node_id(doc_id: &str) -> String {
    format!("doc:{}", doc_id)
}

/// A ranking output: a chunk with its score from the stage that produced it.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Arc<Chunk>,
    pub score: f64,
}

/// Structured citation for a rendered context block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// Reference number as rendered: `[1]`, `[2]`, …
    pub index: usize,
    pub source: String,
    pub section: Option<String>,
    pub chunk_id: String,
    /// Chunk text truncated to the citation budget, with `...` when cut.
    pub text: String,
    pub score: f64,
}
