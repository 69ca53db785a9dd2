//! Offline index builder.
//!
//! Turns a markdown file or a directory tree of `*.md` files into a
//! [`GraphIndex`]:
//!
//! - one node `file:<source>` per file, where `<source>` is the path
//!   relative to the build root with `/` separators
//! - one node `sec:<source>:<i>` and one chunk `chunk:<source>:<i>` per
//!   non-empty section
//! - a `contains` edge from the nearest shallower section (or the file
//!   node) to each section, and a `next` edge between consecutive sections
//!
//! Files without any section text are skipped. [`embed_chunks`] optionally
//! fills a vector index for the built chunks.

use anyhow::{Context, Result};
use graphrag_core::chunk::parse_markdown_sections;
use graphrag_core::embedding::EmbeddingProvider;
use graphrag_core::graph::GraphIndex;
use graphrag_core::models::{Chunk, Edge, Metadata, Node};
use graphrag_core::store::{VectorIndex, VectorRecord};
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::updater::{CONTAINS, NEXT};

/// Every `*.md` file under `input`, sorted; `input` itself when it is a file.
pub fn collect_markdown_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.exists() {
        anyhow::bail!("Input path does not exist: {}", input.display());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(input) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) == Some("md") {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// `path` relative to `root` with forward slashes; the full path when it
/// lies outside `root`.
pub fn relative_source(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Read `paths` and build the graph. Sources are rendered relative to `root`.
pub fn build_graph(paths: &[PathBuf], root: &Path, course_id: Option<&str>) -> Result<GraphIndex> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        sources.push((relative_source(path, root), text));
    }
    Ok(build_from_sources(&sources, course_id))
}

/// Build the graph from in-memory `(source, markdown)` pairs.
pub fn build_from_sources(sources: &[(String, String)], course_id: Option<&str>) -> GraphIndex {
    let mut nodes = Vec::new();
    let mut chunks = Vec::new();
    let mut edges = Vec::new();

    for (source, markdown) in sources {
        let sections = parse_markdown_sections(markdown);
        if sections.is_empty() {
            tracing::debug!(source = %source, "no sections; skipped");
            continue;
        }

        let file_node = format!("file:{}", source);
        nodes.push(Node::new(file_node.clone(), source.clone(), Vec::<String>::new()));

        // (level, node id); the file node sits below every heading level.
        let mut stack: Vec<(usize, String)> = vec![(0, file_node.clone())];
        for (i, section) in sections.into_iter().enumerate() {
            let node_id = format!("sec:{}:{}", source, i);
            let chunk_id = format!("chunk:{}:{}", source, i);

            nodes.push(Node::new(node_id.clone(), section.title.clone(), [chunk_id.clone()]));
            chunks.push(
                Chunk::new(chunk_id, section.text)
                    .with_source(source.clone())
                    .with_metadata(chunk_metadata(source, &section.title, course_id))
                    .with_section(section.title),
            );

            while stack.last().is_some_and(|(level, _)| *level >= section.level) {
                stack.pop();
            }
            let parent = stack
                .last()
                .map(|(_, id)| id.clone())
                .unwrap_or_else(|| file_node.clone());
            edges.push(Edge::new(parent, node_id.clone(), CONTAINS));

            if i > 0 {
                edges.push(Edge::new(format!("sec:{}:{}", source, i - 1), node_id.clone(), NEXT));
            }
            stack.push((section.level, node_id));
        }
    }

    tracing::info!(
        files = sources.len(),
        nodes = nodes.len(),
        chunks = chunks.len(),
        edges = edges.len(),
        "built graph"
    );
    GraphIndex::from_parts(nodes, chunks, edges)
}

fn chunk_metadata(source: &str, section: &str, course_id: Option<&str>) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("source".into(), Value::String(source.to_string()));
    meta.insert("section".into(), Value::String(section.to_string()));
    meta.insert(
        "course_id".into(),
        Value::String(course_id.unwrap_or_default().to_string()),
    );
    meta.insert("user_id".into(), Value::String(String::new()));
    meta
}

/// Embed every chunk of `graph` into `vectors`. Returns the number of
/// vectors written.
pub async fn embed_chunks(
    graph: &GraphIndex,
    embedder: &dyn EmbeddingProvider,
    vectors: &dyn VectorIndex,
) -> graphrag_core::Result<usize> {
    let chunks: Vec<&Chunk> = graph.chunks().map(|c| c.as_ref()).collect();
    if chunks.is_empty() {
        return Ok(0);
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed_texts(&texts).await?;
    if embeddings.len() != chunks.len() {
        return Err(graphrag_core::Error::embedding(format!(
            "provider returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }

    let records: Vec<VectorRecord> = chunks
        .iter()
        .zip(embeddings)
        .map(|(c, v)| VectorRecord::new(c.id.clone(), v, c.metadata.clone()))
        .collect();
    let count = records.len();
    vectors.add(records).await?;
    tracing::info!(count, model = embedder.model_name(), "embedded chunks");
    Ok(count)
}
