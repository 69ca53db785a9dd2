//! Index-writing commands: `grag build`, `grag add`/`update` and
//! `grag remove`.
//!
//! `build` regenerates the graph from markdown on disk (and optionally
//! re-embeds every chunk into a fresh vector index). The other commands
//! apply one incremental change through the [`IndexUpdater`](crate::updater::IndexUpdater).

use anyhow::{bail, Context, Result};
use graphrag_core::models::{DocType, Document};
use graphrag_core::store::VectorIndex;
use std::path::{Path, PathBuf};

use crate::builder::{build_graph, collect_markdown_files, embed_chunks};
use crate::config::Config;
use crate::embedding::create_provider;
use crate::persist::write_graph;
use crate::pool::WorkerPool;
use crate::service::RagService;
use crate::updater::IngestResponse;
use crate::vector_store::FlatVectorStore;

/// Options for `grag build`.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub input: PathBuf,
    pub root: PathBuf,
    pub output: Option<PathBuf>,
    pub course_id: Option<String>,
    pub embed: bool,
}

pub async fn run_build(config: &Config, opts: &BuildOptions) -> Result<()> {
    if opts.embed && !config.embedding.is_enabled() {
        bail!("--embed requires an embedding provider (embedding.provider is disabled)");
    }

    let paths = collect_markdown_files(&opts.input)?;
    if paths.is_empty() {
        bail!("No markdown files found under {}", opts.input.display());
    }

    let graph = build_graph(&paths, &opts.root, opts.course_id.as_deref())?;
    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| config.index.graph_path.clone());
    write_graph(&output, &graph)
        .with_context(|| format!("Failed to write graph index to {}", output.display()))?;

    println!("Build complete:");
    println!("  files: {}", paths.len());
    println!("  nodes: {}", graph.node_count());
    println!("  chunks: {}", graph.chunk_count());
    println!("  edges: {}", graph.edge_count());
    println!("  output: {}", output.display());

    if opts.embed {
        let pool = WorkerPool::new(config.runtime.worker_threads);
        let embedder = create_provider(&config.embedding, &pool)?;
        let vectors = FlatVectorStore::new(pool).with_overfetch(config.index.overfetch);
        let count = embed_chunks(&graph, embedder.as_ref(), &vectors).await?;
        vectors.save(&config.index.vector_dir).await.with_context(|| {
            format!(
                "Failed to write vector index to {}",
                config.index.vector_dir.display()
            )
        })?;
        println!("  embedded: {}", count);
        println!("  vectors: {}", config.index.vector_dir.display());
    }

    Ok(())
}

/// Document fields for `grag add` / `grag update`.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub id: String,
    pub file: Option<PathBuf>,
    pub content: Option<String>,
    pub doc_type: String,
    pub source: Option<String>,
    pub course_id: Option<String>,
    pub user_id: Option<String>,
}

impl DocumentInput {
    fn into_document(self) -> Result<Document> {
        let content = match (self.content, &self.file) {
            (Some(content), None) => content,
            (None, Some(file)) => read_content(file)?,
            (Some(_), Some(_)) => bail!("Pass either --file or --content, not both"),
            (None, None) => bail!("One of --file or --content is required"),
        };

        let mut doc = Document::new(self.id, content, DocType::from(self.doc_type.as_str()));
        if let Some(source) = self.source {
            doc.source = source;
        } else if let Some(file) = &self.file {
            doc.source = file.to_string_lossy().replace('\\', "/");
        }
        doc.course_id = self.course_id;
        doc.user_id = self.user_id;
        Ok(doc)
    }
}

fn read_content(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub async fn run_add(config: &Config, input: DocumentInput, replace: bool) -> Result<()> {
    let doc = input.into_document()?;
    let service = RagService::open(config.clone()).await?;
    let response = if replace {
        service.update(&doc).await
    } else {
        service.ingest(&doc).await
    };
    report(response)
}

pub async fn run_remove(config: &Config, doc_id: &str) -> Result<()> {
    let service = RagService::open(config.clone()).await?;
    report(service.remove(doc_id).await)
}

fn report(response: IngestResponse) -> Result<()> {
    if !response.success {
        bail!("{}", response.message);
    }
    println!("{}", response.message);
    println!("  chunks affected: {}", response.chunks_affected);
    Ok(())
}
