#![allow(dead_code)]

use async_trait::async_trait;
use graphrag_core::embedding::EmbeddingProvider;
use graphrag_core::models::{DocType, Document};
use graphrag_core::Result;
use graphrag_harness::config::Config;
use graphrag_harness::persist::read_graph;
use graphrag_harness::pool::WorkerPool;
use graphrag_harness::service::RagService;
use graphrag_harness::vector_store::FlatVectorStore;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DIM: usize = 16;

/// Deterministic embedder: a character histogram folded into `DIM` buckets.
#[derive(Default)]
pub struct HistogramEmbedder {
    pub calls: AtomicUsize,
}

impl HistogramEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            v[(c as usize) % DIM] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HistogramEmbedder {
    fn model_name(&self) -> &str {
        "histogram"
    }

    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.index.graph_path = root.join("data").join("graph.json");
    config.index.vector_dir = root.join("data").join("vectors");
    config
}

/// Open a service over the files configured in `config`, embedding with
/// [`HistogramEmbedder`].
pub async fn open_service(config: Config) -> RagService {
    let pool = WorkerPool::new(config.runtime.worker_threads);
    let vectors = FlatVectorStore::open(pool.clone(), &config.index.vector_dir, config.index.overfetch)
        .await
        .unwrap();
    let graph = read_graph(&config.index.graph_path).unwrap();
    RagService::from_parts(
        config,
        pool,
        Arc::new(HistogramEmbedder::default()),
        Arc::new(vectors),
        graph,
    )
}

pub fn lecture(id: &str, course: &str, content: &str) -> Document {
    let mut doc = Document::new(id, content, DocType::Markdown);
    doc.source = format!("{}.md", id);
    doc.course_id = Some(course.to_string());
    doc
}

pub fn homework(id: &str, course: &str, user: &str, content: &str) -> Document {
    let mut doc = Document::new(id, content, DocType::Assignment);
    doc.source = format!("assignment:{}", id);
    doc.course_id = Some(course.to_string());
    doc.user_id = Some(user.to_string());
    doc
}

pub const FIELDS: &str = "# 电场\n电场强度的定义是单位正电荷所受的力\n## 电场线\n电场线与等势面正交\n# 磁场\n磁感应强度与洛伦兹力";
pub const CIRCUITS: &str = "# 电路\n欧姆定律描述电压与电流的关系\n# 电容\n电容器储存电场能量";
