//! Hybrid retrieval: bigram lexical ranking, vector search, reciprocal rank
//! fusion, graph expansion and context rendering.
//!
//! The pipeline works entirely through a [`GraphIndex`] snapshot, a
//! [`VectorIndex`] and an [`EmbeddingProvider`]. The calling application
//! owns those and passes them in; nothing here holds state between queries.
//!
//! # Algorithm
//!
//! 1. Compute the ACL-allowed chunk set from the caller's [`AccessContext`].
//! 2. Rank allowed chunks lexically (`seed_top_k × 2` candidates).
//! 3. Embed the query and search the vector index under the same filters
//!    (`seed_top_k × 2` hits). Skipped in keyword mode.
//! 4. Fuse both lists with RRF: rank `r` contributes `1 / (k + r + 1)`.
//! 5. Map the top `seed_top_k` fused chunks to their nodes, expand
//!    `expand_hops` hops, and collect every chunk owned by a visited node
//!    that the caller may see.
//! 6. Re-rank the expanded set lexically (`final_top_k × 2`), reuse the
//!    semantic hits that fall inside it, fuse again, keep `final_top_k`.
//! 7. Render `[i] source#section` blocks within `max_chars`.
//!
//! Empty queries and empty intermediate results produce an empty context,
//! never an error. Only the embedding and vector backends can fail.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::graph::GraphIndex;
use crate::models::{Chunk, Citation, RetrievedChunk};
use crate::store::{matches_filters, Filters, VectorIndex};

/// Caller role as sent with a retrieval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Student,
    Admin,
    Other(String),
}

impl From<&str> for Role {
    fn from(role: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "teacher" => Role::Teacher,
            "student" => Role::Student,
            "admin" => Role::Admin,
            _ => Role::Other(role.to_string()),
        }
    }
}

/// ACL fields of a retrieval request.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub course_id: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<Role>,
}

impl AccessContext {
    /// Unrestricted access.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(course_id: Option<&str>, user_id: Option<&str>, role: Option<&str>) -> Self {
        Self {
            course_id: course_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            role: role.map(Role::from),
        }
    }

    /// Metadata filters implied by this context: `course_id` when set, and
    /// `user_id` when the caller is a student with a user id. Blank values
    /// count as unset.
    pub fn filters(&self) -> Filters {
        let mut filters = Filters::new();
        if let Some(course) = self.course_id.as_deref().filter(|c| !c.is_empty()) {
            filters.insert("course_id".to_string(), course.to_string());
        }
        if self.role == Some(Role::Student) {
            if let Some(user) = self.user_id.as_deref().filter(|u| !u.is_empty()) {
                filters.insert("user_id".to_string(), user.to_string());
            }
        }
        filters
    }
}

/// Which branches of the pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Hybrid when the embedding provider is enabled, keyword otherwise.
    #[default]
    Auto,
    Hybrid,
    Keyword,
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(RetrievalMode::Auto),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            "keyword" => Ok(RetrievalMode::Keyword),
            other => Err(format!(
                "unknown retrieval mode '{}' (expected auto, hybrid or keyword)",
                other
            )),
        }
    }
}

/// Retrieval tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalParams {
    pub seed_top_k: usize,
    pub expand_hops: usize,
    pub final_top_k: usize,
    pub max_chars: usize,
    pub max_citation_text: usize,
    pub rrf_k: usize,
    pub mode: RetrievalMode,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            seed_top_k: 4,
            expand_hops: 1,
            final_top_k: 8,
            max_chars: 4000,
            max_citation_text: 200,
            rrf_k: 60,
            mode: RetrievalMode::Auto,
        }
    }
}

/// Inputs for a single retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    pub access: &'a AccessContext,
    pub params: RetrievalParams,
}

/// Rendered context plus one citation per included block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedContext {
    pub context: String,
    pub citations: Vec<Citation>,
}

impl RenderedContext {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

/// Character bigrams of `text` after removing all whitespace and
/// lower-casing. A one-character string is its own single "bigram".
pub fn bigrams(text: &str) -> HashSet<String> {
    let normalized: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    match normalized.len() {
        0 => HashSet::new(),
        1 => HashSet::from([normalized[0].to_string()]),
        _ => normalized
            .windows(2)
            .map(|w| w.iter().collect::<String>())
            .collect(),
    }
}

/// Fraction of the query's bigrams present in `text`.
pub fn lexical_score(query_bigrams: &HashSet<String>, text: &str) -> f64 {
    if query_bigrams.is_empty() {
        return 0.0;
    }
    let chunk_bigrams = bigrams(text);
    if chunk_bigrams.is_empty() {
        return 0.0;
    }
    let overlap = query_bigrams.intersection(&chunk_bigrams).count();
    overlap as f64 / query_bigrams.len() as f64
}

/// Ids of chunks whose metadata satisfies `filters`; all chunks when
/// `filters` is empty.
pub fn allowed_chunk_ids(graph: &GraphIndex, filters: &Filters) -> BTreeSet<String> {
    graph
        .chunks()
        .filter(|c| filters.is_empty() || matches_filters(&c.metadata, filters))
        .map(|c| c.id.clone())
        .collect()
}

/// Score `ids` lexically against `query` and keep the best `max(1, top_k)`.
///
/// Zero-overlap chunks are excluded. Order is score descending, then longer
/// text first, then input order.
pub fn rank_lexical<'a, I, S>(
    graph: &'a GraphIndex,
    query: &str,
    ids: I,
    top_k: usize,
) -> Vec<RetrievedChunk>
where
    I: IntoIterator<Item = S>,
    I::IntoIter: 'a,
    S: AsRef<str> + 'a,
{
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    let q = bigrams(query);

    let mut scored: Vec<(RetrievedChunk, usize)> = graph
        .iter_chunks(ids)
        .filter_map(|chunk| {
            let score = lexical_score(&q, &chunk.text);
            (score > 0.0).then(|| {
                let len = chunk.text.chars().count();
                (
                    RetrievedChunk {
                        chunk: Arc::clone(chunk),
                        score,
                    },
                    len,
                )
            })
        })
        .collect();

    scored.sort_by(|(a, a_len), (b, b_len)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b_len.cmp(a_len))
    });
    scored.truncate(top_k.max(1));
    scored.into_iter().map(|(r, _)| r).collect()
}

/// Reciprocal rank fusion of a lexical ranking and a semantic ranking.
///
/// Each list contributes `1 / (k + rank + 1)` per chunk. Ids unknown to the
/// graph still occupy their rank but are left out of the output. Equal
/// scores keep first-seen order (lexical list first).
pub fn rrf_merge(
    graph: &GraphIndex,
    keyword: &[RetrievedChunk],
    semantic: &[(String, f32)],
    k: usize,
) -> Vec<RetrievedChunk> {
    let mut order: Vec<(String, f64)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut chunks: HashMap<String, Arc<Chunk>> = HashMap::new();

    let mut contribute = |id: &str, rank: usize| {
        let inc = 1.0 / (k + rank + 1) as f64;
        match slots.get(id) {
            Some(&slot) => order[slot].1 += inc,
            None => {
                slots.insert(id.to_string(), order.len());
                order.push((id.to_string(), inc));
            }
        }
    };

    for (rank, r) in keyword.iter().enumerate() {
        contribute(&r.chunk.id, rank);
        chunks.insert(r.chunk.id.clone(), Arc::clone(&r.chunk));
    }
    for (rank, (id, _)) in semantic.iter().enumerate() {
        contribute(id, rank);
        if !chunks.contains_key(id) {
            if let Some(chunk) = graph.chunk(id) {
                chunks.insert(id.clone(), Arc::clone(chunk));
            }
        }
    }

    order.sort_by(|a, b| b.1.total_cmp(&a.1));
    order
        .into_iter()
        .filter_map(|(id, score)| {
            chunks
                .get(&id)
                .map(|chunk| RetrievedChunk {
                    chunk: Arc::clone(chunk),
                    score,
                })
        })
        .collect()
}

/// Chunks reachable from `seed_chunks` within `hops` hops: every chunk owned
/// by a node within reach, plus the seeds themselves.
pub fn expand_chunks(graph: &GraphIndex, seed_chunks: &BTreeSet<String>, hops: usize) -> BTreeSet<String> {
    let seed_nodes: BTreeSet<String> = seed_chunks
        .iter()
        .flat_map(|cid| graph.nodes_for_chunk(cid))
        .map(str::to_string)
        .collect();

    let mut expanded = seed_chunks.clone();
    for node_id in graph.expand(&seed_nodes, hops) {
        if let Some(node) = graph.node(&node_id) {
            expanded.extend(node.chunk_ids.iter().cloned());
        }
    }
    expanded
}

/// Render ranked chunks as `[i] source#section\ntext` blocks separated by a
/// blank line. Stops before the first block that would take the output
/// past `max_chars` characters; blocks are never cut.
pub fn render_context(ranked: &[RetrievedChunk], max_chars: usize, max_citation_text: usize) -> RenderedContext {
    let mut parts: Vec<String> = Vec::new();
    let mut citations = Vec::new();
    let mut used = 0usize;

    for (i, r) in ranked.iter().enumerate() {
        let index = i + 1;
        let chunk = &r.chunk;
        let mut header = format!("[{}] {}", index, chunk.source_label());
        if let Some(section) = chunk.section.as_deref().filter(|s| !s.is_empty()) {
            header.push('#');
            header.push_str(section);
        }
        let text = chunk.text.trim();
        let block = format!("{}\n{}", header, text);
        let cost = block.chars().count() + 2;
        if used + cost > max_chars {
            break;
        }
        used += cost;
        parts.push(block);

        let mut cited: String = text.chars().take(max_citation_text).collect();
        if text.chars().count() > max_citation_text {
            cited.push_str("...");
        }
        citations.push(Citation {
            index,
            source: chunk.source_label().to_string(),
            section: chunk.section.clone(),
            chunk_id: chunk.id.clone(),
            text: cited,
            score: r.score,
        });
    }

    RenderedContext {
        context: parts.join("\n\n").trim().to_string(),
        citations,
    }
}

/// Run the retrieval pipeline and return the final ranking (at most
/// `final_top_k` chunks, RRF-scored).
pub async fn retrieve(
    graph: &GraphIndex,
    vectors: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    req: &RetrievalRequest<'_>,
) -> Result<Vec<RetrievedChunk>> {
    let query = req.query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let params = &req.params;
    let filters = req.access.filters();
    let allowed = allowed_chunk_ids(graph, &filters);

    let keyword = rank_lexical(graph, query, &allowed, params.seed_top_k * 2);

    let use_semantic = match params.mode {
        RetrievalMode::Keyword => false,
        RetrievalMode::Hybrid => true,
        RetrievalMode::Auto => embedder.is_enabled(),
    };
    let semantic: Vec<(String, f32)> = if use_semantic {
        let query_vec = embedder.embed_query(query).await?;
        let filter_arg = (!filters.is_empty()).then_some(&filters);
        vectors
            .search(&query_vec, params.seed_top_k * 2, filter_arg)
            .await?
            .into_iter()
            .map(|hit| (hit.chunk_id, hit.score))
            .collect()
    } else {
        Vec::new()
    };

    let merged = rrf_merge(graph, &keyword, &semantic, params.rrf_k);
    if merged.is_empty() {
        tracing::debug!(query, "no seed chunks");
        return Ok(Vec::new());
    }

    let seeds: BTreeSet<String> = merged
        .iter()
        .take(params.seed_top_k)
        .map(|r| r.chunk.id.clone())
        .collect();
    let expanded: BTreeSet<String> = expand_chunks(graph, &seeds, params.expand_hops)
        .into_iter()
        .filter(|id| allowed.contains(id))
        .collect();

    let expanded_keyword = rank_lexical(graph, query, &expanded, params.final_top_k * 2);
    let expanded_semantic: Vec<(String, f32)> = semantic
        .into_iter()
        .filter(|(id, _)| expanded.contains(id))
        .collect();

    let mut ranked = rrf_merge(graph, &expanded_keyword, &expanded_semantic, params.rrf_k);
    ranked.truncate(params.final_top_k);

    tracing::debug!(
        query,
        keyword = keyword.len(),
        seeds = seeds.len(),
        expanded = expanded.len(),
        ranked = ranked.len(),
        "retrieval complete"
    );
    Ok(ranked)
}

/// Retrieve and render a plain context string.
pub async fn build_context(
    graph: &GraphIndex,
    vectors: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    req: &RetrievalRequest<'_>,
) -> Result<String> {
    Ok(build_context_with_citations(graph, vectors, embedder, req)
        .await?
        .context)
}

/// Retrieve and render a context string with structured citations.
pub async fn build_context_with_citations(
    graph: &GraphIndex,
    vectors: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    req: &RetrievalRequest<'_>,
) -> Result<RenderedContext> {
    let ranked = retrieve(graph, vectors, embedder, req).await?;
    Ok(render_context(
        &ranked,
        req.params.max_chars,
        req.params.max_citation_text,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{Edge, Metadata, Node};
    use crate::store::memory::InMemoryVectorIndex;
    use crate::store::VectorRecord;
    use async_trait::async_trait;
    use serde_json::Value;

    fn meta(course: &str, user: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("course_id".into(), Value::String(course.into()));
        m.insert("user_id".into(), Value::String(user.into()));
        m
    }

    fn physics_graph() -> GraphIndex {
        GraphIndex::from_parts(
            vec![
                Node::new("sec:e:0", "电场", ["c1"]),
                Node::new("sec:e:1", "电势", ["c2"]),
                Node::new("sec:e:2", "磁场", ["c3"]),
                Node::new("sec:s:0", "submission", ["c4"]),
            ],
            vec![
                Chunk::new("c1", "电场强度的定义")
                    .with_source("em.md")
                    .with_section("电场")
                    .with_metadata(meta("phy", "")),
                Chunk::new("c2", "电场线与等势面正交")
                    .with_source("em.md")
                    .with_section("电势")
                    .with_metadata(meta("phy", "")),
                Chunk::new("c3", "磁感应强度与洛伦兹力")
                    .with_source("em.md")
                    .with_section("磁场")
                    .with_metadata(meta("phy", "")),
                Chunk::new("c4", "我的电场作业答案")
                    .with_source("doc:s1")
                    .with_section("Assignment")
                    .with_metadata(meta("phy", "alice")),
            ],
            vec![
                Edge::new("sec:e:0", "sec:e:1", "next"),
                Edge::new("sec:e:1", "sec:e:2", "next"),
                Edge::new("sec:e:2", "sec:s:0", "related"),
            ],
        )
    }

    /// Maps each text to a fixed 2-d vector by keyword.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-test"
        }
        fn dimension(&self) -> usize {
            2
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains('磁') { vec![0.0, 1.0] } else { vec![1.0, 0.0] })
                .collect())
        }
    }

    struct Disabled;

    #[async_trait]
    impl EmbeddingProvider for Disabled {
        fn model_name(&self) -> &str {
            "disabled"
        }
        fn dimension(&self) -> usize {
            0
        }
        fn is_enabled(&self) -> bool {
            false
        }
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::BackendUnavailable("embeddings disabled".into()))
        }
    }

    async fn vectors_for(graph: &GraphIndex) -> InMemoryVectorIndex {
        let index = InMemoryVectorIndex::new();
        let texts: Vec<String> = graph.chunks().map(|c| c.text.clone()).collect();
        let embedded = KeywordEmbedder.embed_texts(&texts).await.unwrap();
        let records = graph
            .chunks()
            .zip(embedded)
            .map(|(c, v)| VectorRecord::new(c.id.clone(), v, c.metadata.clone()))
            .collect();
        index.add(records).await.unwrap();
        index
    }

    fn ids(ranked: &[RetrievedChunk]) -> Vec<&str> {
        ranked.iter().map(|r| r.chunk.id.as_str()).collect()
    }

    #[test]
    fn test_bigrams_normalize_whitespace_and_case() {
        let b = bigrams(" A b\tC ");
        assert_eq!(b, HashSet::from(["ab".to_string(), "bc".to_string()]));
        assert_eq!(bigrams("x"), HashSet::from(["x".to_string()]));
        assert!(bigrams("   ").is_empty());
    }

    #[test]
    fn test_cjk_bigram_scenario() {
        let graph = physics_graph();
        let ranked = rank_lexical(&graph, "电场", ["c1", "c2", "c3"], 10);
        assert_eq!(ids(&ranked), vec!["c2", "c1"]);
        assert!(ranked.iter().all(|r| r.score > 0.0));
        // equal scores: the longer text ranks first
        assert_eq!(ranked[0].score, ranked[1].score);
    }

    #[test]
    fn test_rank_lexical_keeps_at_least_one() {
        let graph = physics_graph();
        let ranked = rank_lexical(&graph, "电场", ["c1", "c2"], 0);
        assert_eq!(ranked.len(), 1);
        assert!(rank_lexical(&graph, "  ", ["c1"], 5).is_empty());
    }

    #[test]
    fn test_rrf_scores_are_exact() {
        let graph = physics_graph();
        let keyword = rank_lexical(&graph, "电场", ["c1", "c2"], 10);
        let semantic = vec![
            ("c3".to_string(), 0.9f32),
            ("c1".to_string(), 0.8),
            ("ghost".to_string(), 0.7),
        ];
        let merged = rrf_merge(&graph, &keyword, &semantic, 60);
        let score = |id: &str| merged.iter().find(|r| r.chunk.id == id).unwrap().score;

        // keyword: c2 rank 0, c1 rank 1; semantic: c3 rank 0, c1 rank 1
        assert_eq!(score("c1"), 1.0 / 62.0 + 1.0 / 62.0);
        assert_eq!(score("c2"), 1.0 / 61.0);
        assert_eq!(score("c3"), 1.0 / 61.0);
        assert_eq!(ids(&merged), vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_access_filters() {
        let student = AccessContext::new(Some("phy"), Some("alice"), Some("student"));
        assert_eq!(student.filters().len(), 2);
        let teacher = AccessContext::new(Some("phy"), Some("bob"), Some("teacher"));
        assert_eq!(
            teacher.filters().into_iter().collect::<Vec<_>>(),
            vec![("course_id".to_string(), "phy".to_string())]
        );
        assert!(AccessContext::new(Some(""), None, Some("student")).filters().is_empty());
        assert!(AccessContext::anonymous().filters().is_empty());
    }

    #[test]
    fn test_render_respects_budget() {
        let graph = physics_graph();
        let ranked = rank_lexical(&graph, "电场", ["c1", "c2"], 10);
        assert!(render_context(&ranked, 0, 200).is_empty());

        let full = render_context(&ranked, 4000, 200);
        assert_eq!(
            full.context,
            "[1] em.md#电势\n电场线与等势面正交\n\n[2] em.md#电场\n电场强度的定义"
        );
        assert_eq!(full.citations.len(), 2);

        let first_block = "[1] em.md#电势\n电场线与等势面正交".chars().count();
        let one = render_context(&ranked, first_block + 2, 200);
        assert_eq!(one.citations.len(), 1);
        assert!(one.context.chars().count() <= first_block + 2);
    }

    #[test]
    fn test_citation_text_truncated() {
        let chunk = Arc::new(Chunk::new("c", "abcdefghij"));
        let ranked = vec![RetrievedChunk { chunk, score: 0.5 }];
        let rendered = render_context(&ranked, 4000, 4);
        assert_eq!(rendered.citations[0].text, "abcd...");
        assert_eq!(rendered.citations[0].source, "unknown");
        assert_eq!(rendered.context, "[1] unknown\nabcdefghij");
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let graph = physics_graph();
        let vectors = vectors_for(&graph).await;
        let access = AccessContext::anonymous();
        let req = RetrievalRequest {
            query: "  \n",
            access: &access,
            params: RetrievalParams::default(),
        };
        let rendered = build_context_with_citations(&graph, &vectors, &KeywordEmbedder, &req)
            .await
            .unwrap();
        assert!(rendered.context.is_empty());
        assert!(rendered.citations.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_seed_expands_through_neighbours() {
        let graph = physics_graph();
        let vectors = vectors_for(&graph).await;
        let access = AccessContext::new(Some("phy"), None, Some("teacher"));
        let mut req = RetrievalRequest {
            query: "磁场",
            access: &access,
            params: RetrievalParams {
                seed_top_k: 1,
                ..RetrievalParams::default()
            },
        };
        // no lexical match; the semantic hits are c3 then c1
        let ranked = retrieve(&graph, &vectors, &KeywordEmbedder, &req).await.unwrap();
        assert_eq!(ids(&ranked), vec!["c3"]);

        // two hops from c3's section reach c1's section
        req.params.expand_hops = 2;
        let ranked = retrieve(&graph, &vectors, &KeywordEmbedder, &req).await.unwrap();
        assert_eq!(ids(&ranked), vec!["c3", "c1"]);
        assert_eq!(ranked[0].score, 1.0 / 61.0);
        assert_eq!(ranked[1].score, 1.0 / 62.0);
    }

    #[tokio::test]
    async fn test_student_expansion_stays_within_acl() {
        let graph = physics_graph();
        let vectors = vectors_for(&graph).await;
        let alice = AccessContext::new(Some("phy"), Some("alice"), Some("student"));
        let req = RetrievalRequest {
            query: "电场作业",
            access: &alice,
            params: RetrievalParams {
                expand_hops: 3,
                ..RetrievalParams::default()
            },
        };
        // c4's section neighbours c3, which alice may not see
        let ranked = retrieve(&graph, &vectors, &KeywordEmbedder, &req).await.unwrap();
        assert_eq!(ids(&ranked), vec!["c4"]);

        let bob = AccessContext::new(Some("phy"), Some("bob"), Some("student"));
        let req = RetrievalRequest {
            query: "电场作业",
            access: &bob,
            params: RetrievalParams::default(),
        };
        let ranked = retrieve(&graph, &vectors, &KeywordEmbedder, &req).await.unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_auto_mode_falls_back_to_keyword() {
        let graph = physics_graph();
        let vectors = InMemoryVectorIndex::new();
        let access = AccessContext::anonymous();
        let mut req = RetrievalRequest {
            query: "电场",
            access: &access,
            params: RetrievalParams {
                expand_hops: 0,
                ..RetrievalParams::default()
            },
        };
        let context = build_context(&graph, &vectors, &Disabled, &req).await.unwrap();
        assert!(context.starts_with("[1] "));

        req.params.mode = RetrievalMode::Hybrid;
        let err = build_context(&graph, &vectors, &Disabled, &req).await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }
}
