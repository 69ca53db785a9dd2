//! # GraphRAG Harness
//!
//! Hybrid graph-augmented retrieval for course material.
//!
//! The algorithms live in [`graphrag_core`]: the copy-on-write graph index,
//! markdown/FAQ/assignment chunking, the flat inner-product vector index and
//! the retrieval pipeline (bigram lexical ranking, vector search, reciprocal
//! rank fusion, hop expansion, ACL filtering, citation rendering). This
//! crate supplies everything around them: configuration, embedding
//! backends, on-disk persistence, the index updater and the `grag` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Markdown /  │──▶│ Chunk+Embed  │──▶│ graph.json + │
//! │  Documents   │   │  (updater)   │   │ vectors/     │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                                              ▼
//!                                       ┌──────────────┐
//!                                       │  RagService  │
//!                                       │ (grag query) │
//!                                       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! grag build --input ./docs --course phys101     # build the graph
//! grag add --id hw1 --file hw1.md --type assignment --course phys101 --user alice
//! grag query "电场强度" --course phys101 --citations
//! grag stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding backends (OpenAI, Ollama, local) |
//! | [`pool`] | Bounded pool for blocking work |
//! | [`persist`] | Atomic index file I/O |
//! | [`vector_store`] | Persistent vector index |
//! | [`builder`] | Offline graph builder |
//! | [`updater`] | Incremental add/update/remove |
//! | [`service`] | The assembled retrieval service |

pub mod builder;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod persist;
pub mod pool;
pub mod search;
pub mod service;
pub mod stats;
pub mod updater;
pub mod vector_store;
