//! # graphrag-core
//!
//! Shared, runtime-free logic for graphrag-harness: data models, the
//! copy-on-write graph index, document chunking, the embedding and vector
//! index traits, the flat inner-product similarity structure, and the hybrid
//! retrieval pipeline (bigram lexical ranking, reciprocal rank fusion, graph
//! hop expansion, ACL filtering and context rendering).
//!
//! This crate contains no tokio, no HTTP client and no filesystem I/O. The
//! `graphrag-harness` app crate supplies concrete embedding backends, the
//! persistent vector store, the index updater and the CLI.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod models;
pub mod search;
pub mod store;

pub use error::{Error, Result};
