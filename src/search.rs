//! The `grag query` command.
//!
//! Runs one retrieval through [`RagService`] and prints either the rendered
//! context, the context followed by its citations, or the citations as JSON.

use anyhow::Result;
use graphrag_core::search::{AccessContext, RetrievalMode};

use crate::config::Config;
use crate::service::RagService;

/// Output switches for `grag query`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOutput {
    pub citations: bool,
    pub json: bool,
}

pub async fn run_query(
    config: &Config,
    query: &str,
    access: &AccessContext,
    mode: Option<RetrievalMode>,
    output: QueryOutput,
) -> Result<()> {
    let service = RagService::open(config.clone()).await?;

    let mut params = config.retrieval.clone();
    if let Some(mode) = mode {
        params.mode = mode;
    }
    let rendered = service.retrieve_with(query, access, params).await?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(());
    }

    if rendered.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("{}", rendered.context);
    if output.citations {
        println!();
        println!("Citations:");
        for c in &rendered.citations {
            let section = c
                .section
                .as_deref()
                .map(|s| format!("#{}", s))
                .unwrap_or_default();
            println!("  [{}] [{:.4}] {}{}", c.index, c.score, c.source, section);
            println!("      chunk: {}", c.chunk_id);
            println!("      excerpt: \"{}\"", c.text.replace('\n', " ").trim());
        }
    }

    Ok(())
}
