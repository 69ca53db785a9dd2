//! Index statistics.
//!
//! Used by `grag stats` to confirm what the graph and vector indexes hold
//! after a build or a series of ingestions.

use anyhow::Result;

use crate::config::Config;
use crate::service::RagService;

/// Run the stats command: open both indexes and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let service = RagService::open(config.clone()).await?;
    let stats = service.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let graph_size = std::fs::metadata(&config.index.graph_path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("GraphRAG Harness — Index Stats");
    println!("==============================");
    println!();
    println!("  Graph:       {}", config.index.graph_path.display());
    println!("  Size:        {}", format_bytes(graph_size));
    println!("  Vectors:     {}", config.index.vector_dir.display());
    println!();
    println!("  Nodes:       {}", stats.nodes);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Edges:       {}", stats.edges);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.vectors,
        stats.chunks,
        if stats.chunks > 0 {
            (stats.vectors.min(stats.chunks) * 100) / stats.chunks
        } else {
            0
        }
    );
    match stats.dimension {
        Some(dim) => println!("  Dimension:   {}", dim),
        None => println!("  Dimension:   (none)"),
    }
    println!(
        "  Embedding:   {}{}",
        stats.embedding_model,
        if stats.embeddings_enabled { "" } else { " (keyword only)" }
    );
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
