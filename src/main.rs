//! # GraphRAG Harness CLI (`grag`)
//!
//! Builds, maintains and queries a graph + vector index over course
//! material.
//!
//! ## Usage
//!
//! ```bash
//! grag --config ./config/grag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `grag build` | Build the graph index from markdown files |
//! | `grag add` | Index one document |
//! | `grag update` | Replace an indexed document |
//! | `grag remove` | Remove a document from both indexes |
//! | `grag query "<text>"` | Retrieve context for a question |
//! | `grag stats` | Print index sizes |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use graphrag_core::search::{AccessContext, RetrievalMode};
use graphrag_harness::config;
use graphrag_harness::ingest::{self, BuildOptions, DocumentInput};
use graphrag_harness::search::{self, QueryOutput};
use graphrag_harness::stats;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// GraphRAG Harness CLI: hybrid graph-augmented retrieval over course
/// material.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file is an error; every section inside it is optional.
#[derive(Parser)]
#[command(
    name = "grag",
    about = "GraphRAG Harness — hybrid graph-augmented retrieval over course material",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/grag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph index from markdown files.
    ///
    /// Every `*.md` file under `--input` becomes a file node with one
    /// section node and chunk per heading section. With `--embed`, every
    /// chunk is also embedded into a fresh vector index.
    Build {
        /// Markdown file or directory (recursive).
        #[arg(long)]
        input: PathBuf,

        /// Root directory for rendering source paths.
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Output graph path. Defaults to `index.graph_path`.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Course id written into every chunk's metadata.
        #[arg(long)]
        course: Option<String>,

        /// Embed all chunks with the configured provider.
        #[arg(long)]
        embed: bool,
    },

    /// Index one document, replacing any earlier version with the same id.
    Add {
        #[command(flatten)]
        doc: DocArgs,
    },

    /// Replace an indexed document.
    Update {
        #[command(flatten)]
        doc: DocArgs,
    },

    /// Remove a document from both indexes.
    Remove {
        /// Document id.
        #[arg(long)]
        id: String,
    },

    /// Retrieve context for a question.
    Query {
        /// The question.
        query: String,

        /// Restrict to chunks of this course.
        #[arg(long)]
        course: Option<String>,

        /// Caller's user id (restricts students to their own chunks).
        #[arg(long)]
        user: Option<String>,

        /// Caller's role: `teacher`, `student`, `admin`.
        #[arg(long)]
        role: Option<String>,

        /// Retrieval mode: `auto`, `hybrid` or `keyword`.
        #[arg(long)]
        mode: Option<RetrievalMode>,

        /// Print citations after the context.
        #[arg(long)]
        citations: bool,

        /// Print context and citations as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print index statistics.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Document fields shared by `add` and `update`.
#[derive(clap::Args)]
struct DocArgs {
    /// Document id; chunks are tagged `doc:<id>`.
    #[arg(long)]
    id: String,

    /// Read content from this file.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Inline content.
    #[arg(long)]
    content: Option<String>,

    /// Chunking strategy: `markdown`, `assignment`, `faq`, or anything else
    /// for a single chunk.
    #[arg(long = "type", default_value = "markdown")]
    doc_type: String,

    /// Human-readable source label. Defaults to the file path or the id.
    #[arg(long)]
    source: Option<String>,

    #[arg(long)]
    course: Option<String>,

    #[arg(long)]
    user: Option<String>,
}

impl From<DocArgs> for DocumentInput {
    fn from(args: DocArgs) -> Self {
        DocumentInput {
            id: args.id,
            file: args.file,
            content: args.content,
            doc_type: args.doc_type,
            source: args.source,
            course_id: args.course,
            user_id: args.user,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build {
            input,
            root,
            output,
            course,
            embed,
        } => {
            let opts = BuildOptions {
                input,
                root,
                output,
                course_id: course,
                embed,
            };
            ingest::run_build(&cfg, &opts).await?;
        }
        Commands::Add { doc } => {
            ingest::run_add(&cfg, doc.into(), false).await?;
        }
        Commands::Update { doc } => {
            ingest::run_add(&cfg, doc.into(), true).await?;
        }
        Commands::Remove { id } => {
            ingest::run_remove(&cfg, &id).await?;
        }
        Commands::Query {
            query,
            course,
            user,
            role,
            mode,
            citations,
            json,
        } => {
            let access = AccessContext::new(course.as_deref(), user.as_deref(), role.as_deref());
            search::run_query(&cfg, &query, &access, mode, QueryOutput { citations, json })
                .await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
    }

    Ok(())
}
