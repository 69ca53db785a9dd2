//! Index file I/O.
//!
//! Files are replaced atomically: bytes go to a sibling `*.tmp` file that is
//! then renamed over the target, so a crash mid-write leaves the previous
//! version intact. All functions here block; async callers run them on the
//! [`WorkerPool`](crate::pool::WorkerPool).

use graphrag_core::graph::GraphIndex;
use graphrag_core::Result;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("index"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to `path` via a temporary sibling and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Load a graph file. A missing file yields an empty graph.
pub fn read_graph(path: &Path) -> Result<GraphIndex> {
    match fs::read(path) {
        Ok(bytes) => GraphIndex::load(&bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no graph index on disk; starting empty");
            Ok(GraphIndex::new())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn write_graph(path: &Path, graph: &GraphIndex) -> Result<()> {
    let bytes = graph.to_json()?;
    write_atomic(path, &bytes)?;
    tracing::debug!(
        path = %path.display(),
        generation = graph.generation(),
        "wrote graph index"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphrag_core::models::{Chunk, Node};
    use tempfile::TempDir;

    #[test]
    fn test_missing_graph_is_empty() {
        let tmp = TempDir::new().unwrap();
        let graph = read_graph(&tmp.path().join("absent.json")).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_graph_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("graph.json");
        let graph = GraphIndex::from_parts(
            vec![Node::new("n", "Node", ["c"])],
            vec![Chunk::new("c", "text").with_source("s.md")],
            vec![],
        );
        write_graph(&path, &graph).unwrap();
        assert!(!temp_path(&path).exists());

        let restored = read_graph(&path).unwrap();
        assert_eq!(restored.chunk("c").unwrap().text, "text");
        let owners: Vec<&str> = restored.nodes_for_chunk("c").collect();
        assert_eq!(owners, vec!["n"]);
    }

    #[test]
    fn test_corrupt_graph_is_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("graph.json");
        fs::write(&path, "[]").unwrap();
        assert!(matches!(
            read_graph(&path),
            Err(graphrag_core::Error::Format(_))
        ));
    }
}
