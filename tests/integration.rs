use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn grag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("grag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("field.md"),
        "# 电场\n电场强度的定义是单位正电荷所受的力\n## 电场线\n电场线与等势面正交\n# 磁场\n磁感应强度与洛伦兹力\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("circuits.md"),
        "# 电路\n欧姆定律描述电压与电流的关系\n# 电容\n电容器储存电场能量\n",
    )
    .unwrap();
    fs::write(files_dir.join("notes.txt"), "not markdown").unwrap();

    let config_content = format!(
        r#"[index]
graph_path = "{}/data/graph.json"
vector_dir = "{}/data/vectors"

[retrieval]
seed_top_k = 4
final_top_k = 8

[embedding]
provider = "disabled"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("grag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_grag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = grag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run grag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn build(tmp: &TempDir, config_path: &Path) {
    let input = tmp.path().join("files");
    let root = tmp.path();
    let (stdout, stderr, success) = run_grag(
        config_path,
        &[
            "build",
            "--input",
            input.to_str().unwrap(),
            "--root",
            root.to_str().unwrap(),
            "--course",
            "phys101",
        ],
    );
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_build_writes_graph() {
    let (tmp, config_path) = setup_test_env();
    let input = tmp.path().join("files");

    let (stdout, stderr, success) = run_grag(
        &config_path,
        &[
            "build",
            "--input",
            input.to_str().unwrap(),
            "--root",
            tmp.path().to_str().unwrap(),
        ],
    );
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files: 2"));
    assert!(stdout.contains("chunks: 5"));
    assert!(tmp.path().join("data/graph.json").exists());

    let graph: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("data/graph.json")).unwrap())
            .unwrap();
    let nodes = graph["nodes"].as_array().unwrap();
    assert!(nodes.iter().any(|n| n["id"] == "file:files/field.md"));
    assert!(nodes.iter().any(|n| n["id"] == "sec:files/field.md:1"));
}

#[test]
fn test_build_without_markdown_fails() {
    let (tmp, config_path) = setup_test_env();
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();
    let (_, _, success) = run_grag(&config_path, &["build", "--input", empty.to_str().unwrap()]);
    assert!(!success);
}

#[test]
fn test_keyword_query_after_build() {
    let (tmp, config_path) = setup_test_env();
    build(&tmp, &config_path);

    let (stdout, stderr, success) = run_grag(&config_path, &["query", "电场强度", "--citations"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.starts_with("[1] files/field.md#电场\n电场强度的定义"),
        "unexpected context: {}",
        stdout
    );
    assert!(stdout.contains("Citations:"));
    assert!(stdout.contains("chunk: chunk:files/field.md:0"));
}

#[test]
fn test_query_json_output() {
    let (tmp, config_path) = setup_test_env();
    build(&tmp, &config_path);

    let (stdout, _, success) = run_grag(
        &config_path,
        &["query", "电容器", "--course", "phys101", "--json"],
    );
    assert!(success);
    let rendered: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let citations = rendered["citations"].as_array().unwrap();
    assert_eq!(citations[0]["chunk_id"], "chunk:files/circuits.md:1");
    assert_eq!(citations[0]["index"], 1);
}

#[test]
fn test_query_no_results() {
    let (tmp, config_path) = setup_test_env();
    build(&tmp, &config_path);

    let (stdout, _, success) = run_grag(&config_path, &["query", "量子纠缠"]);
    assert!(success);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) =
        run_grag(&config_path, &["query", "电场强度", "--course", "chem201"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_hybrid_query_without_provider_fails() {
    let (tmp, config_path) = setup_test_env();
    build(&tmp, &config_path);

    let (_, stderr, success) =
        run_grag(&config_path, &["query", "电场强度", "--mode", "hybrid"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
}

#[test]
fn test_add_query_remove_assignment() {
    let (tmp, config_path) = setup_test_env();
    build(&tmp, &config_path);

    let (stdout, stderr, success) = run_grag(
        &config_path,
        &[
            "add",
            "--id",
            "hw1",
            "--content",
            "电场作业：求点电荷的电场强度",
            "--type",
            "assignment",
            "--course",
            "phys101",
            "--user",
            "alice",
        ],
    );
    assert!(success, "add failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chunks affected: 1"));

    let student = [
        "query", "电场强度", "--course", "phys101", "--user", "alice", "--role", "student",
        "--citations",
    ];
    let (stdout, _, success) = run_grag(&config_path, &student);
    assert!(success);
    assert!(stdout.starts_with("[1] doc:hw1#Assignment"));
    assert!(!stdout.contains("files/field.md"));

    let (stdout, _, success) = run_grag(&config_path, &["remove", "--id", "hw1"]);
    assert!(success);
    assert!(stdout.contains("chunks affected: 1"));

    let (stdout, _, success) = run_grag(&config_path, &student);
    assert!(success);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) = run_grag(&config_path, &["remove", "--id", "hw1"]);
    assert!(success);
    assert!(stdout.contains("not indexed"));
}

#[test]
fn test_stats() {
    let (tmp, config_path) = setup_test_env();
    build(&tmp, &config_path);

    let (stdout, stderr, success) = run_grag(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Chunks:      5"));
    assert!(stdout.contains("keyword only"));

    let (stdout, _, success) = run_grag(&config_path, &["stats", "--json"]);
    assert!(success);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["nodes"], 7);
    assert_eq!(stats["vectors"], 0);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_grag(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
