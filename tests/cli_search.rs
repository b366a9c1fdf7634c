// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn write_file(path: &std::path::Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

fn workspace() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        &dir.path().join(".semsearch.toml"),
        r#"
[data]
folder = "docs"

[embeddings]
provider = "hashing"
dimension = 128
workers = 1
"#,
    );
    write_file(
        &dir.path().join("docs/ml.txt"),
        "Machine <b>learning</b> basics",
    );
    write_file(&dir.path().join("docs/pasta.txt"), "Cooking pasta recipe");
    write_file(&dir.path().join("docs/readme.md"), "machine learning notes");
    dir
}

fn semsearch(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("semsearch"));
    cmd.current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env_remove("SEMSEARCH_LOG")
        .env_remove("DATA_FOLDER")
        .env_remove("CACHE_DB")
        .env_remove("EMBEDDING_MODEL")
        .env_remove("INDEX_PATH")
        .env_remove("EMBEDDING_WORKERS");
    cmd
}

fn json_stdout(assert: assert_cmd::assert::Assert) -> Value {
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    serde_json::from_str(&stdout).expect("json output")
}

#[test]
fn index_reports_cache_hits_on_second_run() {
    let dir = workspace();

    let first = json_stdout(
        semsearch(&dir)
            .args(["--format", "json", "index"])
            .assert()
            .success(),
    );
    assert_eq!(first["total"], 2);
    assert_eq!(first["embedded"], 2);
    assert_eq!(first["cache_hits"], 0);
    assert_eq!(first["dimension"], 128);

    let second = json_stdout(
        semsearch(&dir)
            .args(["--format", "json", "index"])
            .assert()
            .success(),
    );
    assert_eq!(second["embedded"], 0);
    assert_eq!(second["cache_hits"], 2);

    assert!(dir.path().join(".semsearch/embeddings.sqlite").exists());
    assert!(dir.path().join(".semsearch/vectors.ssvi").exists());
}

#[test]
fn search_json_contains_explanation() {
    let dir = workspace();

    let response = json_stdout(
        semsearch(&dir)
            .args(["--format", "json", "search", "machine learning", "-k", "1"])
            .assert()
            .success(),
    );
    assert_eq!(response["query"], "machine learning");
    let results = response["results"].as_array().expect("results array");
    assert_eq!(results.len(), 1);

    let top = &results[0];
    assert_eq!(top["doc_id"], "ml");
    assert_eq!(top["preview"], "machine learning basics");
    assert_eq!(top["explanation"]["overlap_count"], 2);
    assert_eq!(
        top["explanation"]["overlap_keywords"],
        serde_json::json!(["machine", "learning"])
    );
    assert_eq!(top["metadata"]["length"], 23);
    assert!(top["metadata"]["source_path"]
        .as_str()
        .expect("source path")
        .ends_with("ml.txt"));
}

#[test]
fn search_text_output() {
    let dir = workspace();
    semsearch(&dir)
        .args(["search", "pasta"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 2 results for: pasta"))
        .stdout(predicate::str::contains("1. pasta"))
        .stdout(predicate::str::contains("matched: pasta"));
}

#[test]
fn zero_top_k_is_invalid_input() {
    let dir = workspace();
    semsearch(&dir)
        .args(["search", "pasta", "-k", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("top_k must be at least 1"));
}

#[test]
fn missing_folder_fails() {
    let dir = workspace();
    semsearch(&dir)
        .args(["index", "--path", "nowhere"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Document folder not found"));
}

#[test]
fn environment_overrides_config() {
    let dir = workspace();
    write_file(&dir.path().join("other/solo.txt"), "just one document");

    let report = json_stdout(
        semsearch(&dir)
            .env("DATA_FOLDER", "other")
            .env("CACHE_DB", "alt/cache.sqlite")
            .args(["--format", "json", "index"])
            .assert()
            .success(),
    );
    assert_eq!(report["total"], 1);
    assert!(dir.path().join("alt/cache.sqlite").exists());
}

#[test]
fn cache_stats_after_index() {
    let dir = workspace();
    semsearch(&dir).args(["index"]).assert().success();

    let stats = json_stdout(
        semsearch(&dir)
            .args(["--format", "json", "cache-stats"])
            .assert()
            .success(),
    );
    assert_eq!(stats["cached_embeddings"], 2);
    assert_eq!(stats["indexed_vectors"], 2);
    assert_eq!(stats["index_dimension"], 128);
}

#[test]
fn completions_are_generated() {
    Command::new(assert_cmd::cargo::cargo_bin!("semsearch"))
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("semsearch"));
}
