// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HASH_CONFIG: &str = "[embeddings]\nprovider = \"hash\"\ndimension = 384\n";

const CORPUS: &str = r#"[
  {"query": "deploy a 5ms slice", "output": "A"},
  {"query": "deploy a 5ms slice for robots", "output": "B"},
  {"query": "stream 4k video", "output": "C"}
]"#;

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

fn exemplar_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("exemplar"));
    cmd.current_dir(dir).env("NO_COLOR", "1");
    cmd
}

fn indexed_workspace() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join(".exemplarrc.toml"), HASH_CONFIG);
    write_file(&dir.path().join("corpus.json"), CORPUS);

    exemplar_cmd(dir.path())
        .args(["index", "--corpus", "corpus.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 3 exemplars"));
    dir
}

fn stdout_json(assert: &assert_cmd::assert::Assert) -> Value {
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    serde_json::from_str(&stdout).expect("json output")
}

#[test]
fn index_then_retrieve_nearest() {
    let dir = indexed_workspace();
    assert!(dir.path().join(".exemplar/index.sqlite").exists());

    let assert = exemplar_cmd(dir.path())
        .args([
            "--format",
            "json",
            "retrieve",
            "deploy an ultra low latency slice",
            "-k",
            "2",
        ])
        .assert()
        .success();
    let json = stdout_json(&assert);

    assert_eq!(json["strategy"], "nearest");
    let exemplars = json["exemplars"].as_array().expect("exemplars array");
    assert_eq!(exemplars.len(), 2);
    let mut outputs: Vec<&str> = exemplars
        .iter()
        .filter_map(|e| e["output"].as_str())
        .collect();
    outputs.sort();
    assert_eq!(outputs, vec!["A", "B"]);
    assert!(exemplars[0].get("embedding").is_none());
}

#[test]
fn retrieve_with_diversity_and_hybrid() {
    let dir = indexed_workspace();

    for strategy in ["diversity", "hybrid"] {
        let assert = exemplar_cmd(dir.path())
            .args([
                "--format", "json", "retrieve", "deploy slice", "-s", strategy, "-k", "3",
            ])
            .assert()
            .success();
        let json = stdout_json(&assert);
        assert_eq!(json["strategy"], strategy);
        assert_eq!(json["exemplars"].as_array().map(Vec::len), Some(3));
    }
}

#[test]
fn retrieve_prompt_block() {
    let dir = indexed_workspace();

    exemplar_cmd(dir.path())
        .args(["retrieve", "deploy a slice", "--prompt", "--max-examples", "1"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Example 1:\nQuery: deploy a 5ms slice"))
        .stdout(predicate::str::contains("Example 2:").not());
}

#[test]
fn retrieve_without_index_fails() {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join(".exemplarrc.toml"), HASH_CONFIG);

    exemplar_cmd(dir.path())
        .args(["retrieve", "deploy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No index found"));
}

#[test]
fn retrieve_rejects_invalid_requests() {
    let dir = indexed_workspace();

    exemplar_cmd(dir.path())
        .args(["retrieve", "deploy", "-k", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("k must be at least 1"));

    exemplar_cmd(dir.path())
        .args(["retrieve", "deploy", "-s", "mmr", "-k", "3", "--fetch-k", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fetch_k"));
}

#[test]
fn model_change_reports_stale_index() {
    let dir = indexed_workspace();
    write_file(
        &dir.path().join(".exemplarrc.toml"),
        "[embeddings]\nprovider = \"hash\"\ndimension = 64\n",
    );

    exemplar_cmd(dir.path())
        .args(["retrieve", "deploy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rebuild the index"));
}

#[test]
fn corpus_change_reports_stale_index() {
    let dir = indexed_workspace();
    write_file(
        &dir.path().join("edited.json"),
        r#"[{"query": "deploy a 5ms slice", "output": "A2"}]"#,
    );

    exemplar_cmd(dir.path())
        .args(["retrieve", "deploy", "--corpus", "edited.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rebuild the index"));

    exemplar_cmd(dir.path())
        .args(["info", "--corpus", "edited.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rebuild the index"));

    exemplar_cmd(dir.path())
        .args(["retrieve", "deploy", "--corpus", "corpus.json"])
        .assert()
        .success();
}

#[test]
fn info_reports_index_version() {
    let dir = indexed_workspace();

    let assert = exemplar_cmd(dir.path())
        .args(["--format", "json", "info"])
        .assert()
        .success();
    let json = stdout_json(&assert);
    assert_eq!(json["version"]["model_id"], "hash-384");
    assert_eq!(json["version"]["entry_count"], 3);
    assert_eq!(json["version"]["metric"], "cosine");
    assert_eq!(json["stored_entries"], 3);
}

#[test]
fn jsonl_corpus_with_intent_field_names() {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join(".exemplarrc.toml"), HASH_CONFIG);
    write_file(
        &dir.path().join("intents.jsonl"),
        "{\"user_intent\": \"deploy a 5ms slice\", \"tmf921_intent\": {\"latency\": 5}}\n\
         {\"user_intent\": \"stream 4k video\", \"tmf921_intent\": {\"bandwidth\": 100}}\n",
    );

    let assert = exemplar_cmd(dir.path())
        .args([
            "--format",
            "json",
            "index",
            "--corpus",
            "intents.jsonl",
            "--test-query",
            "low latency slice",
        ])
        .assert()
        .success();
    let json = stdout_json(&assert);
    assert_eq!(json["version"]["entry_count"], 2);
    assert_eq!(json["test_results"].as_array().map(Vec::len), Some(2));
}

#[test]
fn explicit_config_must_parse() {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join("broken.toml"), "[embeddings\nprovider = ");

    exemplar_cmd(dir.path())
        .args(["--config", "broken.toml", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn completions_generate_script() {
    let dir = TempDir::new().expect("tempdir");
    exemplar_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exemplar"));
}
