use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn serendipity(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("serendipity").expect("binary");
    cmd.current_dir(workdir).arg("--quiet");
    cmd
}

fn write_account(dir: &Path, account: &str, offset: f32) {
    let items: Vec<Value> = (0..3)
        .flat_map(|topic| {
            (0..2).map(move |k| {
                let mut embedding = vec![0.0_f32; 3];
                embedding[topic] = 1.0;
                embedding[(topic + 1) % 3] = 0.01 * (k as f32 + offset);
                json!({
                    "id": format!("{account}-{topic}-{k}"),
                    "title": format!("Topic {topic}"),
                    "summary": "notes",
                    "embedding": embedding,
                    "category": "humanistic",
                })
            })
        })
        .collect();
    fs::write(
        dir.join(format!("{account}.json")),
        serde_json::to_string(&items).unwrap(),
    )
    .unwrap();
}

fn setup() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    let data = temp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    write_account(&data, "alice", 0.0);
    write_account(&data, "bob", 2.0);
    fs::write(data.join("dave.json"), "[]").unwrap();
    temp
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("valid json")
}

#[test]
fn offline_run_reports_every_account() {
    let temp = setup();
    let output = serendipity(temp.path())
        .args(["run", "--data-dir", "data", "--all", "--json", "--max-items-per-cluster", "4"])
        .output()
        .expect("command run");
    assert!(output.status.success(), "{output:?}");

    let body = stdout_json(&output);
    let reports = body["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0]["account"], "alice");
    assert_eq!(reports[0]["peers_considered"], 1);
    assert_eq!(reports[0]["paths_emitted"], 0);
    assert_eq!(reports[2]["account"], "dave");
    assert_eq!(reports[2]["skipped"], true);
    assert!(body["failures"].as_array().unwrap().is_empty());

    let groups = reports[0]["match_groups"].as_array().unwrap();
    assert_eq!(groups[0]["peer_account"], "bob");
    assert!(groups[0]["oracle_calls"].as_u64().unwrap() > 0);
    // Nothing accepted offline, so no paths file is written.
    assert!(!temp.path().join("paths.jsonl").exists());
}

#[test]
fn peers_command_ranks_other_accounts() {
    let temp = setup();
    let output = serendipity(temp.path())
        .args(["peers", "--data-dir", "data", "--account", "alice", "--json"])
        .output()
        .expect("command run");
    assert!(output.status.success(), "{output:?}");

    let rows = stdout_json(&output);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["account"], "bob");
    assert_eq!(rows[0]["items"], 6);
}

#[test]
fn clusters_command_respects_ceiling() {
    let temp = setup();
    let output = serendipity(temp.path())
        .args([
            "clusters",
            "--data-dir",
            "data",
            "--account",
            "alice",
            "--peer",
            "bob",
            "--max-items-per-cluster",
            "4",
            "--json",
        ])
        .output()
        .expect("command run");
    assert!(output.status.success(), "{output:?}");

    let rows = stdout_json(&output);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        let size = row["current_items"].as_u64().unwrap() + row["peer_items"].as_u64().unwrap();
        assert!(size <= 4, "{row}");
        assert_eq!(row["category"], "humanistic");
    }
}

#[test]
fn config_file_is_validated() {
    let temp = setup();
    fs::write(temp.path().join("bad.toml"), "sample_size = 0\n").unwrap();
    serendipity(temp.path())
        .args(["run", "--data-dir", "data", "--account", "alice", "--config", "bad.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sample_size"));
}

#[test]
fn run_requires_an_account_selection() {
    let temp = setup();
    serendipity(temp.path())
        .args(["run", "--data-dir", "data"])
        .assert()
        .failure();
}

#[test]
fn missing_data_dir_fails() {
    let temp = tempdir().unwrap();
    serendipity(temp.path())
        .args(["peers", "--data-dir", "nope", "--account", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
