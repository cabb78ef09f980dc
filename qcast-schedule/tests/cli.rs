use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[queue]
path = "{0}/queue.json"
staged_dir = "{0}/staged"
lock_file = "{0}/scheduler.lock"
"#,
            dir.path().display()
        ),
    )
    .unwrap();
    path
}

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("qcast-schedule").unwrap();
    cmd.env_remove("QCAST_CONFIG");
    cmd
}

#[test]
fn rejects_unparseable_schedule() {
    cmd()
        .args(["--platforms", "facebook", "--caption", "hi"])
        .args(["--schedule", "whenever you feel like it"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn rejects_past_schedule() {
    cmd()
        .args(["--platforms", "facebook", "--caption", "hi"])
        .args(["--schedule", "2020-01-01 12:00"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("not in the future"));
}

#[test]
fn rejects_empty_post() {
    cmd()
        .args(["--platforms", "facebook", "--schedule", "2h"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("caption, media, or both"));
}

#[test]
fn rejects_empty_platform_list() {
    cmd()
        .args(["--platforms", " , ", "--caption", "hi", "--schedule", "2h"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn rejects_missing_media_file() {
    cmd()
        .args(["--platforms", "facebook", "--schedule", "2h"])
        .args(["--media", "/nonexistent/photo.jpg"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn schedules_a_text_post() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = cmd()
        .args(["--platforms", "facebook,instagram"])
        .args(["--caption", "Launch day!"])
        .args(["--schedule", "2h"])
        .args(["--config", config.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summary["status"], "pending");
    assert!(summary["id"].as_str().unwrap().starts_with("post_"));
    assert_eq!(summary["platforms"].as_array().unwrap().len(), 2);

    assert!(dir.path().join("queue.json").exists());
}

#[test]
fn schedules_a_post_with_staged_media() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let photo = dir.path().join("photo.jpg");
    std::fs::write(&photo, b"bytes").unwrap();

    let output = cmd()
        .args(["--platforms", "facebook"])
        .args(["--caption", "One photo"])
        .args(["--schedule", "2h"])
        .args(["--media", photo.to_str().unwrap()])
        .args(["--config", config.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let id = summary["id"].as_str().unwrap();
    assert_eq!(summary["media"], 1);
    assert!(dir.path().join("staged").join(id).join("photo.jpg").exists());
}
