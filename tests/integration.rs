//! CLI tests: run the `devmirror` binary against a temporary database.

mod common;

use chrono::Utc;
use common::{date, profile, test_config};
use devmirror::convert::{profile_to_account, record_to_repository};
use devmirror::models::AccountKind;
use devmirror::{migrate, store};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // The API URL points at a closed port so nothing reaches the network.
    let config_content = format!(
        r#"[db]
path = "{}/data/devmirror.sqlite"

[github]
api_url = "http://127.0.0.1:1"
timeout_secs = 5

[discovery]
locations = ["St. Louis"]
earliest = "2015-01-01"
query_delay_ms = 0

[sync]
max_quota_retries = 0
"#,
        root.display()
    );

    let config_path = config_dir.join("devmirror.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cli(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_devmirror");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run devmirror binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Write alice and one repository straight into the database.
fn seed(tmp: &TempDir) {
    let mut cfg = test_config(tmp, 1000);
    cfg.db.path = tmp.path().join("data").join("devmirror.sqlite");

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        migrate::run_migrations(&cfg).await.unwrap();
        let pool = devmirror::db::connect(&cfg).await.unwrap();
        let now = Utc::now();

        let account = profile_to_account(
            profile("alice", AccountKind::Individual, date(2015, 3, 1)),
            now,
        )
        .unwrap();
        store::upsert_account(&pool, &account).await.unwrap();

        let repo = record_to_repository(
            common::repo("alice", "ferris-tools", Some("Rust"), 30),
            "alice",
            now,
        )
        .unwrap();
        store::upsert_repository(&pool, &repo).await.unwrap();
        pool.close().await;
    });
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cli(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/devmirror.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_cli(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_cli(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_last_run_before_any_pass() {
    let (_tmp, config_path) = setup_test_env();

    run_cli(&config_path, &["init"]);
    let (stdout, _, success) = run_cli(&config_path, &["last-run"]);
    assert!(success);
    assert!(stdout.contains("never"));
}

#[test]
fn test_sync_fails_when_provider_unreachable() {
    let (_tmp, config_path) = setup_test_env();

    run_cli(&config_path, &["init"]);
    let (_, stderr, success) = run_cli(&config_path, &["sync"]);
    assert!(!success);
    assert!(stderr.contains("discovery failed"), "stderr={}", stderr);
}

#[test]
fn test_views_over_seeded_mirror() {
    let (tmp, config_path) = setup_test_env();
    seed(&tmp);

    let (stdout, _, success) = run_cli(&config_path, &["languages"]);
    assert!(success);
    assert!(stdout.contains("Rust"));

    let (stdout, _, success) = run_cli(&config_path, &["profile", "alice"]);
    assert!(success);
    assert!(stdout.contains("ferris-tools"));

    let (stdout, _, success) = run_cli(&config_path, &["search", "ferris", "--repos"]);
    assert!(success);
    assert!(stdout.contains("alice/ferris-tools"));

    let (stdout, _, success) = run_cli(&config_path, &["devs", "--kind", "user"]);
    assert!(success);
    assert!(stdout.contains("alice"));
}

#[test]
fn test_hide_and_remove() {
    let (tmp, config_path) = setup_test_env();
    seed(&tmp);

    let (stdout, _, success) = run_cli(&config_path, &["hide", "alice"]);
    assert!(success);
    assert!(stdout.contains("hidden"));

    let (_, _, success) = run_cli(&config_path, &["profile", "alice"]);
    assert!(!success, "hidden profile must not be shown");

    let (_, _, success) = run_cli(&config_path, &["hide", "alice", "--unhide"]);
    assert!(success);

    let (stdout, _, success) = run_cli(&config_path, &["admin", "alice"]);
    assert!(success);
    assert!(stdout.contains("admin=true"));

    let (_, _, success) = run_cli(&config_path, &["remove", "alice"]);
    assert!(success);
    let (_, stderr, success) = run_cli(&config_path, &["remove", "alice"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}
