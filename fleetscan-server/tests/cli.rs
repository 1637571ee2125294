use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fleetscan() -> Command {
    let mut cmd = Command::cargo_bin("fleetscan").unwrap();
    cmd.env_remove("FLEETSCAN_BACKEND_ADDRESS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    fleetscan()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("asset-create"));
}

#[test]
fn asset_create_requires_file_and_backend() {
    fleetscan()
        .arg("asset-create")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}

#[test]
fn asset_create_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    fleetscan()
        .args([
            "asset-create",
            "--backend-address",
            "http://127.0.0.1:9/api",
            "--file",
        ])
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read asset file"));
}

#[test]
fn asset_create_rejects_non_http_backend() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("asset.json");
    fs::write(&file, r#"{"objectType": "VMInfo", "instanceID": "i-1"}"#).unwrap();

    fleetscan()
        .args(["asset-create", "--backend-address", "ftp://state/api", "--file"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to create state API client"));
}

#[test]
fn run_fails_fast_on_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("fleetscan.toml");
    fs::write(
        &config,
        "[orchestrator.scan_config_watcher]\nworkers = 0\n",
    )
    .unwrap();

    fleetscan()
        .current_dir(dir.path())
        .args(["run", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}
