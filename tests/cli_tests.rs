//! Integration tests for the aztf-backup CLI
//!
//! These run the compiled binary; nothing here reaches Azure.

use std::process::Command;

/// Get the path to the aztf-backup binary
fn binary() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test executable name
    path.pop(); // Remove deps directory

    path.push("aztf-backup");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    path
}

/// Run aztf-backup with a clean environment for the variables it reads
fn run(args: &[&str]) -> std::process::Output {
    let mut command = Command::new(binary());
    for var in [
        "CONFIG_PATH",
        "OUTPUT_DIR",
        "PUSH_TO_REPOS",
        "GIT_BRANCH",
        "LOG_LEVEL",
        "LOG_ANALYTICS_WORKSPACE_ID",
        "LOG_ANALYTICS_SHARED_KEY",
        "AZURE_DEVOPS_PAT",
    ] {
        command.env_remove(var);
    }

    command
        .args(args)
        .output()
        .expect("Failed to execute aztf-backup")
}

#[test]
fn test_version() {
    let output = run(&["--version"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("aztf-backup"));
}

#[test]
fn test_help_lists_subcommands() {
    let output = run(&["--help"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    for command in ["export", "find-spn", "matrix", "group-by-spn", "discover", "create-repos"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_export_help_shows_overrides() {
    let output = run(&["export", "--help"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--subscription-id"));
    assert!(stdout.contains("--no-push"));
    assert!(stdout.contains("--output-dir"));
}

#[test]
fn test_missing_config_exits_with_error() {
    let output = run(&["export", "--config", "/nonexistent/aztf-backup/subscriptions.yaml"]);

    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration file not found"));
}

#[test]
fn test_invalid_config_exits_with_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("subscriptions.yaml");
    std::fs::write(&path, "subscriptions: {not: [a list").unwrap();

    let output = run(&["export", "--config", path.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse configuration"));
}

#[test]
fn test_matrix_writes_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("subscriptions.yaml");
    std::fs::write(
        &config,
        "pipeline:\n  subscription_spn_overrides:\n    sub-b: special-spn\n",
    )
    .unwrap();
    let matrix = dir.path().join("matrix.json");

    let output = run(&[
        "matrix",
        "--config",
        config.to_str().unwrap(),
        "--subscription-ids",
        "sub-a, sub-b",
        "--default-spn",
        "default-spn",
        "--output",
        matrix.to_str().unwrap(),
    ]);

    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&matrix).unwrap()).unwrap();
    assert_eq!(json["Sub_sub_a"]["serviceConnection"], "default-spn");
    assert_eq!(json["Sub_sub_b"]["serviceConnection"], "special-spn");
}
