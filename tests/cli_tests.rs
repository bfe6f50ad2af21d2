mod common;
use common::*;

use std::io::Write;
use tempfile::NamedTempFile;

fn settings(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write settings");
    file
}

#[test]
fn test_help_lists_flags() {
    let (stdout, _stderr, exit_code) = run_shipper(&["--help"]);
    assert_eq!(exit_code, 0);
    for flag in ["--config", "--maxdop", "--root", "--dry-run", "--no-prune"] {
        assert!(stdout.contains(flag), "help should mention {}", flag);
    }
}

#[test]
fn test_unknown_flag_is_usage_error() {
    let (_stdout, _stderr, exit_code) = run_shipper(&["--bogus"]);
    assert_eq!(exit_code, 2);
}

#[test]
fn test_missing_config_file_is_usage_error() {
    let (_stdout, stderr, exit_code) =
        run_shipper(&["--config", "/nonexistent/techlog/settings.yaml"]);
    assert_eq!(exit_code, 2);
    assert!(stderr.contains("/nonexistent/techlog/settings.yaml"));
}

#[test]
fn test_invalid_settings_value_is_usage_error() {
    let file = settings("patch: /tmp\nsorting: 9\n");
    let (_stdout, _stderr, exit_code) =
        run_shipper(&["--config", file.path().to_str().unwrap()]);
    assert_eq!(exit_code, 2);
}

#[test]
fn test_unreachable_checkpoint_store_fails_run() {
    let tree = TechlogTree::new();
    let logs = tree.root().join("own-logs");
    let file = settings(&format!(
        "patch: {}\nredis_addr: \"127.0.0.1:1\"\npatch_logfile: {}\n",
        tree.root().display(),
        logs.display()
    ));

    let (_stdout, stderr, exit_code) = run_shipper(&["--config", file.path().to_str().unwrap()]);
    assert_eq!(exit_code, 1);
    assert!(stderr.contains("setup failed"), "stderr: {}", stderr);
}
