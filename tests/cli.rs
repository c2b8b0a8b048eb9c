// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn convpipe() -> Command {
    let mut cmd = Command::cargo_bin("convpipe").unwrap();
    cmd.env_remove("CONVPIPE_CONFIG")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn source_file(dir: &Path) -> PathBuf {
    let path = dir.join("note.txt");
    std::fs::write(&path, "hello pipeline").unwrap();
    path
}

#[test]
fn test_validate_valid_pipeline() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    let source = source_file(tmp.path());

    convpipe()
        .arg("validate")
        .arg("tee | jpg, png | collect")
        .arg(&source)
        .arg("-c")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline is valid"));
}

#[test]
fn test_validate_rejects_shared_tee_stage() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    let source = source_file(tmp.path());

    convpipe()
        .arg("validate")
        .arg("tee, jpg | png")
        .arg(&source)
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("tee").and(predicate::str::contains("only")));
}

#[test]
fn test_graph_dot() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    let source = source_file(tmp.path());

    convpipe()
        .arg("graph")
        .arg("tee | jpg, png")
        .arg(&source)
        .args(["-f", "dot"])
        .arg("-c")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph"))
        .stdout(predicate::str::contains("n0 -> n1"));
}

#[test]
fn test_run_passthrough_branches() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    let source = source_file(tmp.path());
    let out = tmp.path().join("out");

    convpipe()
        .arg("run")
        .arg("tee | _, echo")
        .arg(&source)
        .arg("-o")
        .arg(&out)
        .arg("-q")
        .arg("-c")
        .arg(&config)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(out.join("note.txt")).unwrap(),
        "hello pipeline"
    );
}

#[test]
fn test_run_missing_source() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    convpipe()
        .arg("run")
        .arg("echo")
        .arg(tmp.path().join("absent.txt"))
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.txt"));
}

#[test]
fn test_run_missing_plugin() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "plugin_prefix = \"convpipe-test-none-\"\n");
    let source = source_file(tmp.path());

    convpipe()
        .arg("run")
        .arg("jpg")
        .arg(&source)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No plugin found"));
}

#[test]
fn test_run_json_report() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    let source = source_file(tmp.path());

    let output = convpipe()
        .arg("run")
        .arg("echo")
        .arg(&source)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .arg("--json")
        .arg("-c")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["success"], true);
    assert_eq!(report["results"][0]["plugin"], "builtin");
}

#[cfg(unix)]
fn install_plugin(bin: &Path, name: &str, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(bin).unwrap();
    let plugin = bin.join(name);
    std::fs::write(&plugin, format!("#!/bin/sh\n{}\n", script)).unwrap();
    std::fs::set_permissions(&plugin, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
fn path_with(bin: &Path) -> std::ffi::OsString {
    match std::env::var_os("PATH") {
        Some(existing) => {
            let mut dirs = vec![bin.to_path_buf()];
            dirs.extend(std::env::split_paths(&existing));
            std::env::join_paths(dirs).unwrap()
        }
        None => bin.as_os_str().to_os_string(),
    }
}

#[cfg(unix)]
#[test]
fn test_run_with_plugin_on_path() {
    let tmp = TempDir::new().unwrap();
    let bin = tmp.path().join("bin");
    install_plugin(&bin, "convpipe-it-upper", r#"tr a-z A-Z < "$2" > "$4/upper.txt""#);

    let config = write_config(tmp.path(), "plugin_prefix = \"convpipe-it-\"\n");
    let source = source_file(tmp.path());
    let out = tmp.path().join("out");

    convpipe()
        .env("PATH", path_with(&bin))
        .arg("run")
        .arg("upper")
        .arg(&source)
        .arg("-o")
        .arg(&out)
        .arg("-q")
        .arg("-c")
        .arg(&config)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(out.join("upper.txt")).unwrap(),
        "HELLO PIPELINE"
    );
}

#[cfg(unix)]
#[test]
fn test_run_failure_names_stage() {
    let tmp = TempDir::new().unwrap();
    let bin = tmp.path().join("bin");
    install_plugin(&bin, "convpipe-it-broken", "echo 'bad header' >&2; exit 2");

    let config = write_config(tmp.path(), "plugin_prefix = \"convpipe-it-\"\n");
    let source = source_file(tmp.path());

    convpipe()
        .env("PATH", path_with(&bin))
        .arg("run")
        .arg("echo | broken")
        .arg(&source)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stage 2 ('broken') failed: bad header"));
}

#[cfg(unix)]
#[test]
fn test_run_same_named_outputs_are_kept() {
    let tmp = TempDir::new().unwrap();
    let bin = tmp.path().join("bin");
    install_plugin(&bin, "convpipe-it-copy", r#"cp "$2" "$4/result.txt""#);

    let config = write_config(tmp.path(), "plugin_prefix = \"convpipe-it-\"\n");
    let source = source_file(tmp.path());
    let out = tmp.path().join("out");

    convpipe()
        .env("PATH", path_with(&bin))
        .arg("run")
        .arg("tee | copy --level 1, copy --level 2")
        .arg(&source)
        .arg("-o")
        .arg(&out)
        .arg("-q")
        .arg("-c")
        .arg(&config)
        .assert()
        .success();

    assert!(out.join("result.txt").is_file());
    assert!(out.join("0002_result.txt").is_file());
}
