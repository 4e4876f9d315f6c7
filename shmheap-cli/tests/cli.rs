//! End-to-end tests running the `shmheap` binary as separate processes.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;
use uuid::Uuid;

fn shmheap(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shmheap"))
        .arg("--dir")
        .arg(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run shmheap")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn region_name() -> String {
    format!("cli_{}", Uuid::new_v4().simple())
}

#[test]
fn create_set_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let name = region_name();

    stdout(&shmheap(dir.path(), &["create", &name, "--static-size", "80", "--heap-size", "1024"]));
    assert_eq!(stdout(&shmheap(dir.path(), &["layout", &name])), "4088E");

    stdout(&shmheap(dir.path(), &["set", &name, "", r#"{"users": [{"name": "ada", "id": 1}], "ratio": 0.5}"#]));
    let json = stdout(&shmheap(dir.path(), &["get", &name, "users.0", "--json"]));
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value, serde_json::json!({"id": 1, "name": "ada"}));

    assert_eq!(
        stdout(&shmheap(dir.path(), &["get", &name, "users.0.name"])),
        "(P:char:3)\"ada\""
    );

    stdout(&shmheap(dir.path(), &["set", &name, "counts", "[1, 2, 3]"]));
    assert_eq!(
        stdout(&shmheap(dir.path(), &["get", &name, "counts", "-m", "2"])),
        "(P:long:3)[1, 2, ...]"
    );

    stdout(&shmheap(dir.path(), &["delete", &name, "users"]));
    let output = shmheap(dir.path(), &["get", &name, "users.0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("E201"));
}

#[test]
fn info_reports_capacities() {
    let dir = TempDir::new().unwrap();
    let name = region_name();
    stdout(&shmheap(dir.path(), &["create", &name, "--heap-size", "8192"]));

    let json = stdout(&shmheap(dir.path(), &["info", &name, "--json"]));
    let info: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(info["heap_capacity"], 8192);
    assert_eq!(info["static_capacity"], 64);
    assert_eq!(info["root"], "null");
    assert_eq!(info["stats"]["free_blocks"], 1);
}

#[test]
fn export_then_import_into_another_heap() {
    let dir = TempDir::new().unwrap();
    let source = region_name();
    let target = region_name();
    let file = dir.path().join("value.bin");
    let file_arg = file.to_str().unwrap();

    stdout(&shmheap(dir.path(), &["create", &source]));
    stdout(&shmheap(dir.path(), &["create", &target]));
    stdout(&shmheap(dir.path(), &["set", &source, "", r#"{"a": [1.5, 2.5], "b": "text"}"#]));

    stdout(&shmheap(dir.path(), &["export", &source, "", "-o", file_arg]));
    stdout(&shmheap(dir.path(), &["set", &target, "", "{}"]));
    stdout(&shmheap(dir.path(), &["import", &target, "copy", "-i", file_arg]));

    let json = stdout(&shmheap(dir.path(), &["get", &target, "copy", "--json"]));
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value, serde_json::json!({"a": [1.5, 2.5], "b": "text"}));
}

#[test]
fn destroy_removes_the_region() {
    let dir = TempDir::new().unwrap();
    let name = region_name();
    stdout(&shmheap(dir.path(), &["create", &name]));
    assert!(dir.path().join(format!("{name}.shm")).exists());

    stdout(&shmheap(dir.path(), &["destroy", &name]));
    assert!(!dir.path().join(format!("{name}.shm")).exists());

    let output = shmheap(dir.path(), &["info", &name]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("E004"));
}

#[test]
fn creating_twice_fails() {
    let dir = TempDir::new().unwrap();
    let name = region_name();
    stdout(&shmheap(dir.path(), &["create", &name]));
    let output = shmheap(dir.path(), &["create", &name]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("E003"));
}
