// `merge` binary tests
// Argument handling and exit statuses.

mod common;

use std::fs;
use std::process::{Command, Output};

use common::{read_shard, rec, write_raw_shard, write_shard};
use tempfile::tempdir;

fn merge(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_merge"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

// =============================================================================
// Test 1: Successful merge exits 0 and writes output plus marker
// =============================================================================
#[test]
fn successful_merge_exits_zero() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write_shard(&input.join("a"), &[rec("k1", &["A"])]);
    write_shard(&input.join("b"), &[rec("k0", &["B"]), rec("k1", &["C"])]);

    let out = merge(&[
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--no-sync",
        "-j",
        "2",
    ]);

    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        read_shard(&output.join("part-r-00000")),
        vec![rec("k0", &["B"]), rec("k1", &["A", "C"])]
    );
    assert!(output.join("_SUCCESS").exists());
}

// =============================================================================
// Test 2: Corrupt input exits 1 and leaves no output
// =============================================================================
#[test]
fn corrupt_input_exits_one() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write_raw_shard(&input.join("bad"), &[rec("b", &["1"]), rec("a", &["2"])], None);

    let out = merge(&[input.to_str().unwrap(), output.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!output.exists());
}

// =============================================================================
// Test 3: Missing input exits 1
// =============================================================================
#[test]
fn missing_input_exits_one() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let output = dir.path().join("out");
    let out = merge(&[missing.to_str().unwrap(), output.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
}

// =============================================================================
// Test 4: Wrong argument count prints usage and exits 255
// =============================================================================
#[test]
fn wrong_argument_count_prints_usage() {
    let dir = tempdir().unwrap();
    let only = dir.path().join("in");
    fs::create_dir_all(&only).unwrap();

    let out = merge(&[only.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(255));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage"));

    let out = merge(&[]);
    assert_eq!(out.status.code(), Some(255));
}

// =============================================================================
// Test 5: --help exits 0
// =============================================================================
#[test]
fn help_exits_zero() {
    let out = merge(&["--help"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("OUTPUT_PATH"));
}
