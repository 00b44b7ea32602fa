//! Tests for the `depotoc` binary that need no LLM provider.

use std::path::Path;
use std::process::Command;

fn depotoc() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_depotoc"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_transcript(dir: &Path, pages: usize) -> String {
    let body = (1..=pages)
        .map(|p| {
            (1..=4)
                .map(|l| format!("{l} q. testimony on page {p}, line {l}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\x0c");
    let path = dir.join("depo.txt");
    std::fs::write(&path, body).expect("write transcript");
    path.to_string_lossy().into_owned()
}

#[test]
fn inspect_only_reports_pages_and_windows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_transcript(dir.path(), 9);

    let output = depotoc()
        .args([&input, "--inspect-only", "--window-size", "4", "--stride", "3"])
        .output()
        .expect("run CLI");

    assert!(
        output.status.success(),
        "cli exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Pages:           9"), "{stdout}");
    assert!(stdout.contains("Windows:         2"), "{stdout}");
    assert!(stdout.contains("Uncovered pages: [8, 9]"), "{stdout}");
}

#[test]
fn inspect_only_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_transcript(dir.path(), 3);

    let output = depotoc()
        .args([&input, "--inspect-only", "--json", "--mode", "streaming"])
        .output()
        .expect("run CLI");

    assert!(output.status.success());
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary is JSON");
    assert_eq!(summary["source_pages"], 3);
    assert_eq!(summary["text_pages"], 3);
    assert_eq!(summary["windows"].as_array().map(Vec::len), Some(0));
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = depotoc()
        .args(["/nonexistent/depo.pdf", "--out"])
        .arg(dir.path().join("toc"))
        .output()
        .expect("run CLI");

    assert!(!output.status.success());
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn stride_must_be_smaller_than_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_transcript(dir.path(), 3);

    let output = depotoc()
        .args([&input, "--inspect-only", "--window-size", "4", "--stride", "4"])
        .output()
        .expect("run CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid configuration"), "{stderr}");
}

#[test]
fn unknown_format_rejected_by_parser() {
    let output = depotoc()
        .args(["depo.pdf", "--out", "toc", "--format", "json,pdf"])
        .output()
        .expect("run CLI");

    assert_eq!(output.status.code(), Some(2));
}
