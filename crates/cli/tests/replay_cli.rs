// Integration tests for the cellsync-replay binary: exit codes and the
// --json stdout contract.
//
// Run with: cargo test -p cellsync-cli --test replay_cli -- --nocapture

use std::fs;
use std::path::Path;
use std::process::Command;

fn replay_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cellsync-replay"));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("CELLSYNC_SETTINGS");
    cmd
}

fn write_script(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_string()
}

const FOCUS_AND_TYPE: &str = r#"
{"init": "c1", "source": "IO.puts(1)", "revision": 1}
{"init": "c2", "source": "", "revision": 1}
{"cells": {"type": "cell_focused", "cellId": "c1"}}
{"cells": {"type": "insert_mode_changed", "enabled": true}}
{"flush": true}
{"editor": "c1", "selection": {"from": 2, "to": 5}}
{"cells": {"type": "location_report", "client": "x", "report": {"cellId": "c2", "selection": {"from": 0, "to": 0}}}}
{"cells": {"type": "cell_focused", "cellId": "c2"}}
"#;

#[test]
fn test_json_output_is_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.jsonl", FOCUS_AND_TYPE);

    let output = replay_bin()
        .args([script.as_str(), "--cells", "c1,c2", "--json"])
        .output()
        .expect("run cellsync-replay");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad line {l:?}: {e}")))
        .collect();

    let published: Vec<&serde_json::Value> = lines
        .iter()
        .filter(|v| v["call"] == "selection_published")
        .collect();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0]["cell"], "c1");
    assert_eq!(published[1]["selection"], serde_json::json!({"from": 2, "to": 5}));

    assert!(lines.iter().any(|v| v["call"] == "overlay_updated" && v["cell"] == "c2"));
    assert!(lines.iter().any(|v| v["call"] == "scroll_active_element" && v["line"] == 6));

    let summary = lines.last().unwrap();
    assert_eq!(summary["steps"], 8);
    assert_eq!(summary["cells"]["c1"], "unfocused");
    assert_eq!(summary["cells"]["c2"], "command");
}

#[test]
fn test_human_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.jsonl", FOCUS_AND_TYPE);

    let output = replay_bin()
        .args([script.as_str(), "--cells", "c1", "--cells", "c2"])
        .output()
        .expect("run cellsync-replay");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[5] cells insert_mode_changed"));
    assert!(stdout.contains("c1 editor focused"));
    assert!(stdout.contains("8 step(s)"));
}

#[test]
fn test_settings_file_applied() {
    let dir = tempfile::tempdir().unwrap();
    let settings = write_script(
        dir.path(),
        "settings.json",
        "// no refocus\n{ \"editor.refocusOnBlur\": false }\n",
    );
    let script = write_script(
        dir.path(),
        "s.jsonl",
        r#"{"init": "c1"}
{"cells": {"type": "cell_focused", "cellId": "c1"}}
{"cells": {"type": "insert_mode_changed", "enabled": true}}
{"blur": "c1"}
"#,
    );

    let output = replay_bin()
        .args([script.as_str(), "--cells", "c1", "--json", "--settings", settings.as_str()])
        .output()
        .expect("run cellsync-replay");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let refocused = stdout
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .any(|v| v["line"] == 4 && v["call"] == "editor_focused");
    assert!(!refocused);
}

#[test]
fn test_malformed_script_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "bad.jsonl", "{\"flush\": true}\nnot json\n");

    let output = replay_bin()
        .args([script.as_str(), "--cells", "c1"])
        .output()
        .expect("run cellsync-replay");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("line 2"), "stderr: {}", stderr);
}

#[test]
fn test_missing_script_exits_1() {
    let output = replay_bin()
        .args(["/nonexistent/cellsync/script.jsonl", "--cells", "c1"])
        .output()
        .expect("run cellsync-replay");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_unmounted_cell_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.jsonl", "{\"init\": \"zz\"}\n");

    let output = replay_bin()
        .args([script.as_str(), "--cells", "c1"])
        .output()
        .expect("run cellsync-replay");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("'zz' is not mounted"));
}

#[test]
fn test_repeated_cell_id_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.jsonl", "{\"init\": \"c1\"}\n");

    let output = replay_bin()
        .args([script.as_str(), "--cells", "c1,c2,c1"])
        .output()
        .expect("run cellsync-replay");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("'c1' listed more than once"));
}

#[test]
fn test_missing_cells_flag_is_usage_error() {
    let output = replay_bin().arg("script.jsonl").output().expect("run cellsync-replay");
    assert_eq!(output.status.code(), Some(2));
}
