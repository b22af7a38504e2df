// Integration tests for the drvscope binary.
// Every test gets its own settings file so the user's config dir is never touched.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Run drvscope with an isolated settings file in `dir`.
fn drvscope(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_drvscope"))
        .args(args)
        .arg("--settings")
        .arg(dir.join("settings.json"))
        .env_remove("RUST_LOG")
        .env_remove("DRVSCOPE_SETTINGS")
        .output()
        .expect("failed to run drvscope")
}

/// Scratch dir holding a writable copy of a fixture.
fn scratch(name: &str) -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::copy(fixture(name), &path).unwrap();
    let path = path.to_string_lossy().to_string();
    (dir, path)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

// ============================================================================
// list
// ============================================================================

#[test]
fn list_table_uses_default_columns() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["list", &snap]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let text = stdout(&out);
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("Name"));
    assert!(lines[0].contains("Status") && lines[0].contains("ImagePath"));
    assert!(lines[1].starts_with("---"));
    assert_eq!(lines.len(), 2 + 6);
    assert!(lines[2].starts_with("Foo "));
    assert!(lines[7].starts_with("rootkit.sys"));
}

#[test]
fn list_csv_with_selected_columns() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["list", &snap, "--format", "csv", "--columns", "name,HasModule"]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));
    assert_eq!(
        stdout(&out),
        "Name,HasModule\nFoo,No\nBar,Yes\nNtfs,Yes\nBeep,No\nACPI_HAL,Yes\nrootkit.sys,Yes\n"
    );
}

#[test]
fn list_json_all_columns() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["list", &snap, "-f", "json", "--all-columns"]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let rows: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[4]["Name"], "ACPI_HAL");
    assert_eq!(rows[4]["ImagePath"], "\\SystemRoot\\system32\\ntoskrnl.exe");
    assert_eq!(rows[1]["ModuleImageBase"], "FFFFF80002580000");
    assert_eq!(rows[0]["RegLastWriteTime"].as_str().map(|s| s.starts_with("2024-05-01")), Some(true));
}

#[test]
fn list_format_comes_from_settings() {
    let (dir, snap) = scratch("machine.json");
    std::fs::write(
        dir.path().join("settings.json"),
        "{ \"output.format\": \"csv\", \"output.columns\": [\"Name\"] }",
    )
    .unwrap();
    let out = drvscope(dir.path(), &["list", &snap]);
    assert_eq!(code(&out), 0);
    assert!(stdout(&out).starts_with("Name\nFoo\nBar\n"));
}

#[test]
fn list_unknown_column_is_usage_error() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["list", &snap, "--columns", "Name,Bogus"]);
    assert_eq!(code(&out), 2);
    assert!(stderr(&out).contains("unknown column 'Bogus'"));
    assert!(stderr(&out).contains("drvscope columns"));
}

#[test]
fn list_missing_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let out = drvscope(dir.path(), &["list", missing.to_str().unwrap()]);
    assert_eq!(code(&out), 3);
    assert!(stderr(&out).starts_with("error: "));
}

#[test]
fn list_collision_publishes_nothing() {
    let (dir, snap) = scratch("collision.json");
    let out = drvscope(dir.path(), &["list", &snap]);
    assert_eq!(code(&out), 4);
    assert!(stdout(&out).is_empty());
    assert!(stderr(&out).contains("identifier collision"));
}

// ============================================================================
// show / columns
// ============================================================================

#[test]
fn show_text_lists_attributes_and_actions() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["show", &snap, "beep"]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let text = stdout(&out);
    assert!(text.lines().any(|l| l.starts_with("Name ") && l.ends_with("Beep")));
    assert!(text.lines().any(|l| l.starts_with("Status ") && l.ends_with("Stopped")));
    assert!(text.lines().any(|l| l.starts_with("Actions ") && l.contains("start_service")));
}

#[test]
fn show_json_orphan_module() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["show", &snap, "rootkit.sys", "--json"]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(v["HasRegistry"], "No");
    assert_eq!(v["ImagePath"], "\\??\\C:\\Temp\\rootkit.sys");
    let actions: Vec<&str> = v["Actions"].as_array().unwrap().iter().filter_map(|a| a.as_str()).collect();
    assert!(actions.contains(&"force_unload"));
    assert!(actions.contains(&"create_key"));
    assert!(!actions.contains(&"edit_key"));
}

#[test]
fn show_unknown_driver() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["show", &snap, "Spooler"]);
    assert_eq!(code(&out), 7);
    assert!(stderr(&out).contains("no driver named 'Spooler'"));
}

#[test]
fn columns_marks_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let out = drvscope(dir.path(), &["columns"]);
    assert_eq!(code(&out), 0);
    let text = stdout(&out);
    assert!(text.lines().any(|l| l == "Name (default)"));
    assert!(text.lines().any(|l| l == "RegLastWriteTime"));
    assert_eq!(text.lines().count(), 32);
}

// ============================================================================
// watch
// ============================================================================

#[test]
fn watch_reports_each_cycle() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["watch", &snap, "--interval", "0", "--count", "2"]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "[r1] 6 drivers\n[r2] 6 drivers (+0 -0)\n");
}

#[test]
fn watch_rejects_bad_interval() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["watch", &snap, "--interval", "-1", "--count", "1"]);
    assert_eq!(code(&out), 2);
}

// ============================================================================
// key
// ============================================================================

#[test]
fn key_create_then_list() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(
        dir.path(),
        &["key", "create", &snap, "NewDrv", "--image-file", "C:\\Windows\\System32\\drivers\\new.sys"],
    );
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("created key 'NewDrv'\n"));
    assert!(text.contains("set ImagePath = \\SystemRoot\\System32\\drivers\\new.sys"));
    assert!(text.contains("set Type = 1"));

    let out = drvscope(dir.path(), &["list", &snap, "-f", "csv", "--columns", "Name,ImagePath,HasRegistry"]);
    assert_eq!(code(&out), 0);
    assert!(stdout(&out).contains("NewDrv,\\SystemRoot\\System32\\drivers\\new.sys,Yes\n"));
}

#[test]
fn key_create_rejects_path_separator() {
    let (dir, snap) = scratch("machine.json");
    let before = std::fs::read_to_string(&snap).unwrap();
    let out = drvscope(dir.path(), &["key", "create", &snap, "a\\b"]);
    assert_eq!(code(&out), 6);
    assert_eq!(std::fs::read_to_string(&snap).unwrap(), before);
}

#[test]
fn key_edit_writes_changes() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(
        dir.path(),
        &["key", "edit", &snap, "foo", "--start", "2", "--display-name", "Foo driver"],
    );
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("updated key 'Foo'\n"));
    assert!(text.contains("set DisplayName = Foo driver"));
    assert!(text.contains("set Start = 2"));

    let out = drvscope(dir.path(), &["show", &snap, "Foo", "--json"]);
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(v["RegStart"], "2");
    assert_eq!(v["RegDisplayName"], "Foo driver");
}

#[test]
fn key_edit_without_changes_leaves_file() {
    let (dir, snap) = scratch("machine.json");
    let before = std::fs::read_to_string(&snap).unwrap();
    let out = drvscope(dir.path(), &["key", "edit", &snap, "Foo", "--start", "3"]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "key 'Foo' unchanged\n");
    assert_eq!(std::fs::read_to_string(&snap).unwrap(), before);
}

#[test]
fn key_edit_rejects_unknown_code() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["key", "edit", &snap, "Foo", "--start", "9"]);
    assert_eq!(code(&out), 6);
    assert!(stderr(&out).contains("invalid value for 'Start': 9"));
}

#[test]
fn key_edit_missing_key() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["key", "edit", &snap, "rootkit.sys", "--start", "3"]);
    assert_eq!(code(&out), 5);
}

#[test]
fn key_delete_removes_driver() {
    let (dir, snap) = scratch("machine.json");
    let out = drvscope(dir.path(), &["key", "delete", &snap, "FOO"]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let out = drvscope(dir.path(), &["show", &snap, "Foo"]);
    assert_eq!(code(&out), 7);
}

#[test]
fn key_delete_repairs_collision() {
    let (dir, snap) = scratch("collision.json");
    let out = drvscope(dir.path(), &["key", "delete", &snap, "Twin"]);
    assert_eq!(code(&out), 0, "stderr: {}", stderr(&out));

    let out = drvscope(dir.path(), &["list", &snap, "-f", "csv", "--columns", "Name"]);
    assert_eq!(code(&out), 0);
    assert_eq!(stdout(&out), "Name\ntwin\n");
}
