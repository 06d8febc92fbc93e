//! `--json` output must stay parseable while logging is active.

use std::process::Command;

use tempfile::TempDir;

#[test]
fn providers_json_is_not_mixed_with_logs() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_storyreel-cli"))
        .arg("--data-dir")
        .arg(dir.path())
        .args(["--json", "providers", "--kind", "video"])
        .env("RUST_LOG", "info")
        .output()
        .unwrap();

    assert!(output.status.success(), "{:?}", output);

    let stdout = String::from_utf8(output.stdout).unwrap();
    let providers: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let names: Vec<&str> = providers
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert!(names.contains(&"kling"), "{names:?}");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Pipeline ready"), "{stderr}");
}
