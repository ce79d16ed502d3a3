use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn subastas_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_subastas"))
}

/// Writes a config whose store is a closed local port, so every connection
/// attempt fails fast.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("subastas.toml");
    fs::write(
        &config_path,
        r#"[db]
connection_string = "server=tcp:127.0.0.1,1;database=EcoCircular;user=sa;password=x;TrustServerCertificate=true"

[server]
bind = "127.0.0.1:0"

[logging]
filter = "warn"
"#,
    )
    .unwrap();
    (tmp, config_path)
}

fn run_subastas(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = subastas_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("SUBASTAS_DB_CONNECTION_STRING")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run subastas binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_extract_with_unreachable_store_prints_opaque_envelope() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_subastas(&config_path, &["extract", "--employee-id", "E-100"]);

    assert!(!success, "extract should fail: stdout={}, stderr={}", stdout, stderr);
    let envelope: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout));
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["errorCode"], 500);
    assert_eq!(envelope["error"]["message"], "internal server error");
    assert!(!stdout.contains("127.0.0.1"));
}

#[test]
fn test_extract_rejects_blank_employee() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_subastas(&config_path, &["extract", "--employee-id", "  "]);

    assert!(!success);
    assert!(stderr.contains("employee id must not be empty"), "stderr={}", stderr);
}

#[test]
fn test_extract_rejects_bad_date() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_subastas(
        &config_path,
        &["extract", "--employee-id", "E-1", "--date-from", "31/12/2024"],
    );

    assert!(!success);
    assert!(stderr.contains("invalid date"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_subastas(&tmp.path().join("nope.toml"), &["serve"]);

    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr={}", stderr);
}

#[test]
fn test_completions_need_no_config() {
    let tmp = TempDir::new().unwrap();
    let (stdout, stderr, success) =
        run_subastas(&tmp.path().join("nope.toml"), &["completions", "bash"]);

    assert!(success, "stderr={}", stderr);
    assert!(stdout.contains("subastas"));
}
