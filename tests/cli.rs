use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn run_ingestd(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_ingestd"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run ingestd");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_help_lists_commands() {
    let (stdout, _, ok) = run_ingestd(Path::new("unused.toml"), &["--help"]);
    assert!(ok);
    for cmd in ["init", "ingest", "serve", "health", "stats"] {
        assert!(stdout.contains(cmd), "missing {} in help:\n{}", cmd, stdout);
    }
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_ingestd(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"), "{}", stderr);
}

#[test]
fn test_invalid_chunking_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("ingest.toml");
    fs::write(&config, "[chunking]\nmax_chars = 100\noverlap = 100\n").unwrap();

    let (_, stderr, ok) = run_ingestd(&config, &["ingest"]);
    assert!(!ok);
    assert!(stderr.contains("overlap"), "{}", stderr);
}
