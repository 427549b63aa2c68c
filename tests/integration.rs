use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cq_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cq"))
}

const PAGES: &str = r#"{"url":"http://market.onion","title":"Market Home","crawlDate":"2024-01-01T00:00:00Z","content":"<h1>Welcome to the market</h1>"}
{"url":"http://forum.onion","title":"Forum Index","crawlDate":"2024-01-02T00:00:00Z","content":"<p>Latest threads about the market</p>"}
{"url":"http://market.onion","title":"Market Listings","crawlDate":"2024-01-03T00:00:00Z","content":"<ul><li>item</li></ul>"}

{"url":"http://blog.onion","title":"","crawlDate":"2024-01-04T00:00:00Z","content":"nothing to see"}
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(root.join("pages.jsonl"), PAGES).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/cq.sqlite"

[server]
bind = "127.0.0.1:7332"

[store]
timeout_secs = 5

[logging]
filter = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("cq.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cq(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cq_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cq binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Initializes the database and imports the sample pages. Returns the
/// assigned ids in file order.
fn setup_with_pages() -> (TempDir, PathBuf, Vec<String>) {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_cq(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);

    let file = tmp.path().join("pages.jsonl");
    let (stdout, stderr, success) = run_cq(&config_path, &["import", file.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Imported 4 pages."));

    let ids = stdout
        .lines()
        .filter(|line| line.contains(".onion"))
        .map(|line| line.split_whitespace().next().unwrap().to_string())
        .collect();
    (tmp, config_path, ids)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cq(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/cq.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_cq(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_cq(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_cq(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_search_matches_title_or_content() {
    let (_tmp, config_path, _) = setup_with_pages();

    let (stdout, stderr, success) = run_cq(&config_path, &["search", "MARKET"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("Market Home"));
    assert!(stdout.contains("Forum Index"));
    assert!(stdout.contains("Market Listings"));
    assert!(!stdout.contains("blog.onion"));
}

#[test]
fn test_search_url_filter() {
    let (_tmp, config_path, _) = setup_with_pages();

    let (stdout, _, success) = run_cq(
        &config_path,
        &["search", "market", "--url", "http://market.onion"],
    );
    assert!(success);
    assert!(stdout.contains("Market Home"));
    assert!(stdout.contains("Market Listings"));
    assert!(!stdout.contains("Forum Index"));
}

#[test]
fn test_search_empty_pattern_and_limit() {
    let (_tmp, config_path, _) = setup_with_pages();

    let (stdout, _, success) = run_cq(&config_path, &["search", "", "--limit", "2"]);
    assert!(success);
    assert!(stdout.contains("1. Market Home"));
    assert!(stdout.contains("2. Forum Index"));
    assert!(!stdout.contains("3."));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path, _) = setup_with_pages();

    let (stdout, _, success) = run_cq(&config_path, &["search", "zebra"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_invalid_pattern_fails() {
    let (_tmp, config_path, _) = setup_with_pages();

    let (_, stderr, success) = run_cq(&config_path, &["search", "(unclosed"]);
    assert!(!success);
    assert!(stderr.contains("invalid query pattern"));
}

#[test]
fn test_get_prints_content() {
    let (_tmp, config_path, ids) = setup_with_pages();
    assert_eq!(ids.len(), 4);

    let (stdout, stderr, success) = run_cq(&config_path, &["get", &ids[1]]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("Forum Index"));
    assert!(stdout.contains("<p>Latest threads about the market</p>"));

    let (stdout, _, success) = run_cq(&config_path, &["get", &ids[3]]);
    assert!(success);
    assert!(stdout.contains("(untitled)"));
}

#[test]
fn test_get_invalid_and_missing_ids() {
    let (_tmp, config_path, _) = setup_with_pages();

    let (_, stderr, success) = run_cq(&config_path, &["get", "not-a-uuid"]);
    assert!(!success);
    assert!(stderr.contains("invalid id"));

    let (_, stderr, success) = run_cq(
        &config_path,
        &["get", "00000000-0000-4000-8000-000000000000"],
    );
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_extensions_add_and_list() {
    let (_tmp, config_path, _) = setup_with_pages();

    let (stdout, _, success) = run_cq(&config_path, &["extensions"]);
    assert!(success);
    assert!(stdout.contains("No forbidden extensions."));

    let (stdout, stderr, success) = run_cq(
        &config_path,
        &["extensions", "--add", ".PDF", "--add", "zip", "--add", "pdf"],
    );
    assert!(success, "extensions failed: {}", stderr);
    let listed: Vec<&str> = stdout.lines().skip(1).map(str::trim).collect();
    assert_eq!(listed, vec!["pdf", "zip"]);
}
