use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ulearn_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ulearn");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("Login.kt"),
        "class LoginScreen {\n    val title = \"Welcome back\"\n\n    fun submit() {\n        println(\"Signing in\")\n    }\n}\n",
    )
    .unwrap();
    fs::write(files_dir.join("old.kt"), "fun total() {\n    return 1\n}\n").unwrap();
    fs::write(files_dir.join("new.kt"), "fun total() {\n    return 2\n}\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/ulearn.sqlite"

[models]
data_root = "{root}/data"

[pipeline]
workers = 2

[retrieval]
default_limit = 5

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("ulearn.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ulearn(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ulearn_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ulearn binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn file_arg(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
        .join(name)
        .display()
        .to_string()
}

fn learn_login(config_path: &Path) {
    let code = file_arg(config_path, "Login.kt");
    let (stdout, stderr, success) = run_ulearn(
        config_path,
        &[
            "learn",
            "generation",
            "--prompt",
            "create a login screen",
            "--code-file",
            &code,
        ],
    );
    assert!(success, "learn failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Learned"));
    assert!(!stdout.contains("Learned 0"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success1) = run_ulearn(&config_path, &["init"]);
    assert!(success1, "First init failed");
    assert!(stdout.contains("initialized"));

    let (_, _, success2) = run_ulearn(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_learn_then_search() {
    let (_tmp, config_path) = setup_test_env();
    learn_login(&config_path);

    let (stdout, stderr, success) = run_ulearn(&config_path, &["search", "login screen"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1. [overlap 2"));
    assert!(stdout.contains("prompt: \"create login screen\""));

    let (stdout, _, success) = run_ulearn(&config_path, &["search", "database migration"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_learning_twice_raises_score_not_count() {
    let (_tmp, config_path) = setup_test_env();
    learn_login(&config_path);
    let (first, _, _) = run_ulearn(&config_path, &["stats", "--json"]);
    learn_login(&config_path);
    let (second, _, _) = run_ulearn(&config_path, &["stats", "--json"]);

    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    let second: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(
        first["stats"]["total_records"],
        second["stats"]["total_records"]
    );
    assert_eq!(
        second["stats"]["total_score"].as_i64().unwrap(),
        2 * first["stats"]["total_score"].as_i64().unwrap()
    );
}

#[test]
fn test_get_record_by_id() {
    let (_tmp, config_path) = setup_test_env();
    learn_login(&config_path);

    let (stdout, _, success) =
        run_ulearn(&config_path, &["search", "login", "--limit", "1", "--json"]);
    assert!(success);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 1);
    let id = results[0]["record"]["id"].as_str().unwrap().to_string();

    let (stdout, stderr, success) = run_ulearn(&config_path, &["get", &id]);
    assert!(success, "get failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("--- Record ---"));
    assert!(stdout.contains(&id));

    let (_, stderr, success) = run_ulearn(&config_path, &["get", "no-such-id"]);
    assert!(!success);
    assert!(stderr.contains("record not found"));
}

#[test]
fn test_replacement_and_observation() {
    let (_tmp, config_path) = setup_test_env();
    let old = file_arg(&config_path, "old.kt");
    let new = file_arg(&config_path, "new.kt");

    let (stdout, stderr, success) = run_ulearn(
        &config_path,
        &[
            "learn",
            "replacement",
            "--prompt",
            "fix the total",
            "--old-file",
            &old,
            "--new-file",
            &new,
            "--reason",
            "fix wrong total",
        ],
    );
    assert!(success, "replacement failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Learned 1 record(s)."));

    let (stdout, _, success) = run_ulearn(
        &config_path,
        &[
            "learn",
            "observe",
            "--object",
            "submit",
            "--object-type",
            "Button",
            "--prop",
            "color=red",
            "--prompt",
            "make a red button",
        ],
    );
    assert!(success);
    assert!(stdout.contains("Learned 1 record(s)."));

    let (stdout, _, _) = run_ulearn(&config_path, &["stats", "--json"]);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let by_kind = stats["stats"]["by_kind"].as_array().unwrap();
    let records_of = |kind: &str| {
        by_kind
            .iter()
            .find(|k| k["kind"] == kind)
            .and_then(|k| k["records"].as_i64())
            .unwrap()
    };
    assert_eq!(records_of("fix_patch"), 1);
    assert_eq!(records_of("metadata_transformation"), 1);
}

#[test]
fn test_offline_engine_output_is_skipped() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ulearn(
        &config_path,
        &[
            "learn",
            "--model",
            "offline-rules",
            "observe",
            "--object",
            "x",
            "--object-type",
            "Label",
            "--prompt",
            "label",
        ],
    );
    assert!(success);
    assert!(stdout.contains("Skipped"));

    let (stdout, _, _) = run_ulearn(&config_path, &["stats", "--json"]);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["stats"]["total_records"], 0);
}

#[test]
fn test_classify_and_parse_without_config() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.toml");
    let source = tmp.path().join("Main.kt");
    fs::write(&source, "fun main() {\n    println(\"hello world\")\n}\n").unwrap();

    let (stdout, stderr, success) =
        run_ulearn(&missing, &["classify", "fun main() {}", "--json"]);
    assert!(success, "classify failed: {}", stderr);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["category"], "code_snippet");

    let (stdout, stderr, success) = run_ulearn(&missing, &["parse", source.to_str().unwrap()]);
    assert!(success, "parse failed: {}", stderr);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["language"], "curly_brace");
    assert_eq!(body["chunks"][0]["name"], "main");
}

#[test]
fn test_models_workflow() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ulearn(&config_path, &["models", "list"]);
    assert!(success);
    assert!(stdout.contains("bpe-code"));
    assert!(stdout.contains("wordpiece-intent"));

    let (_, _, success) = run_ulearn(
        &config_path,
        &["models", "add", "mine", "--name", "My Model", "--backend", "generic"],
    );
    assert!(success);
    let (_, _, success) = run_ulearn(&config_path, &["models", "select", "mine"]);
    assert!(success);

    let (stdout, _, success) = run_ulearn(&config_path, &["models", "status"]);
    assert!(success);
    assert!(stdout.contains("Active model:   My Model"));
    assert!(stdout.contains("(missing)"));

    let (_, stderr, success) = run_ulearn(&config_path, &["models", "select", "nope"]);
    assert!(!success);
    assert!(stderr.contains("Unknown model id"));
}

#[test]
fn test_ready_flag_cannot_be_set_by_hand() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_ulearn(&config_path, &["models", "ready", "bpe-code"]);
    assert!(!success);

    let (stdout, _, success) = run_ulearn(&config_path, &["models", "unready", "bpe-code"]);
    assert!(success);
    assert!(stdout.contains("marked not ready"));

    let (_, _, success) = run_ulearn(&config_path, &["models", "select", "bpe-code"]);
    assert!(success);
    let (stdout, _, success) = run_ulearn(&config_path, &["models", "status"]);
    assert!(success);
    assert!(stdout.contains("Ready:          false"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[db]\npath = \"x.sqlite\"\n[pipeline]\nworkers = 0\n").unwrap();

    let (_, stderr, success) = run_ulearn(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("pipeline.workers"));
}
